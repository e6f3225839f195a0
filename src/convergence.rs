//! Bounded waits for distributed state to converge.
//!
//! Every wait polls a predicate until it holds or the timeout elapses, and
//! each evaluation is itself cut off at the deadline so a hung node cannot
//! stall a test. Predicate errors abort the wait immediately.

use crate::chain::ChainNode;
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use futures::future::try_join_all;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Polling parameters shared by all waits.
#[derive(Debug, Clone, Copy)]
pub struct Convergence {
    poll_interval: Duration,
    timeout: Duration,
}

impl Convergence {
    /// Engine polling every `poll_interval`, giving up after `timeout`.
    #[must_use]
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Engine using the harness timeouts.
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.timeouts.poll_interval(), config.timeouts.sync())
    }

    /// Same engine with a different bound for the canonical waits.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Bound used by the canonical waits.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll `predicate` until it returns `true`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` naming `operation` once `timeout` has elapsed,
    /// or the first error returned by the predicate.
    pub async fn await_condition<F, Fut>(
        &self,
        operation: &str,
        timeout: Duration,
        mut predicate: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, predicate()).await {
                Ok(Ok(true)) => {
                    debug!("{} after {:?} ({} polls)", operation, started.elapsed(), attempts);
                    return Ok(());
                }
                Ok(Ok(false)) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(Error::timeout(operation, started.elapsed())),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::timeout(operation, started.elapsed()));
            }
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    /// Wait until every node reports the same best block.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if the nodes do not agree in time.
    pub async fn sync_blocks<N: ChainNode>(&self, nodes: &[N]) -> Result<()> {
        let operation = format!("syncing blocks of {}", labels(nodes));
        self.await_condition(&operation, self.timeout, move || async move {
            let tips = try_join_all(nodes.iter().map(|n| n.best_block_id())).await?;
            Ok(all_equal(&tips))
        })
        .await
    }

    /// Wait until every node holds the same set of pending transactions.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if the mempools do not agree in time.
    pub async fn sync_mempools<N: ChainNode>(&self, nodes: &[N]) -> Result<()> {
        let operation = format!("syncing mempools of {}", labels(nodes));
        self.await_condition(&operation, self.timeout, move || async move {
            let pools = try_join_all(nodes.iter().map(|n| n.mempool_ids())).await?;
            Ok(all_equal(&pools))
        })
        .await
    }

    /// Wait until every mempool is empty.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if a mempool still holds transactions.
    pub async fn await_mempools_empty<N: ChainNode>(&self, nodes: &[N]) -> Result<()> {
        let operation = format!("waiting for empty mempools on {}", labels(nodes));
        self.await_condition(&operation, self.timeout, move || async move {
            let pools = try_join_all(nodes.iter().map(|n| n.mempool_ids())).await?;
            Ok(pools.iter().all(|pool| pool.is_empty()))
        })
        .await
    }

    /// Wait until `txid` is pending on `node`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if the transaction does not show up in time.
    pub async fn await_tx_in_mempool<N: ChainNode>(&self, node: &N, txid: &str) -> Result<()> {
        let operation = format!("waiting for {txid} in the mempool of {}", node.label());
        self.await_condition(&operation, self.timeout, move || async move {
            Ok(node.mempool_ids().await?.contains(txid))
        })
        .await
    }

    /// Wait until `node` is at least `blocks` above `reference`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if the height does not advance in time.
    pub async fn await_height_advance<N: ChainNode>(
        &self,
        node: &N,
        reference: u64,
        blocks: u64,
    ) -> Result<()> {
        let target = reference.saturating_add(blocks);
        let operation = format!("waiting for {} to reach height {target}", node.label());
        self.await_condition(&operation, self.timeout, move || async move {
            Ok(node.block_height().await? >= target)
        })
        .await
    }
}

fn labels<N: ChainNode>(nodes: &[N]) -> String {
    nodes.iter().map(|n| n.label()).collect::<Vec<_>>().join(", ")
}

fn all_equal<T: PartialEq>(values: &[T]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}
