//! Process supervisor for node sets.
//!
//! [`Supervisor::start_into`] spawns every node of a [`LaunchPlan`] into a
//! caller-owned [`NodeSet`], then waits for each to answer a liveness call
//! under one shared deadline. If any node fails to come up, everything
//! started so far is torn down before the error is returned. [`Supervisor::stop_set`] stops a set in reverse index
//! order and never fails.

mod node_set;
mod plan;
mod process;

pub use node_set::{ManagedNode, NodeSet};
pub use plan::{LaunchPlan, NodeLaunch};
pub use process::{Liveness, NodeProcess, StopOutcome};

use crate::chain::Mainchain;
use crate::config::{HarnessConfig, NodeKind};
use crate::error::{Error, Result};
use crate::rpc::{NodeEndpoint, ProxyOptions, RpcProxy};
use futures::FutureExt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// JSON-RPC error code of a daemon that is still loading.
const RPC_IN_WARMUP: i64 = -28;

/// Starts and stops node sets.
#[derive(Debug, Clone)]
pub struct Supervisor {
    startup_timeout: Duration,
    poll_interval: Duration,
    shutdown_grace: Duration,
    rpc_options: ProxyOptions,
}

impl Supervisor {
    /// Supervisor using the harness timeouts.
    #[must_use]
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            startup_timeout: config.timeouts.startup(),
            poll_interval: config.timeouts.poll_interval(),
            shutdown_grace: config.timeouts.shutdown_grace(),
            rpc_options: ProxyOptions {
                timeout: config.timeouts.rpc(),
                trace: config.trace_rpc,
            },
        }
    }

    /// Override the shutdown grace period.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Start every node of `plan` and wait until all are responsive.
    ///
    /// # Errors
    ///
    /// As [`Supervisor::start_into`].
    pub async fn start_set(&self, plan: &LaunchPlan) -> Result<NodeSet> {
        let mut set = NodeSet::new(plan.kind);
        self.start_into(plan, &mut set).await?;
        Ok(set)
    }

    /// Start every node of `plan` into `set`, which the caller owns.
    ///
    /// Each node is pushed into `set` as soon as it is spawned, before any
    /// liveness wait, so a caller that abandons this future still holds every
    /// handle and can stop them.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid plan or a set of another tier,
    /// and `Error::Startup` naming the first node that could not be launched
    /// or did not become responsive. In the latter case every process in
    /// `set` has already been stopped.
    pub async fn start_into(&self, plan: &LaunchPlan, set: &mut NodeSet) -> Result<()> {
        plan.validate()?;
        if set.kind() != plan.kind {
            return Err(Error::Config(format!(
                "cannot start {} nodes into a {} set",
                plan.kind,
                set.kind()
            )));
        }
        info!("Starting {} {} nodes", plan.count, plan.kind);

        let first = set.len();
        for index in 0..plan.count {
            match self.launch(plan, index) {
                Ok(node) => set.push(node),
                Err((node, source)) => {
                    warn!("Failed to launch {}: {}", node, source);
                    self.stop_set(set).await;
                    return Err(Error::Startup {
                        node,
                        source: Box::new(source),
                    });
                }
            }
        }

        let deadline = Instant::now() + self.startup_timeout;
        for index in first..set.len() {
            let node = &mut set.nodes_mut()[index];
            if let Err(source) = self.await_responsive(node, deadline).await {
                let label = node.process.label().to_string();
                warn!("{} did not become responsive: {}", label, source);
                node.process.mark_failed(source.to_string());
                self.stop_set(set).await;
                return Err(Error::Startup {
                    node: label,
                    source: Box::new(source),
                });
            }
        }

        info!("All {} {} nodes are ready", plan.count, plan.kind);
        Ok(())
    }

    /// Stop every node of `set`, last index first.
    ///
    /// Returns the per-node outcomes in index order. Stopping a set twice is a
    /// no-op the second time.
    pub async fn stop_set(&self, set: &mut NodeSet) -> Vec<StopOutcome> {
        let kind = set.kind();
        let mut outcomes = Vec::with_capacity(set.len());

        for node in set.nodes_mut().iter_mut().rev() {
            let request = match kind {
                NodeKind::Mainchain => {
                    let mainchain = Mainchain::new(node.process.label(), node.rpc.clone());
                    Some(async move { mainchain.stop().await }.boxed())
                }
                NodeKind::Sidechain => None,
            };
            let outcome = node.process.shutdown(request, self.shutdown_grace).await;
            debug!("{}: {:?}", node.process.label(), outcome);
            outcomes.push(outcome);
        }

        outcomes.reverse();
        if outcomes.iter().any(|o| *o != StopOutcome::AlreadyStopped) {
            info!("Stopped {} {} nodes", outcomes.len(), kind);
        }
        outcomes
    }

    fn launch(
        &self,
        plan: &LaunchPlan,
        index: usize,
    ) -> std::result::Result<ManagedNode, (String, Error)> {
        let launch = plan
            .node(index)
            .map_err(|e| (format!("{}-node{index}", plan.kind.short()), e))?;
        let endpoint =
            NodeEndpoint::localhost(launch.rpc_port).with_credentials(plan.credentials.clone());
        let rpc = RpcProxy::new(endpoint, plan.kind.dialect(), self.rpc_options.clone())
            .map_err(|e| (launch.label.clone(), e))?;
        let process = NodeProcess::spawn(&launch, plan.path_prefix.as_deref())
            .map_err(|e| (launch.label.clone(), e))?;
        Ok(ManagedNode {
            process,
            rpc,
            rpc_port: launch.rpc_port,
            p2p_port: launch.p2p_port,
        })
    }

    async fn await_responsive(&self, node: &mut ManagedNode, deadline: Instant) -> Result<()> {
        let method = node.process.kind().liveness_method();
        let started = Instant::now();

        loop {
            if let Some(status) = node.process.try_exit()? {
                return Err(Error::Unclassified(format!(
                    "{} exited during startup with {status}",
                    node.process.label()
                )));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::timeout(
                    format!("waiting for {} to answer {method}", node.process.label()),
                    started.elapsed(),
                ));
            }

            match tokio::time::timeout(remaining, node.rpc.invoke(method, vec![])).await {
                Ok(Ok(_)) => break,
                Ok(Err(e)) if answers_api(&e) => {
                    debug!("{} answered {} with {}", node.process.label(), method, e);
                    break;
                }
                Ok(Err(e)) => debug!("{} not responsive yet: {}", node.process.label(), e),
                Err(_) => continue,
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }

        node.process.mark_ready();
        debug!("{} is ready", node.process.label());
        Ok(())
    }
}

/// An API error proves the node is serving requests, unless it reports that
/// it is still warming up.
fn answers_api(err: &Error) -> bool {
    let Error::Api { payload, .. } = err else {
        return false;
    };
    let code = serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|v| v.get("code").and_then(serde_json::Value::as_i64));
    code != Some(RPC_IN_WARMUP)
}
