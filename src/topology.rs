//! Explicit node-to-node connections within a node set.

use crate::chain::ChainNode;
use crate::config::NodeKind;
use crate::convergence::Convergence;
use crate::error::Result;
use crate::supervisor::NodeSet;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Loopback address nodes listen on.
const LOCALHOST: &str = "127.0.0.1";

/// Directed adjacency between node indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkTopology {
    links: BTreeSet<(usize, usize)>,
}

impl NetworkTopology {
    /// Topology without links.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link from `from` to `to`.
    pub fn add(&mut self, from: usize, to: usize) {
        self.links.insert((from, to));
    }

    /// Whether `from` has dialled `to`.
    #[must_use]
    pub fn contains(&self, from: usize, to: usize) -> bool {
        self.links.contains(&(from, to))
    }

    /// Whether the two nodes are linked in either direction.
    #[must_use]
    pub fn linked(&self, a: usize, b: usize) -> bool {
        self.contains(a, b) || self.contains(b, a)
    }

    /// Number of links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether nothing is connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Links of a chain `0-1-…-(count-1)`; with `split`, the link across the
/// midpoint is left out so the network forms two halves.
#[must_use]
pub fn chain_links(count: usize, split: bool) -> Vec<(usize, usize)> {
    let cut = count / 2;
    (1..count)
        .filter(|&i| !(split && i == cut))
        .map(|i| (i - 1, i))
        .collect()
}

/// Every unordered pair of nodes.
#[must_use]
pub fn full_mesh(count: usize) -> Vec<(usize, usize)> {
    (0..count)
        .flat_map(|a| (a + 1..count).map(move |b| (a, b)))
        .collect()
}

/// Make node `from` dial node `to`.
///
/// Mainchain nodes are connected with `addnode … onetry` and the call returns
/// once every peer of `from` completed its handshake; sidechain nodes are
/// connected with `node/connect`.
///
/// # Errors
///
/// Returns an RPC error if a call fails, or `Error::Timeout` if the
/// mainchain handshake does not complete in time.
pub async fn connect(
    set: &mut NodeSet,
    from: usize,
    to: usize,
    convergence: &Convergence,
) -> Result<()> {
    let p2p_port = set.node(to)?.p2p_port;
    debug!("Connecting {} node{} -> node{}", set.kind(), from, to);

    match set.kind() {
        NodeKind::Mainchain => {
            let node = set.mainchain(from)?;
            node.add_node(&format!("{LOCALHOST}:{p2p_port}")).await?;
            let operation = format!("connecting {} to mc-node{to}", node.label());
            let node = &node;
            convergence
                .await_condition(&operation, convergence.timeout(), move || async move {
                    Ok(node.peers_pending_handshake().await? == 0)
                })
                .await?;
        }
        NodeKind::Sidechain => {
            set.sidechain(from)?.connect(LOCALHOST, p2p_port).await?;
        }
    }

    set.topology_mut().add(from, to);
    Ok(())
}

/// Connect two nodes in both directions.
///
/// # Errors
///
/// As [`connect`].
pub async fn connect_bi(
    set: &mut NodeSet,
    a: usize,
    b: usize,
    convergence: &Convergence,
) -> Result<()> {
    connect(set, a, b, convergence).await?;
    connect(set, b, a, convergence).await
}

/// Apply `links` as bidirectional connections.
///
/// # Errors
///
/// As [`connect`].
pub async fn connect_links(
    set: &mut NodeSet,
    links: &[(usize, usize)],
    convergence: &Convergence,
) -> Result<()> {
    for &(a, b) in links {
        match set.kind() {
            NodeKind::Mainchain => connect_bi(set, a, b, convergence).await?,
            NodeKind::Sidechain => connect(set, a, b, convergence).await?,
        }
    }
    if !links.is_empty() {
        info!("Connected {} {} links", links.len(), set.kind());
    }
    Ok(())
}
