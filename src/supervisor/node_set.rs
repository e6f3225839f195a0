//! A started tier: processes, their RPC handles and the topology between them.

use crate::chain::{Mainchain, Sidechain};
use crate::config::NodeKind;
use crate::error::{Error, Result};
use crate::rpc::RpcProxy;
use crate::supervisor::process::NodeProcess;
use crate::topology::NetworkTopology;

/// A node process paired with its API proxy.
#[derive(Debug)]
pub struct ManagedNode {
    /// The OS process.
    pub process: NodeProcess,
    /// Proxy to the node's API.
    pub rpc: RpcProxy,
    /// RPC/API port.
    pub rpc_port: u16,
    /// P2P port.
    pub p2p_port: u16,
}

/// Ordered set of one tier's nodes; index 0 is the primary node.
#[derive(Debug)]
pub struct NodeSet {
    kind: NodeKind,
    nodes: Vec<ManagedNode>,
    topology: NetworkTopology,
}

impl NodeSet {
    /// Empty set of the given tier.
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            nodes: Vec::new(),
            topology: NetworkTopology::new(),
        }
    }

    pub(crate) fn push(&mut self, node: ManagedNode) {
        self.nodes.push(node);
    }

    /// Tier.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the set has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in index order.
    #[must_use]
    pub fn nodes(&self) -> &[ManagedNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [ManagedNode] {
        &mut self.nodes
    }

    /// Node `index`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if there is no such node.
    pub fn node(&self, index: usize) -> Result<&ManagedNode> {
        self.nodes.get(index).ok_or_else(|| {
            Error::Config(format!(
                "{} set has {} nodes, no node {index}",
                self.kind,
                self.nodes.len()
            ))
        })
    }

    /// Proxy of node `index`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if there is no such node.
    pub fn rpc(&self, index: usize) -> Result<&RpcProxy> {
        self.node(index).map(|n| &n.rpc)
    }

    /// Mainchain wrapper for node `index`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if there is no such node or the set is not a
    /// mainchain set.
    pub fn mainchain(&self, index: usize) -> Result<Mainchain> {
        self.expect_kind(NodeKind::Mainchain)?;
        let node = self.node(index)?;
        Ok(Mainchain::new(node.process.label(), node.rpc.clone()))
    }

    /// Sidechain wrapper for node `index`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if there is no such node or the set is not a
    /// sidechain set.
    pub fn sidechain(&self, index: usize) -> Result<Sidechain> {
        self.expect_kind(NodeKind::Sidechain)?;
        let node = self.node(index)?;
        Ok(Sidechain::new(node.process.label(), node.rpc.clone()))
    }

    /// Mainchain wrappers for every node.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the set is not a mainchain set.
    pub fn mainchains(&self) -> Result<Vec<Mainchain>> {
        (0..self.len()).map(|i| self.mainchain(i)).collect()
    }

    /// Sidechain wrappers for every node.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the set is not a sidechain set.
    pub fn sidechains(&self) -> Result<Vec<Sidechain>> {
        (0..self.len()).map(|i| self.sidechain(i)).collect()
    }

    /// Connections made so far.
    #[must_use]
    pub fn topology(&self) -> &NetworkTopology {
        &self.topology
    }

    pub(crate) fn topology_mut(&mut self) -> &mut NetworkTopology {
        &mut self.topology
    }

    fn expect_kind(&self, kind: NodeKind) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "expected a {kind} node set, found {}",
                self.kind
            )))
        }
    }
}
