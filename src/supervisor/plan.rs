//! Launch plans: what to start, where, and on which ports.

use crate::bootstrap;
use crate::config::{HarnessConfig, NodeBinary, NodeKind};
use crate::error::{Error, Result};
use crate::rpc::Credentials;
use std::path::{Path, PathBuf};

/// Everything needed to start one tier's node set.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    /// Tier of the nodes.
    pub kind: NodeKind,
    /// Number of nodes.
    pub count: usize,
    /// One binary for all nodes, or exactly one per node.
    pub binaries: Vec<NodeBinary>,
    /// Arguments appended for every node.
    pub common_args: Vec<String>,
    /// Per-node extra arguments; empty, or exactly one entry per node.
    pub extra_args: Vec<Vec<String>>,
    /// Root holding the per-node data directories.
    pub root: PathBuf,
    /// RPC/API port of node 0.
    pub rpc_base_port: u16,
    /// P2P port of node 0.
    pub p2p_base_port: u16,
    /// Credentials for the node APIs.
    pub credentials: Option<Credentials>,
    /// Directory prepended to the child `PATH`.
    pub path_prefix: Option<PathBuf>,
}

/// Fully resolved launch parameters of one node.
#[derive(Debug, Clone)]
pub struct NodeLaunch {
    /// Tier.
    pub kind: NodeKind,
    /// Position in the node set.
    pub index: usize,
    /// Log label, e.g. `mc-node1`.
    pub label: String,
    /// Data directory.
    pub datadir: PathBuf,
    /// Node configuration file.
    pub config_path: PathBuf,
    /// RPC/API port.
    pub rpc_port: u16,
    /// P2P port.
    pub p2p_port: u16,
    /// Binary to run.
    pub binary: NodeBinary,
    /// Arguments after the binary's own, templates expanded.
    pub args: Vec<String>,
}

impl LaunchPlan {
    /// Plan `count` nodes of `kind` from the harness configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the tier's binaries are malformed or the
    /// port layout overflows.
    pub fn from_config(config: &HarnessConfig, kind: NodeKind, count: usize) -> Result<Self> {
        let tier = config.tier(kind);
        let seeded = |base: u16| {
            base.checked_add(config.port_seed).ok_or_else(|| {
                Error::Config(format!("{kind} port {base} + seed {} overflows", config.port_seed))
            })
        };
        let path_prefix = match kind {
            NodeKind::Mainchain => config.mc_bin_dir.clone(),
            NodeKind::Sidechain => None,
        };
        Ok(Self {
            kind,
            count,
            binaries: tier.parsed_binaries()?,
            common_args: tier.extra_args.clone(),
            extra_args: Vec::new(),
            root: config.tmpdir.clone(),
            rpc_base_port: seeded(tier.rpc_base_port)?,
            p2p_base_port: seeded(tier.p2p_base_port)?,
            credentials: tier.credentials(),
            path_prefix,
        })
    }

    /// Replace the binaries, one per node or one for all.
    #[must_use]
    pub fn with_binaries(mut self, binaries: Vec<NodeBinary>) -> Self {
        self.binaries = binaries;
        self
    }

    /// Use `test` for node 0 and `reference` for every other node.
    #[must_use]
    pub fn mixed(mut self, test: NodeBinary, reference: NodeBinary) -> Self {
        let mut binaries = Vec::with_capacity(self.count);
        binaries.push(test);
        binaries.extend(std::iter::repeat(reference).take(self.count.saturating_sub(1)));
        self.binaries = binaries;
        self
    }

    /// Apply the same extra arguments to every node.
    #[must_use]
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        self.extra_args = vec![args; self.count];
        self
    }

    /// Check the per-node lists against the node count.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on a length mismatch or an empty plan.
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(Error::Config(format!("{} plan has no nodes", self.kind)));
        }
        if self.binaries.len() != 1 && self.binaries.len() != self.count {
            return Err(Error::Config(format!(
                "{} plan: {} binaries for {} nodes",
                self.kind,
                self.binaries.len(),
                self.count
            )));
        }
        if !self.extra_args.is_empty() && self.extra_args.len() != self.count {
            return Err(Error::Config(format!(
                "{} plan: {} extra argument lists for {} nodes",
                self.kind,
                self.extra_args.len(),
                self.count
            )));
        }
        let last = u16::try_from(self.count - 1).unwrap_or(u16::MAX);
        if self.rpc_base_port.checked_add(last).is_none()
            || self.p2p_base_port.checked_add(last).is_none()
        {
            return Err(Error::Config(format!("{} plan: port range overflows", self.kind)));
        }
        Ok(())
    }

    /// Data directory of node `index`.
    #[must_use]
    pub fn datadir(&self, index: usize) -> PathBuf {
        bootstrap::node_dir(&self.root, self.kind, index)
    }

    /// Resolve node `index`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `index` is outside the plan.
    pub fn node(&self, index: usize) -> Result<NodeLaunch> {
        if index >= self.count {
            return Err(Error::Config(format!(
                "{} plan has {} nodes, no node {index}",
                self.kind, self.count
            )));
        }
        let offset = u16::try_from(index)
            .map_err(|_| Error::Config(format!("node index {index} out of port range")))?;
        let port = |base: u16| {
            base.checked_add(offset)
                .ok_or_else(|| Error::Config(format!("port {base} + {offset} overflows")))
        };
        let rpc_port = port(self.rpc_base_port)?;
        let p2p_port = port(self.p2p_base_port)?;
        let datadir = self.datadir(index);
        let config_path = bootstrap::config_path(&self.root, self.kind, index);
        let binary = self
            .binaries
            .get(index)
            .or_else(|| self.binaries.first())
            .cloned()
            .ok_or_else(|| Error::Config(format!("{} plan has no binaries", self.kind)))?;

        let vars = TemplateVars {
            datadir: &datadir,
            config: &config_path,
            rpc_port,
            p2p_port,
            index,
        };
        let args = self
            .kind
            .default_args()
            .iter()
            .chain(&self.common_args)
            .chain(self.extra_args.get(index).into_iter().flatten())
            .map(|arg| vars.expand(arg))
            .collect();

        Ok(NodeLaunch {
            kind: self.kind,
            index,
            label: format!("{}-node{index}", self.kind.short()),
            datadir,
            config_path,
            rpc_port,
            p2p_port,
            binary,
            args,
        })
    }
}

struct TemplateVars<'a> {
    datadir: &'a Path,
    config: &'a Path,
    rpc_port: u16,
    p2p_port: u16,
    index: usize,
}

impl TemplateVars<'_> {
    fn expand(&self, arg: &str) -> String {
        arg.replace("{datadir}", &self.datadir.to_string_lossy())
            .replace("{config}", &self.config.to_string_lossy())
            .replace("{rpc_port}", &self.rpc_port.to_string())
            .replace("{p2p_port}", &self.p2p_port.to_string())
            .replace("{index}", &self.index.to_string())
    }
}
