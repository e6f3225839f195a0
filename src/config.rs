//! Configuration for twinchain-harness.

use crate::rpc::{Credentials, Dialect};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which tier of the network a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Mainchain node, reached via authenticated JSON-RPC.
    Mainchain,
    /// Sidechain node, reached via its JSON HTTP API.
    Sidechain,
}

impl NodeKind {
    /// Wire dialect spoken by nodes of this kind.
    #[must_use]
    pub fn dialect(self) -> Dialect {
        match self {
            Self::Mainchain => Dialect::JsonRpc,
            Self::Sidechain => Dialect::Rest,
        }
    }

    /// Lightweight call that shows a node is up during startup.
    #[must_use]
    pub fn liveness_method(self) -> &'static str {
        match self {
            Self::Mainchain => "getblockcount",
            Self::Sidechain => "debug_info",
        }
    }

    /// Prefix of per-node data directories and labels.
    #[must_use]
    pub fn dir_prefix(self) -> &'static str {
        match self {
            Self::Mainchain => "node",
            Self::Sidechain => "sc_node",
        }
    }

    /// Short tier name used in logs.
    #[must_use]
    pub fn short(self) -> &'static str {
        match self {
            Self::Mainchain => "mc",
            Self::Sidechain => "sc",
        }
    }

    /// Default launch arguments appended after the binary's own arguments.
    #[must_use]
    pub fn default_args(self) -> Vec<String> {
        let args: &[&str] = match self {
            Self::Mainchain => &[
                "-datadir={datadir}",
                "-server",
                "-keypool=1",
                "-discover=0",
                "-rest",
                "-regtest",
                "-port={p2p_port}",
                "-rpcport={rpc_port}",
            ],
            Self::Sidechain => &["{config}"],
        };
        args.iter().map(|a| (*a).to_string()).collect()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainchain => f.write_str("MC"),
            Self::Sidechain => f.write_str("SC"),
        }
    }
}

/// A launchable node binary: program plus leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBinary {
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments placed before the per-kind default arguments.
    pub args: Vec<String>,
}

impl NodeBinary {
    /// A plain executable.
    pub fn executable(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// A jar started as `java -cp <jar> <main_class>`.
    pub fn java_jar(jar: impl Into<String>, main_class: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("java"),
            args: vec!["-cp".to_string(), jar.into(), main_class.into()],
        }
    }

    /// Parse a binary reference such as `zend` or
    /// `resources/twinsChain.jar examples.hybrid.HybridApp`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the reference is empty.
    pub fn parse(reference: &str) -> crate::Result<Self> {
        let mut parts = reference.split_whitespace();
        let first = parts.next().ok_or_else(|| {
            crate::Error::Config(format!("empty binary reference {reference:?}"))
        })?;
        let rest: Vec<String> = parts.map(str::to_owned).collect();

        if Path::new(first)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"))
        {
            let mut args = vec!["-cp".to_string(), first.to_string()];
            args.extend(rest);
            return Ok(Self {
                program: PathBuf::from("java"),
                args,
            });
        }

        Ok(Self {
            program: PathBuf::from(first),
            args: rest,
        })
    }
}

impl fmt::Display for NodeBinary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Per-tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Binary references; one for the whole tier, or one per node.
    pub binaries: Vec<String>,

    /// Base RPC/API port; node `i` listens on `rpc_base_port + seed + i`.
    pub rpc_base_port: u16,

    /// Base P2P port; node `i` listens on `p2p_base_port + seed + i`.
    pub p2p_base_port: u16,

    /// RPC user, if the API is authenticated.
    #[serde(default)]
    pub rpc_user: Option<String>,

    /// RPC password, if the API is authenticated.
    #[serde(default)]
    pub rpc_password: Option<String>,

    /// Extra arguments applied to every node of the tier.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl TierConfig {
    /// Default mainchain tier settings.
    #[must_use]
    pub fn mainchain() -> Self {
        Self {
            binaries: vec!["zend".to_string()],
            rpc_base_port: 12_000,
            p2p_base_port: 11_000,
            rpc_user: Some("rt".to_string()),
            rpc_password: Some("rt".to_string()),
            extra_args: Vec::new(),
        }
    }

    /// Default sidechain tier settings.
    #[must_use]
    pub fn sidechain() -> Self {
        Self {
            binaries: vec!["resources/twinsChain.jar examples.hybrid.HybridApp".to_string()],
            rpc_base_port: 8_200,
            p2p_base_port: 8_300,
            rpc_user: None,
            rpc_password: None,
            extra_args: Vec::new(),
        }
    }

    /// Credentials configured for this tier.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.rpc_user, &self.rpc_password) {
            (Some(user), Some(password)) => Some(Credentials::new(user, password)),
            (Some(user), None) => Some(Credentials::new(user, "")),
            _ => None,
        }
    }

    /// Parsed binaries of this tier.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the list is empty or an entry is malformed.
    pub fn parsed_binaries(&self) -> crate::Result<Vec<NodeBinary>> {
        if self.binaries.is_empty() {
            return Err(crate::Error::Config("no binaries configured".to_string()));
        }
        self.binaries.iter().map(|b| NodeBinary::parse(b)).collect()
    }
}

/// Timeouts and polling intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Time a node set has to become responsive.
    #[serde(default = "default_startup_secs")]
    pub startup_secs: u64,

    /// Default bound for convergence waits.
    #[serde(default = "default_sync_secs")]
    pub sync_secs: u64,

    /// Delay between convergence/liveness polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Grace period between graceful shutdown and forced kill.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Transport timeout for a single RPC round trip.
    #[serde(default = "default_rpc_secs")]
    pub rpc_secs: u64,
}

impl TimeoutConfig {
    /// Startup deadline.
    #[must_use]
    pub fn startup(&self) -> Duration {
        Duration::from_secs(self.startup_secs)
    }

    /// Default convergence bound.
    #[must_use]
    pub fn sync(&self) -> Duration {
        Duration::from_secs(self.sync_secs)
    }

    /// Poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Shutdown grace period.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// RPC transport timeout.
    #[must_use]
    pub fn rpc(&self) -> Duration {
        Duration::from_secs(self.rpc_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            startup_secs: default_startup_secs(),
            sync_secs: default_sync_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            rpc_secs: default_rpc_secs(),
        }
    }
}

const fn default_startup_secs() -> u64 {
    60
}

const fn default_sync_secs() -> u64 {
    60
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_shutdown_grace_secs() -> u64 {
    30
}

const fn default_rpc_secs() -> u64 {
    6000
}

/// Harness configuration consumed by the lifecycle controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Root directory for node data directories.
    #[serde(default = "default_tmpdir")]
    pub tmpdir: PathBuf,

    /// Directory containing the mainchain binaries, prepended to the child `PATH`.
    #[serde(default)]
    pub mc_bin_dir: Option<PathBuf>,

    /// Start the networks split in two halves.
    #[serde(default)]
    pub split_network: bool,

    /// Log every RPC request and response.
    #[serde(default)]
    pub trace_rpc: bool,

    /// Leave data directories on exit.
    #[serde(default)]
    pub nocleanup: bool,

    /// Leave node processes running on exit.
    #[serde(default)]
    pub noshutdown: bool,

    /// Offset added to every port, for running harnesses side by side.
    #[serde(default)]
    pub port_seed: u16,

    /// Mainchain tier.
    #[serde(default = "TierConfig::mainchain")]
    pub mainchain: TierConfig,

    /// Sidechain tier.
    #[serde(default = "TierConfig::sidechain")]
    pub sidechain: TierConfig,

    /// Timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tmpdir: default_tmpdir(),
            mc_bin_dir: None,
            split_network: false,
            trace_rpc: false,
            nocleanup: false,
            noshutdown: false,
            port_seed: 0,
            mainchain: TierConfig::mainchain(),
            sidechain: TierConfig::sidechain(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Settings of the given tier.
    #[must_use]
    pub fn tier(&self, kind: NodeKind) -> &TierConfig {
        match kind {
            NodeKind::Mainchain => &self.mainchain,
            NodeKind::Sidechain => &self.sidechain,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a tier has no binaries or a timeout is zero.
    pub fn validate(&self) -> crate::Result<()> {
        for kind in [NodeKind::Mainchain, NodeKind::Sidechain] {
            self.tier(kind)
                .parsed_binaries()
                .map_err(|e| crate::Error::Config(format!("{kind} tier: {e}")))?;
        }
        if self.timeouts.startup_secs == 0 || self.timeouts.sync_secs == 0 {
            return Err(crate::Error::Config(
                "startup and sync timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn default_tmpdir() -> PathBuf {
    let suffix: u64 = rand::thread_rng().gen();
    std::env::temp_dir().join(format!("twinchain_test_{suffix:x}"))
}
