//! Command-line interface definition.

use clap::Parser;
use std::path::PathBuf;
use twinchain_harness::scenarios::ComparisonBinaries;
use twinchain_harness::{HarnessConfig, NodeBinary};

/// Main class of the sidechain application jars.
const SC_MAIN_CLASS: &str = "examples.hybrid.HybridApp";

/// Log directive enabled when RPC tracing is on.
pub const RPC_TRACE_DIRECTIVE: &str = "twinchain_harness::rpc=debug";

/// Run a mainchain/sidechain integration scenario.
#[derive(Parser, Debug)]
#[command(name = "twinchain-qa")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Scenario to run.
    #[arg(required_unless_present = "list")]
    pub scenario: Option<String>,

    /// List available scenarios and exit.
    #[arg(long)]
    pub list: bool,

    /// Harness configuration file (TOML).
    #[arg(long, env = "TWINCHAIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root directory for node data directories.
    #[arg(long)]
    pub tmpdir: Option<PathBuf>,

    /// Leave data directories on exit.
    #[arg(long)]
    pub nocleanup: bool,

    /// Leave node processes running on exit.
    #[arg(long)]
    pub noshutdown: bool,

    /// Directory containing the mainchain binaries.
    #[arg(long, env = "TWINCHAIN_ZENDIR")]
    pub zendir: Option<PathBuf>,

    /// Sidechain jar (optionally followed by its main class).
    #[arg(long)]
    pub scjarpath: Option<String>,

    /// Comma-separated sidechain jars, one node each.
    #[arg(long, value_delimiter = ',')]
    pub jarspathlist: Vec<String>,

    /// Mainchain binary under test.
    #[arg(long)]
    pub testbinary: Option<PathBuf>,

    /// Mainchain reference binary.
    #[arg(long)]
    pub refbinary: Option<PathBuf>,

    /// Log every RPC request and response.
    #[arg(long)]
    pub tracerpc: bool,

    /// Start the networks split in two halves.
    #[arg(long)]
    pub split: bool,

    /// Offset added to every node port.
    #[arg(long)]
    pub port_seed: Option<u16>,

    /// Log level.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Build the harness configuration from the file (if any) and the flags.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn to_config(&self) -> color_eyre::Result<HarnessConfig> {
        let mut config = if let Some(ref path) = self.config {
            HarnessConfig::from_file(path)?
        } else {
            HarnessConfig::default()
        };

        if let Some(ref tmpdir) = self.tmpdir {
            config.tmpdir.clone_from(tmpdir);
        }
        if let Some(ref zendir) = self.zendir {
            config.mc_bin_dir = Some(zendir.clone());
        }
        if let Some(ref jar) = self.scjarpath {
            config.sidechain.binaries = vec![jar_reference(jar)];
        }
        if let Some(seed) = self.port_seed {
            config.port_seed = seed;
        }
        config.nocleanup |= self.nocleanup;
        config.noshutdown |= self.noshutdown;
        config.trace_rpc |= self.tracerpc;
        config.split_network |= self.split;

        Ok(config)
    }

    /// Binaries for the comparison scenario, when any was given.
    ///
    /// # Errors
    ///
    /// Returns an error if a jar reference is malformed.
    pub fn comparison_binaries(&self) -> color_eyre::Result<Option<ComparisonBinaries>> {
        if self.testbinary.is_none() && self.refbinary.is_none() && self.jarspathlist.is_empty() {
            return Ok(None);
        }

        let test_binary = NodeBinary::executable(
            self.testbinary.clone().unwrap_or_else(|| PathBuf::from("zend")),
        );
        let ref_binary = self
            .refbinary
            .clone()
            .map_or_else(|| test_binary.clone(), NodeBinary::executable);
        let jars = if self.jarspathlist.is_empty() {
            vec![
                NodeBinary::java_jar("resources/twinsChain.jar", SC_MAIN_CLASS),
                NodeBinary::java_jar("resources/twinsChainOld.jar", SC_MAIN_CLASS),
            ]
        } else {
            self.jarspathlist
                .iter()
                .map(|jar| NodeBinary::parse(&jar_reference(jar)))
                .collect::<Result<_, _>>()?
        };

        Ok(Some(ComparisonBinaries {
            test_binary,
            ref_binary,
            jars,
        }))
    }
}

/// A bare jar path gets the default main class.
fn jar_reference(jar: &str) -> String {
    let jar = jar.trim();
    if jar.contains(char::is_whitespace) {
        jar.to_string()
    } else {
        format!("{jar} {SC_MAIN_CLASS}")
    }
}
