//! # twinchain-harness
//!
//! Integration-test harness for a two-tier blockchain network: mainchain
//! nodes speaking authenticated JSON-RPC and sidechain nodes speaking a JSON
//! HTTP API.
//!
//! The harness launches real node processes from configured binaries, wires
//! them into a topology, drives them through a scenario and tears everything
//! down again:
//! - RPC access via [`rpc::RpcProxy`] with transparent reconnect
//! - Process lifecycle via [`supervisor::Supervisor`]
//! - Bounded waits via [`convergence::Convergence`]
//! - Staged runs via [`TestRunner`], always producing one [`TestOutcome`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use twinchain_harness::scenarios::BlockGeneration;
//! use twinchain_harness::{HarnessConfig, TestRunner};
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = TestRunner::new(HarnessConfig::default());
//!     let outcome = runner.run(&BlockGeneration::default()).await;
//!     println!("{outcome}");
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bootstrap;
pub mod chain;
pub mod check;
pub mod config;
pub mod convergence;
pub mod error;
pub mod lifecycle;
pub mod rpc;
pub mod scenarios;
pub mod supervisor;
pub mod topology;

pub use chain::{ChainNode, Mainchain, Sidechain};
pub use check::{ensure, ensure_eq, expect_failure, Check};
pub use config::{HarnessConfig, NodeBinary, NodeKind, TierConfig, TimeoutConfig};
pub use convergence::Convergence;
pub use error::{Error, FailureKind, Result};
pub use lifecycle::{Failure, Scenario, Stage, TestContext, TestOutcome, TestRunner};
pub use rpc::{Dialect, NodeEndpoint, RpcProxy};
pub use supervisor::{LaunchPlan, NodeSet, Supervisor};
pub use topology::NetworkTopology;
