//! E2E tests for twinchain-harness.
//!
//! Most tests drive the harness against [`mock_node::MockNode`], a scripted
//! HTTP server, with `sh` processes standing in for node binaries.
//! `mocked_scenarios` runs the shipped scenarios against mocks sharing one
//! ledger; `scenarios` needs the real mainchain and sidechain binaries and is
//! ignored by default.
//!
//! ```text
//! TestRunner
//!     ├── Supervisor ── sh child processes
//!     └── RpcProxy ──── MockNode (127.0.0.1, ephemeral port)
//! ```

mod mock_node;
mod node_script;

#[cfg(test)]
mod mocked_scenarios;
#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod supervisor;
