//! Scenarios runnable from the `twinchain-qa` binary.

mod block_generation;
mod multiple_clients;
mod sc_ceased;

pub use block_generation::BlockGeneration;
pub use multiple_clients::MultipleClients;
pub use sc_ceased::ScCeased;

use crate::config::NodeBinary;
use crate::lifecycle::Scenario;

/// Names accepted by [`by_name`].
pub const SCENARIO_NAMES: &[&str] = &["block-generation", "sc-ceased", "multiple-clients"];

/// Binaries used by the comparison scenario.
#[derive(Debug, Clone)]
pub struct ComparisonBinaries {
    /// Mainchain binary under test (node 0).
    pub test_binary: NodeBinary,
    /// Mainchain binary for the other nodes.
    pub ref_binary: NodeBinary,
    /// One sidechain node per entry.
    pub jars: Vec<NodeBinary>,
}

/// Look up a scenario by name.
#[must_use]
pub fn by_name(name: &str, binaries: Option<ComparisonBinaries>) -> Option<Box<dyn Scenario>> {
    match name {
        "block-generation" => Some(Box::new(BlockGeneration::default())),
        "sc-ceased" => Some(Box::new(ScCeased::default())),
        "multiple-clients" => Some(Box::new(binaries.map_or_else(
            MultipleClients::default,
            |b| MultipleClients::new(b.test_binary, b.ref_binary, b.jars),
        ))),
        _ => None,
    }
}
