//! Full scenarios against real node binaries.
//!
//! The binaries are taken from the harness configuration named by
//! `TWINCHAIN_CONFIG`, or from the defaults (`zend` on `PATH` and the
//! sidechain jars under `resources/`).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::PathBuf;
use twinchain_harness::scenarios::{BlockGeneration, MultipleClients, ScCeased};
use twinchain_harness::{HarnessConfig, Scenario, TestRunner};

fn harness_config() -> HarnessConfig {
    std::env::var_os("TWINCHAIN_CONFIG").map_or_else(HarnessConfig::default, |path| {
        HarnessConfig::from_file(&PathBuf::from(path)).expect("Failed to load harness config")
    })
}

async fn run_scenario<S: Scenario>(scenario: &S) {
    let outcome = TestRunner::new(harness_config()).run(scenario).await;
    assert!(outcome.success(), "{outcome}");
    assert!(outcome.teardown_clean);
}

#[tokio::test]
#[ignore = "Requires zend and sidechain node binaries - run with --ignored"]
async fn test_block_generation() {
    run_scenario(&BlockGeneration::default()).await;
}

#[tokio::test]
#[ignore = "Requires zend and sidechain node binaries - run with --ignored"]
async fn test_sc_ceased() {
    run_scenario(&ScCeased::default()).await;
}

#[tokio::test]
#[ignore = "Requires test/reference zend binaries and both sidechain jars - run with --ignored"]
async fn test_multiple_clients() {
    run_scenario(&MultipleClients::default()).await;
}
