//! Supervisor behaviour with real `sh` child processes standing in for nodes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::mock_node::{MockNode, Reply};
use super::node_script::{free_port, read_pid, sh, EXIT_EARLY, IGNORE_TERM, TRAP_TERM, WAIT_FOR_STOP};
#[cfg(target_os = "linux")]
use super::node_script::process_exists;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use twinchain_harness::supervisor::{Liveness, NodeSet, StopOutcome};
use twinchain_harness::{Error, FailureKind, HarnessConfig, LaunchPlan, NodeBinary, NodeKind, Supervisor};

fn test_config(root: &Path) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.tmpdir = root.to_path_buf();
    config.timeouts.startup_secs = 5;
    config.timeouts.poll_interval_ms = 100;
    config.timeouts.shutdown_grace_secs = 2;
    config
}

fn plan(config: &HarnessConfig, kind: NodeKind, rpc_port: u16, binaries: Vec<NodeBinary>) -> LaunchPlan {
    let mut plan = LaunchPlan::from_config(config, kind, binaries.len())
        .unwrap()
        .with_binaries(binaries);
    plan.rpc_base_port = rpc_port;
    plan
}

/// A mock for node 0 plus a listener that never answers holding node 1's port.
async fn mock_with_silent_neighbour() -> (MockNode, tokio::net::TcpListener) {
    loop {
        let node = MockNode::scripted(vec![Reply::api_result(json!({}))]).await;
        let Some(next) = node.port().checked_add(1) else {
            continue;
        };
        if let Ok(silent) = tokio::net::TcpListener::bind(("127.0.0.1", next)).await {
            return (node, silent);
        }
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_partial_startup_kills_started_nodes() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.timeouts.startup_secs = 2;
    let (node, _silent) = mock_with_silent_neighbour().await;
    let plan = plan(
        &config,
        NodeKind::Sidechain,
        node.port(),
        vec![sh(WAIT_FOR_STOP), sh(EXIT_EARLY)],
    );

    let err = Supervisor::new(&config).start_set(&plan).await.unwrap_err();

    match &err {
        Error::Startup { node, .. } => assert_eq!(node, "sc-node1"),
        other => panic!("expected a startup error, got {other:?}"),
    }
    let pid = read_pid(&plan.datadir(0)).await;
    assert!(!process_exists(pid), "node 0 (pid {pid}) still running");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_unresponsive_node_times_out_and_is_killed() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.timeouts.startup_secs = 1;
    let plan = plan(&config, NodeKind::Sidechain, free_port().await, vec![sh(WAIT_FOR_STOP)]);

    let err = Supervisor::new(&config).start_set(&plan).await.unwrap_err();

    assert!(matches!(err, Error::Startup { .. }));
    assert_eq!(err.kind(), FailureKind::Timeout);
    let pid = read_pid(&plan.datadir(0)).await;
    assert!(!process_exists(pid));
}

#[tokio::test]
async fn test_stop_twice_is_noop() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let node = MockNode::scripted(vec![Reply::api_result(json!({}))]).await;
    let plan = plan(&config, NodeKind::Sidechain, node.port(), vec![sh(WAIT_FOR_STOP)]);
    let supervisor = Supervisor::new(&config);

    let mut set = supervisor.start_set(&plan).await.unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(*set.nodes()[0].process.liveness(), Liveness::Ready);

    let first = supervisor.stop_set(&mut set).await;
    let second = supervisor.stop_set(&mut set).await;

    assert_eq!(first, vec![StopOutcome::Graceful]);
    assert_eq!(second, vec![StopOutcome::AlreadyStopped]);
    assert_eq!(*set.nodes()[0].process.liveness(), Liveness::Stopped);
}

#[tokio::test]
async fn test_mainchain_stops_gracefully_on_request() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let stop_file = dir.path().join("node0").join("stop");

    let node = MockNode::serve(move |request, _| match request.rpc_method().as_deref() {
        Some("stop") => {
            std::fs::write(&stop_file, b"").unwrap();
            Reply::rpc_result(json!("stopping"))
        }
        Some("getblockcount") => Reply::rpc_result(json!(0)),
        _ => Reply::rpc_error(500, -32601, "Method not found"),
    })
    .await;
    let plan = plan(&config, NodeKind::Mainchain, node.port(), vec![sh(WAIT_FOR_STOP)]);
    let supervisor = Supervisor::new(&config);

    let mut set = supervisor.start_set(&plan).await.unwrap();
    let outcomes = supervisor.stop_set(&mut set).await;

    assert_eq!(outcomes, vec![StopOutcome::Graceful]);
    let methods: Vec<_> = node.requests().iter().filter_map(|r| r.rpc_method()).collect();
    assert_eq!(methods.last().map(String::as_str), Some("stop"));
}

#[tokio::test]
async fn test_warming_up_node_waits_for_readiness() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let node = MockNode::scripted(vec![
        Reply::rpc_error(500, -28, "Loading block index..."),
        Reply::rpc_error(500, -28, "Loading block index..."),
        Reply::rpc_result(json!(0)),
    ])
    .await;
    let plan = plan(&config, NodeKind::Mainchain, node.port(), vec![sh(WAIT_FOR_STOP)]);
    let supervisor = Supervisor::new(&config).with_shutdown_grace(Duration::from_millis(200));

    let mut set = supervisor.start_set(&plan).await.unwrap();

    assert!(node.connections() >= 3);
    supervisor.stop_set(&mut set).await;
}

#[tokio::test]
async fn test_missing_binary_is_startup_error() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let plan = plan(
        &config,
        NodeKind::Sidechain,
        free_port().await,
        vec![NodeBinary::executable(dir.path().join("no-such-node"))],
    );

    let err = Supervisor::new(&config).start_set(&plan).await.unwrap_err();

    assert!(matches!(err, Error::Startup { .. }));
    assert_eq!(err.kind(), FailureKind::Unclassified);
}

#[tokio::test]
async fn test_sidechain_node_gets_sigterm_before_kill() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let node = MockNode::scripted(vec![Reply::Status(404, "not found".to_string())]).await;
    let plan = plan(&config, NodeKind::Sidechain, node.port(), vec![sh(TRAP_TERM)]);
    let supervisor = Supervisor::new(&config);

    let mut set = supervisor.start_set(&plan).await.unwrap();
    read_pid(&plan.datadir(0)).await;
    let outcomes = supervisor.stop_set(&mut set).await;

    assert_eq!(outcomes, vec![StopOutcome::Graceful]);
    assert!(plan.datadir(0).join("got_term").exists());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_node_ignoring_sigterm_is_killed_after_grace() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let node = MockNode::scripted(vec![Reply::api_result(json!({}))]).await;
    let plan = plan(&config, NodeKind::Sidechain, node.port(), vec![sh(IGNORE_TERM)]);
    let supervisor = Supervisor::new(&config).with_shutdown_grace(Duration::from_millis(300));

    let mut set = supervisor.start_set(&plan).await.unwrap();
    let pid = read_pid(&plan.datadir(0)).await;
    let outcomes = supervisor.stop_set(&mut set).await;

    assert_eq!(outcomes, vec![StopOutcome::Forced]);
    assert!(!process_exists(pid));
}

#[tokio::test]
async fn test_start_into_keeps_handles_in_callers_set() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.timeouts.startup_secs = 1;
    let plan = plan(&config, NodeKind::Sidechain, free_port().await, vec![sh(WAIT_FOR_STOP)]);
    let supervisor = Supervisor::new(&config);
    let mut set = NodeSet::new(NodeKind::Sidechain);

    let err = supervisor.start_into(&plan, &mut set).await.unwrap_err();

    assert!(matches!(err, Error::Startup { .. }));
    assert_eq!(set.len(), 1);
    assert!(set.nodes()[0].process.liveness().is_terminal());
    assert_eq!(supervisor.stop_set(&mut set).await, vec![StopOutcome::AlreadyStopped]);
}

#[tokio::test]
async fn test_start_into_rejects_set_of_other_tier() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let plan = plan(&config, NodeKind::Sidechain, free_port().await, vec![sh(WAIT_FOR_STOP)]);
    let mut set = NodeSet::new(NodeKind::Mainchain);

    let err = Supervisor::new(&config).start_into(&plan, &mut set).await.unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert!(set.is_empty());
}
