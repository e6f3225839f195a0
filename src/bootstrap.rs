//! On-disk layout and configuration files of the test network.
//!
//! Mainchain nodes live in `<root>/node<i>` with a `zen.conf`; sidechain
//! nodes live in `<root>/sc_node<i>` with a JSON `node<i>.conf` that also
//! carries the genesis payload.

use crate::chain::Mainchain;
use crate::config::NodeKind;
use crate::error::{Error, Result};
use crate::supervisor::LaunchPlan;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Data directory of node `index` of `kind`.
#[must_use]
pub fn node_dir(root: &Path, kind: NodeKind, index: usize) -> PathBuf {
    root.join(format!("{}{index}", kind.dir_prefix()))
}

/// Configuration file of node `index` of `kind`.
#[must_use]
pub fn config_path(root: &Path, kind: NodeKind, index: usize) -> PathBuf {
    let dir = node_dir(root, kind, index);
    match kind {
        NodeKind::Mainchain => dir.join("zen.conf"),
        NodeKind::Sidechain => dir.join(format!("node{index}.conf")),
    }
}

/// Write fresh data directories and `zen.conf` files for a mainchain plan.
///
/// # Errors
///
/// Returns `Error::Io` if a directory or file cannot be written.
pub async fn initialize_chain_clean(plan: &LaunchPlan) -> Result<()> {
    expect_kind(plan, NodeKind::Mainchain)?;
    for index in 0..plan.count {
        let node = plan.node(index)?;
        tokio::fs::create_dir_all(&node.datadir).await?;

        let mut lines = vec!["regtest=1".to_string()];
        if let Some(creds) = &plan.credentials {
            lines.push(format!("rpcuser={}", creds.user));
            lines.push(format!("rpcpassword={}", creds.password));
        }
        lines.push(format!("port={}", node.p2p_port));
        lines.push(format!("rpcport={}", node.rpc_port));
        lines.push("listenonion=0".to_string());
        lines.push(String::new());

        tokio::fs::write(&node.config_path, lines.join("\n")).await?;
        debug!("Wrote {}", node.config_path.display());
    }
    info!("Initialized {} mainchain data directories", plan.count);
    Ok(())
}

/// Write fresh data directories and JSON configs for a sidechain plan.
///
/// # Errors
///
/// Returns `Error::Io` if a directory or file cannot be written.
pub async fn initialize_sc_chain_clean(plan: &LaunchPlan, genesis: &Value) -> Result<()> {
    expect_kind(plan, NodeKind::Sidechain)?;
    for index in 0..plan.count {
        let node = plan.node(index)?;
        tokio::fs::create_dir_all(&node.datadir).await?;

        let conf = json!({
            "dataDir": node.datadir.to_string_lossy(),
            "nodeName": node.label,
            "restApi": {
                "bindAddress": format!("127.0.0.1:{}", node.rpc_port),
            },
            "network": {
                "bindAddress": format!("127.0.0.1:{}", node.p2p_port),
            },
            "genesis": genesis,
        });
        tokio::fs::write(&node.config_path, serde_json::to_vec_pretty(&conf)?).await?;
        debug!("Wrote {}", node.config_path.display());
    }
    info!("Initialized {} sidechain data directories", plan.count);
    Ok(())
}

/// Genesis payload anchoring the sidechain at the current mainchain tip.
///
/// # Errors
///
/// Returns an RPC error if the mainchain node cannot be queried.
pub async fn genesis_from_mainchain(mainchain: &Mainchain) -> Result<Value> {
    let height = mainchain.block_count().await?;
    let hash = mainchain.best_block_hash().await?;
    Ok(json!({
        "mcBlockHash": hash,
        "mcBlockHeight": height,
    }))
}

fn expect_kind(plan: &LaunchPlan, kind: NodeKind) -> Result<()> {
    if plan.kind == kind {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "expected a {kind} plan, got a {} plan",
            plan.kind
        )))
    }
}
