//! Shipped scenarios driven end to end against mocked mainchain and
//! sidechain nodes that share one in-memory ledger.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::mock_node::{MockNode, Reply, Request};
use super::node_script::{script_reference, WAIT_FOR_STOP};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use twinchain_harness::bootstrap;
use twinchain_harness::rpc::{decode_amount, encode_amount};
use twinchain_harness::scenarios::{BlockGeneration, ScCeased};
use twinchain_harness::{FailureKind, HarnessConfig, NodeKind, Scenario, Stage, TestOutcome, TestRunner};

/// Sidechain id handed out by `sc_create`.
const SIDECHAIN_ID: &str = "1f2e3d4c5b6a79880000000000000000000000000000000000000000000000ff";

/// First mainchain height past the submission window of a sidechain created
/// at height 221 with a withdrawal epoch of 10 blocks.
const CEASING_HEIGHT: u64 = 232;

/// Fee the mocked wallet charges per mainchain transaction.
fn mc_fee() -> Decimal {
    Decimal::new(1, 4)
}

/// How the sidechain answers forging requests once the sidechain has ceased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forging {
    /// Refuse with an error envelope.
    Refused,
    /// Keep forging as if nothing happened.
    Unchecked,
    /// Report a refusal but still append the block.
    RefusedButApplied,
}

#[derive(Debug)]
struct Ledger {
    mc_blocks: Vec<Vec<String>>,
    mc_mempool: Vec<String>,
    mc_balances: Vec<Decimal>,
    mc_fees: HashMap<String, Decimal>,
    ceased_at: Option<u64>,
    sc_height: u64,
    sc_best_txs: Vec<String>,
    sc_pool: Vec<String>,
    sc_balances: Vec<u64>,
    sc_transfers: usize,
    forging: Forging,
    credit_sc_receiver: bool,
}

impl Ledger {
    fn new(nodes: usize) -> Self {
        Self {
            mc_blocks: Vec::new(),
            mc_mempool: Vec::new(),
            mc_balances: vec![Decimal::new(12_505, 1); nodes],
            mc_fees: HashMap::new(),
            ceased_at: None,
            sc_height: 1,
            sc_best_txs: Vec::new(),
            sc_pool: Vec::new(),
            sc_balances: vec![1_000; nodes],
            sc_transfers: 0,
            forging: Forging::Refused,
            credit_sc_receiver: true,
        }
    }

    fn mc_height(&self) -> u64 {
        self.mc_blocks.len() as u64
    }

    fn mine(&mut self) -> String {
        let txs = std::mem::take(&mut self.mc_mempool);
        self.mc_blocks.push(txs);
        block_hash(self.mc_height())
    }

    fn ceased(&self) -> bool {
        self.ceased_at.is_some_and(|height| self.mc_height() >= height)
    }

    fn forge(&mut self) -> String {
        self.sc_height += 1;
        self.sc_best_txs = std::mem::take(&mut self.sc_pool);
        sc_block_id(self.sc_height)
    }
}

fn block_hash(height: u64) -> String {
    format!("{height:064x}")
}

fn sc_block_id(height: u64) -> String {
    format!("sc{height:062x}")
}

fn with_ids(ids: &[String]) -> Vec<Value> {
    ids.iter().map(|id| json!({ "id": id })).collect()
}

fn node_index(reference: &str, prefix: &str) -> usize {
    reference.strip_prefix(prefix).unwrap().parse().unwrap()
}

fn mainchain_reply(ledger: &Mutex<Ledger>, root: &Path, node: usize, request: &Request) -> Reply {
    let body: Value = serde_json::from_str(&request.body).unwrap_or(Value::Null);
    let params = body["params"].as_array().cloned().unwrap_or_default();
    let mut ledger = ledger.lock();

    let result = match request.rpc_method().as_deref() {
        Some("getblockcount") => json!(ledger.mc_height()),
        Some("getbestblockhash") => json!(block_hash(ledger.mc_height())),
        Some("generate") => {
            let blocks = params[0].as_u64().unwrap();
            let hashes: Vec<String> = (0..blocks).map(|_| ledger.mine()).collect();
            json!(hashes)
        }
        Some("getblock") => {
            let hash = params[0].as_str().unwrap();
            let height = usize::try_from(u64::from_str_radix(hash, 16).unwrap()).unwrap();
            json!({ "hash": hash, "tx": ledger.mc_blocks[height - 1] })
        }
        Some("getrawmempool") => json!(ledger.mc_mempool),
        Some("getmempoolinfo") => json!({ "size": ledger.mc_mempool.len() }),
        Some("getnewaddress") => json!(format!("zaddr{node}")),
        Some("getbalance") => encode_amount(ledger.mc_balances[node]).unwrap(),
        Some("sendtoaddress") => {
            let receiver = node_index(params[0].as_str().unwrap(), "zaddr");
            let amount = decode_amount(&params[1]).unwrap();
            let txid = format!("mctx{}", ledger.mc_fees.len() + 1);
            ledger.mc_balances[node] -= amount + mc_fee();
            ledger.mc_balances[receiver] += amount;
            ledger.mc_fees.insert(txid.clone(), -mc_fee());
            ledger.mc_mempool.push(txid.clone());
            json!(txid)
        }
        Some("gettransaction") => {
            let fee = ledger.mc_fees[params[0].as_str().unwrap()];
            json!({ "fee": encode_amount(fee).unwrap() })
        }
        Some("addnode") => Value::Null,
        Some("getpeerinfo") => json!([]),
        Some("sc_create") => json!({ "txid": "c0ffee", "scid": SIDECHAIN_ID }),
        Some("getscinfo") => {
            let state = if ledger.ceased() { "CEASED" } else { "ALIVE" };
            json!({ "items": [{ "scid": SIDECHAIN_ID, "state": state }] })
        }
        Some("stop") => {
            let datadir = bootstrap::node_dir(root, NodeKind::Mainchain, node);
            std::fs::write(datadir.join("stop"), b"").unwrap();
            json!("stopping")
        }
        _ => return Reply::rpc_error(500, -32601, "Method not found"),
    };
    Reply::rpc_result(result)
}

fn sidechain_reply(ledger: &Mutex<Ledger>, node: usize, request: &Request) -> Reply {
    let body: Value = serde_json::from_str(&request.body).unwrap_or(Value::Null);
    let mut ledger = ledger.lock();

    let result = match request.path.as_str() {
        "/debug/info" => json!({
            "height": ledger.sc_height,
            "bestBlock": {
                "id": sc_block_id(ledger.sc_height),
                "transactions": with_ids(&ledger.sc_best_txs),
            },
        }),
        "/node/connect" => json!({}),
        "/nodeView/pool" => json!({
            "transactions": with_ids(&ledger.sc_pool),
            "size": ledger.sc_pool.len(),
        }),
        "/wallet/balances" => json!({
            "totalBalance": ledger.sc_balances[node],
            "publicKeys": [format!("pk{node}")],
        }),
        "/wallet/transfer" => {
            let receiver = node_index(body["recipient"].as_str().unwrap(), "pk");
            let amount = body["amount"].as_u64().unwrap();
            let fee = body["fee"].as_u64().unwrap();
            ledger.sc_balances[node] -= amount + fee;
            if ledger.credit_sc_receiver {
                ledger.sc_balances[receiver] += amount;
            }
            ledger.sc_transfers += 1;
            let txid = format!("sctx{}", ledger.sc_transfers);
            ledger.sc_pool.push(txid.clone());
            json!({ "id": txid })
        }
        "/debug/startMining" => {
            ledger.forge();
            json!({ "response": "ok" })
        }
        "/block/forgingInfo" => json!({
            "bestEpochNumber": 1,
            "bestSlotNumber": ledger.sc_height,
            "consensusSlotsInEpoch": 720,
        }),
        "/block/generate" => {
            if !ledger.ceased() || ledger.forging == Forging::Unchecked {
                json!({ "blockId": ledger.forge() })
            } else {
                if ledger.forging == Forging::RefusedButApplied {
                    ledger.forge();
                }
                return Reply::Status(
                    200,
                    json!({ "error": { "code": "0105", "description": "Block was not forged" } })
                        .to_string(),
                );
            }
        }
        _ => return Reply::Status(404, "The requested resource could not be found.".to_string()),
    };
    Reply::api_result(result)
}

/// Mocked tiers of `nodes` nodes each, plus the configuration pointing at them.
struct MockedNetwork {
    _dir: TempDir,
    config: HarnessConfig,
    ledger: Arc<Mutex<Ledger>>,
    mainchain: Vec<MockNode>,
    sidechain: Vec<MockNode>,
}

impl MockedNetwork {
    async fn start(nodes: usize, ledger: Ledger) -> Self {
        let dir = TempDir::new().unwrap();
        let root: PathBuf = dir.path().join("run");
        let ledger = Arc::new(Mutex::new(ledger));

        let mainchain = {
            let ledger = Arc::clone(&ledger);
            let root = root.clone();
            MockNode::serve_consecutive(nodes, move |node, request, _| {
                mainchain_reply(&ledger, &root, node, request)
            })
            .await
        };
        let sidechain = {
            let ledger = Arc::clone(&ledger);
            MockNode::serve_consecutive(nodes, move |node, request, _| {
                sidechain_reply(&ledger, node, request)
            })
            .await
        };

        let mut config = HarnessConfig::default();
        config.tmpdir = root;
        config.mainchain.binaries = vec![script_reference(dir.path(), "mc-node.sh", WAIT_FOR_STOP)];
        config.mainchain.rpc_base_port = mainchain[0].port();
        config.sidechain.binaries = vec![script_reference(dir.path(), "sc-node.sh", WAIT_FOR_STOP)];
        config.sidechain.rpc_base_port = sidechain[0].port();
        config.timeouts.startup_secs = 5;
        config.timeouts.sync_secs = 5;
        config.timeouts.poll_interval_ms = 50;
        config.timeouts.shutdown_grace_secs = 2;

        Self {
            _dir: dir,
            config,
            ledger,
            mainchain,
            sidechain,
        }
    }

    async fn run<S: Scenario>(&self, scenario: &S) -> TestOutcome {
        TestRunner::new(self.config.clone()).run(scenario).await
    }

    fn sidechain_paths(&self, node: usize) -> Vec<String> {
        self.sidechain[node].requests().into_iter().map(|r| r.path).collect()
    }
}

fn sc_ceased_ledger(forging: Forging) -> Ledger {
    let mut ledger = Ledger::new(1);
    ledger.ceased_at = Some(CEASING_HEIGHT);
    ledger.forging = forging;
    ledger
}

#[tokio::test]
async fn test_sc_ceased_passes_when_forging_is_refused() {
    let network = MockedNetwork::start(1, sc_ceased_ledger(Forging::Refused)).await;

    let outcome = network.run(&ScCeased::default()).await;

    assert!(outcome.success(), "{outcome}");
    assert!(outcome.teardown_clean);
    let ledger = network.ledger.lock();
    assert_eq!(ledger.mc_height(), CEASING_HEIGHT + 1);
    // Four blocks forged while the sidechain was alive, on top of genesis.
    assert_eq!(ledger.sc_height, 5);
    let forge_requests = network
        .sidechain_paths(0)
        .iter()
        .filter(|p| *p == "/block/generate")
        .count();
    assert_eq!(forge_requests, 6);
    assert!(!network.config.tmpdir.exists());
}

#[tokio::test]
async fn test_sc_ceased_fails_when_ceased_sidechain_forges() {
    let network = MockedNetwork::start(1, sc_ceased_ledger(Forging::Unchecked)).await;

    let outcome = network.run(&ScCeased::default()).await;

    let failure = outcome.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Assertion);
    assert_eq!(failure.stage, Stage::Running);
    assert!(
        failure.message.contains("Node wrongly verified block"),
        "{}",
        failure.message
    );
    assert!(outcome.teardown_clean);
}

#[tokio::test]
async fn test_sc_ceased_fails_when_refused_block_still_lands() {
    let network = MockedNetwork::start(1, sc_ceased_ledger(Forging::RefusedButApplied)).await;

    let outcome = network.run(&ScCeased::default()).await;

    let failure = outcome.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Assertion);
    assert!(failure.message.starts_with("Ceased sidechain grew"), "{}", failure.message);
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
async fn test_block_generation_balances_reconcile() {
    let network = MockedNetwork::start(2, Ledger::new(2)).await;

    let outcome = network.run(&BlockGeneration::with_nodes(2)).await;

    assert!(outcome.success(), "{outcome}");
    let ledger = network.ledger.lock();
    assert_eq!(ledger.mc_height(), 100 + 101 + 1);
    assert_eq!(ledger.mc_blocks.last().unwrap(), &vec!["mctx1".to_string()]);
    assert_eq!(ledger.sc_best_txs, vec!["sctx1".to_string()]);
    let sc_total: u64 = ledger.sc_balances.iter().sum();
    assert!(sc_total < 2_000);
    assert!(network.sidechain_paths(1).contains(&"/debug/startMining".to_string()));
    assert!(network.sidechain_paths(0).contains(&"/node/connect".to_string()));
}

#[tokio::test]
async fn test_block_generation_detects_missing_credit() {
    let mut ledger = Ledger::new(2);
    ledger.credit_sc_receiver = false;
    let network = MockedNetwork::start(2, ledger).await;

    let outcome = network.run(&BlockGeneration::with_nodes(2)).await;

    let failure = outcome.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::Assertion);
    assert!(
        failure
            .message
            .starts_with("Coins received/total amount mismatch for SC node 1"),
        "{}",
        failure.message
    );
    assert!(network.mainchain.iter().all(|node| node.connections() > 0));
}
