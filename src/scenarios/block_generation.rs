//! Transfers on both tiers, mined into blocks and checked on every node.

use crate::chain::{ChainNode, Mainchain, Sidechain};
use crate::check::{ensure, ensure_eq};
use crate::config::{HarnessConfig, NodeKind};
use crate::error::{Error, Result};
use crate::lifecycle::{Scenario, TestContext};
use crate::supervisor::LaunchPlan;
use crate::topology::full_mesh;
use async_trait::async_trait;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::info;

/// Blocks each mainchain node mines so that coinbases mature.
const MATURITY_BLOCKS: u64 = 100;

/// Sidechain balance kept back from the random transfer amount.
const SC_RESERVE: u64 = 100;

/// Upper bound of the random sidechain fee.
const SC_MAX_FEE: u64 = 99;

/// Height the forging sidechain node has to reach.
const SC_TARGET_HEIGHT: u64 = 2;

/// Time allowed for sidechain forging.
const SC_FORGING_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of nodes per tier.
pub const DEFAULT_NODES: usize = 3;

/// Fully connected mainchain and sidechain networks exchanging one transfer
/// each.
#[derive(Debug, Clone)]
pub struct BlockGeneration {
    nodes: usize,
}

impl Default for BlockGeneration {
    fn default() -> Self {
        Self {
            nodes: DEFAULT_NODES,
        }
    }
}

impl BlockGeneration {
    /// Scenario with `nodes` nodes per tier; at least two are needed.
    #[must_use]
    pub fn with_nodes(nodes: usize) -> Self {
        Self { nodes }
    }

    fn plan(&self, config: &HarnessConfig, kind: NodeKind) -> Result<Option<LaunchPlan>> {
        if self.nodes < 2 {
            return Err(Error::Config(format!(
                "block-generation needs at least 2 nodes per tier, got {}",
                self.nodes
            )));
        }
        LaunchPlan::from_config(config, kind, self.nodes).map(Some)
    }
}

#[async_trait]
impl Scenario for BlockGeneration {
    fn name(&self) -> &str {
        "block-generation"
    }

    fn mainchain_plan(&self, config: &HarnessConfig) -> Result<Option<LaunchPlan>> {
        self.plan(config, NodeKind::Mainchain)
    }

    fn sidechain_plan(&self, config: &HarnessConfig) -> Result<Option<LaunchPlan>> {
        self.plan(config, NodeKind::Sidechain)
    }

    async fn setup_mainchain(&self, ctx: &mut TestContext) -> Result<()> {
        info!("Connecting {} mainchain nodes", self.nodes);
        ctx.connect(NodeKind::Mainchain, &full_mesh(self.nodes)).await
    }

    async fn setup_sidechain(&self, ctx: &mut TestContext) -> Result<()> {
        info!("Connecting {} sidechain nodes", self.nodes);
        ctx.connect(NodeKind::Sidechain, &full_mesh(self.nodes)).await
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<()> {
        let mcs = ctx.mainchains()?;
        let scs = ctx.sidechains()?;
        let convergence = ctx.convergence();
        let last = self.nodes - 1;

        // The last node mines one extra block so that the coinbases of the
        // other nodes mature.
        for (i, mc) in mcs.iter().enumerate() {
            let blocks = if i == last { MATURITY_BLOCKS + 1 } else { MATURITY_BLOCKS };
            mc.generate(blocks).await?;
        }
        ctx.sync_all().await?;

        let mc_receiver = mcs[1].new_address().await?;
        let mc_balance0 = mcs[0].balance().await?;
        let mc_balance1 = mcs[1].balance().await?;
        info!("MC node 0 balance: {}, MC node 1 balance: {}", mc_balance0, mc_balance1);
        let mc_spendable = mc_balance0.floor().to_u64().unwrap_or(0);
        ensure(mc_spendable >= 1, "MC node 0 has no spendable balance")?;
        let mc_amount = Decimal::from(rand::thread_rng().gen_range(1..=mc_spendable));

        let sc_receiver = scs[1].first_public_key().await?;
        let sc_balance0 = scs[0].total_balance().await?;
        let sc_balance1 = scs[1].total_balance().await?;
        info!("SC node 0 balance: {}, SC node 1 balance: {}", sc_balance0, sc_balance1);
        ensure(
            sc_balance0 > SC_RESERVE,
            format!("SC node 0 balance {sc_balance0} too low for a transfer"),
        )?;
        let sc_amount = rand::thread_rng().gen_range(1..=sc_balance0 - SC_RESERVE);
        let sc_fee = rand::thread_rng().gen_range(1..=SC_MAX_FEE);

        info!("MC node 0 sends {} to {}", mc_amount, mc_receiver);
        let mc_tx = mcs[0].send_to_address(&mc_receiver, mc_amount).await?;
        info!("SC node 0 sends {} (fee {}) to {}", sc_amount, sc_fee, sc_receiver);
        let sc_tx = scs[0].transfer(&sc_receiver, sc_amount, sc_fee).await?;

        convergence.sync_mempools(&mcs).await?;
        for mc in &mcs {
            check_in_mempool(mc, &mc_tx).await?;
        }
        convergence.sync_mempools(&scs).await?;
        for sc in &scs {
            check_in_mempool(sc, &sc_tx).await?;
        }

        let blocks = mcs[last].generate(1).await?;
        ensure_eq(blocks.len(), 1, "MC node could not generate a block")?;
        ctx.sync_all().await?;

        scs[last].start_mining().await?;
        convergence
            .with_timeout(SC_FORGING_TIMEOUT)
            .await_height_advance(&scs[last], 0, SC_TARGET_HEIGHT)
            .await?;
        ctx.sc_sync_all().await?;

        for mc in &mcs {
            check_in_mc_block(mc, &mc_tx).await?;
        }
        for sc in &scs {
            check_in_sc_block(sc, &sc_tx).await?;
        }

        for mc in &mcs {
            ensure_eq(mc.mempool_size().await?, 0, &format!("{} mempool not empty", mc.label()))?;
        }
        for sc in &scs {
            ensure_eq(sc.pool_size().await?, 0, &format!("{} mempool not empty", sc.label()))?;
        }

        // The reported fee of an outgoing transaction is negative.
        let mc_fee = mcs[0].transaction_fee(&mc_tx).await?;
        ensure_eq(
            mcs[0].balance().await?,
            mc_balance0 - (mc_amount - mc_fee),
            "Coins sent/total amount mismatch for MC node 0",
        )?;
        ensure_eq(
            mcs[1].balance().await?,
            mc_balance1 + mc_amount,
            "Coins received/total amount mismatch for MC node 1",
        )?;

        ensure_eq(
            scs[0].total_balance().await?,
            sc_balance0 - (sc_amount + sc_fee),
            "Coins sent/total amount mismatch for SC node 0",
        )?;
        ensure_eq(
            scs[1].total_balance().await?,
            sc_balance1 + sc_amount,
            "Coins received/total amount mismatch for SC node 1",
        )?;
        Ok(())
    }
}

async fn check_in_mempool<N: ChainNode>(node: &N, txid: &str) -> Result<()> {
    let pool = node.mempool_ids().await?;
    ensure(
        pool.contains(txid),
        format!("Transaction {txid} not in mempool of {}", node.label()),
    )
}

async fn check_in_mc_block(node: &Mainchain, txid: &str) -> Result<()> {
    let best = node.best_block_hash().await?;
    let txs = node.block_tx_ids(&best).await?;
    ensure(
        txs.iter().any(|t| t == txid),
        format!("Transaction {txid} not included in the new block of {}", node.label()),
    )
}

async fn check_in_sc_block(node: &Sidechain, txid: &str) -> Result<()> {
    let txs = node.best_block_tx_ids().await?;
    ensure(
        txs.iter().any(|t| t == txid),
        format!("Transaction {txid} not included in the new block of {}", node.label()),
    )
}
