//! A sidechain without certificates ceases and can no longer grow.
//!
//! One mainchain and one sidechain node. The mainchain is driven to the end
//! of the certificate submission window of the first withdrawal epoch while
//! no certificate is submitted; past that point the sidechain node must
//! refuse to forge blocks.

use crate::chain::{ChainNode, Mainchain, Sidechain};
use crate::check::{ensure_eq, expect_failure, Check};
use crate::config::{HarnessConfig, NodeKind};
use crate::error::{Error, FailureKind, Result};
use crate::lifecycle::{Scenario, TestContext};
use crate::supervisor::LaunchPlan;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::info;

/// Mainchain height at which sidechain support is active on regtest.
const SC_FORK_HEIGHT: u64 = 220;

/// Mainchain blocks referenced by one forged sidechain block.
const MC_REFS_PER_SC_BLOCK: usize = 3;

/// Ceased sidechain scenario.
#[derive(Debug)]
pub struct ScCeased {
    withdrawal_epoch_length: u32,
    creation_amount: Decimal,
    sidechain_id: Mutex<Option<String>>,
}

impl Default for ScCeased {
    fn default() -> Self {
        Self {
            withdrawal_epoch_length: 10,
            creation_amount: Decimal::from(100),
            sidechain_id: Mutex::new(None),
        }
    }
}

impl ScCeased {
    fn sidechain_id(&self) -> Result<String> {
        self.sidechain_id
            .lock()
            .clone()
            .ok_or_else(|| Error::Config("sidechain was not created".to_string()))
    }

    /// Forge enough sidechain blocks to reference `mc_blocks` mainchain blocks.
    async fn catch_up(sc: &Sidechain, mc_blocks: usize) -> Result<()> {
        for _ in 0..mc_blocks.div_ceil(MC_REFS_PER_SC_BLOCK) {
            sc.generate_next_block().await?;
        }
        Ok(())
    }

    /// Forging must fail and leave the sidechain height unchanged.
    async fn expect_rejected_block(sc: &Sidechain) -> Result<()> {
        let height = sc.block_height().await?;
        let err = expect_failure(
            sc.generate_next_block().await,
            &[FailureKind::Api, FailureKind::Timeout],
            "Node wrongly verified block at the end of the submission window for epoch with no certs",
        )?;
        info!("Expected forging failure: {}", err);
        ensure_eq(
            sc.block_height().await?,
            height,
            "Ceased sidechain grew",
        )
    }

    async fn create_sidechain(&self, mc: &Mainchain) -> Result<Value> {
        let height = mc.block_count().await?;
        if height < SC_FORK_HEIGHT {
            mc.generate(SC_FORK_HEIGHT - height).await?;
        }
        let address = mc.new_address().await?;
        let creation = mc
            .create_sidechain(self.withdrawal_epoch_length, &address, self.creation_amount)
            .await?;
        let id = creation
            .get("scid")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Serialization(format!("sc_create reply has no scid: {creation}")))?
            .to_string();
        mc.generate(1).await?;
        info!("Created sidechain {}", id);
        *self.sidechain_id.lock() = Some(id);
        Ok(creation)
    }
}

#[async_trait]
impl Scenario for ScCeased {
    fn name(&self) -> &str {
        "sc-ceased"
    }

    fn mainchain_plan(&self, config: &HarnessConfig) -> Result<Option<LaunchPlan>> {
        let plan = LaunchPlan::from_config(config, NodeKind::Mainchain, 1)?
            .with_extra_args(["-debug=sc", "-logtimemicros=1"]);
        Ok(Some(plan))
    }

    async fn sidechain_genesis(&self, ctx: &TestContext) -> Result<Value> {
        let mc = ctx.mainchain(0)?;
        let creation = self.create_sidechain(&mc).await?;
        Ok(json!({
            "scId": self.sidechain_id()?,
            "withdrawalEpochLength": self.withdrawal_epoch_length,
            "mcBlockHash": mc.best_block_hash().await?,
            "mcBlockHeight": mc.block_count().await?,
            "creation": creation,
        }))
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<()> {
        let mc = ctx.mainchain(0)?;
        let sc = ctx.sidechain(0)?;
        let sidechain_id = self.sidechain_id()?;
        let epoch = u64::from(self.withdrawal_epoch_length);

        // The genesis block already references one mainchain block.
        let hashes = mc.generate(epoch - 1).await?;
        Self::catch_up(&sc, hashes.len()).await?;

        let mut left_for_window_end = epoch / 5;
        let hashes = mc.generate(left_for_window_end - 1).await?;
        left_for_window_end -= hashes.len() as u64;
        ensure_eq(
            left_for_window_end,
            1,
            "1 MC block till the end of the withdrawal epoch expected",
        )?;
        ensure_eq(
            mc.sidechain_state(&sidechain_id).await?,
            "ALIVE".to_string(),
            "Sidechain expected to be alive",
        )?;
        Self::catch_up(&sc, hashes.len()).await?;

        // Reach the end of the certificate submission window.
        mc.generate(1).await?;
        let ceased = Check::disabled(
            "Sidechain expected to be ceased",
            "mainchain reports the ceased state late",
        );
        ceased.ensure_eq(mc.sidechain_state(&sidechain_id).await?, "CEASED".to_string())?;

        // One mainchain reference reaches the end of the window.
        Self::expect_rejected_block(&sc).await?;

        // Two references exceed it.
        mc.generate(1).await?;
        Self::expect_rejected_block(&sc).await
    }
}
