//! Nodes built from different binaries coexisting in one network.

use crate::chain::ChainNode;
use crate::check::{ensure, expect_failure};
use crate::config::{HarnessConfig, NodeBinary, NodeKind};
use crate::error::{FailureKind, Result};
use crate::lifecycle::{Scenario, TestContext};
use crate::supervisor::LaunchPlan;
use async_trait::async_trait;
use tracing::info;

/// Number of mainchain nodes: one test node, the rest reference nodes.
const MC_NODES: usize = 2;

/// Mainchain nodes from a test and a reference binary, one sidechain node per
/// jar. Sidechain node 1 runs a jar that only serves `GET` and must reject
/// the `POST`ed `debug/info` call.
#[derive(Debug, Clone)]
pub struct MultipleClients {
    test_binary: NodeBinary,
    ref_binary: NodeBinary,
    jars: Vec<NodeBinary>,
}

impl Default for MultipleClients {
    fn default() -> Self {
        Self {
            test_binary: NodeBinary::executable("zend"),
            ref_binary: NodeBinary::executable("zend"),
            jars: vec![
                NodeBinary::java_jar("resources/twinsChain.jar", "examples.hybrid.HybridApp"),
                NodeBinary::java_jar("resources/twinsChainOld.jar", "examples.hybrid.HybridApp"),
            ],
        }
    }
}

impl MultipleClients {
    /// Scenario comparing `test_binary` against `ref_binary`, with one
    /// sidechain node per entry of `jars`.
    #[must_use]
    pub fn new(test_binary: NodeBinary, ref_binary: NodeBinary, jars: Vec<NodeBinary>) -> Self {
        Self {
            test_binary,
            ref_binary,
            jars,
        }
    }
}

#[async_trait]
impl Scenario for MultipleClients {
    fn name(&self) -> &str {
        "multiple-clients"
    }

    fn mainchain_plan(&self, config: &HarnessConfig) -> Result<Option<LaunchPlan>> {
        let plan = LaunchPlan::from_config(config, NodeKind::Mainchain, MC_NODES)?
            .mixed(self.test_binary.clone(), self.ref_binary.clone())
            .with_extra_args(["-debug", "-whitelist=127.0.0.1"]);
        Ok(Some(plan))
    }

    fn sidechain_plan(&self, config: &HarnessConfig) -> Result<Option<LaunchPlan>> {
        let plan = LaunchPlan::from_config(config, NodeKind::Sidechain, self.jars.len())?
            .with_binaries(self.jars.clone());
        Ok(Some(plan))
    }

    async fn setup_mainchain(&self, _ctx: &mut TestContext) -> Result<()> {
        Ok(())
    }

    async fn setup_sidechain(&self, _ctx: &mut TestContext) -> Result<()> {
        Ok(())
    }

    async fn run(&self, ctx: &mut TestContext) -> Result<()> {
        for mc in ctx.mainchains()? {
            let info = mc.info().await?;
            ensure(!info.is_null(), format!("{} not alive", mc.label()))?;
            info!("{} alive, getinfo: {}", mc.label(), info);
        }

        let scs = ctx.sidechains()?;
        if let Some(current) = scs.first() {
            let info = current.info().await?;
            ensure(!info.is_null(), format!("{} not alive", current.label()))?;
            info!("{} alive, debug/info: {}", current.label(), info);
        }
        if let Some(old) = scs.get(1) {
            expect_failure(
                old.info().await,
                &[FailureKind::Api],
                &format!("{} accepted a POSTed debug/info", old.label()),
            )?;
            info!("{} is alive and rejected the call as expected", old.label());
        }
        Ok(())
    }
}
