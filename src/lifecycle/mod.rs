//! Test lifecycle controller.
//!
//! A run walks a fixed sequence of stages: configure, bootstrap and start the
//! mainchain tier, bootstrap and start the sidechain tier, run the scenario.
//! Teardown is always attempted afterwards, whatever happened before, and the
//! run produces exactly one [`TestOutcome`].

mod outcome;

pub use outcome::{Failure, Stage, TestOutcome};

use crate::bootstrap;
use crate::chain::{Mainchain, Sidechain};
use crate::config::{HarnessConfig, NodeKind};
use crate::convergence::Convergence;
use crate::error::{Error, Result};
use crate::supervisor::{LaunchPlan, NodeSet, Supervisor};
use crate::topology;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, warn};

/// Everything scenario code gets to work with.
pub struct TestContext {
    config: HarnessConfig,
    supervisor: Supervisor,
    convergence: Convergence,
    mainchain: Option<NodeSet>,
    sidechain: Option<NodeSet>,
    stage: Stage,
}

impl TestContext {
    /// Context for a run under `config`.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            supervisor: Supervisor::new(&config),
            convergence: Convergence::from_config(&config),
            config,
            mainchain: None,
            sidechain: None,
            stage: Stage::Configuring,
        }
    }

    /// Harness configuration.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Process supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Convergence engine.
    #[must_use]
    pub fn convergence(&self) -> Convergence {
        self.convergence
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The node set of `kind`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if that tier was not started.
    pub fn node_set(&self, kind: NodeKind) -> Result<&NodeSet> {
        match kind {
            NodeKind::Mainchain => self.mainchain.as_ref(),
            NodeKind::Sidechain => self.sidechain.as_ref(),
        }
        .ok_or_else(|| Error::Config(format!("no {kind} network was started")))
    }

    /// Mutable access to the node set of `kind`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if that tier was not started.
    pub fn node_set_mut(&mut self, kind: NodeKind) -> Result<&mut NodeSet> {
        match kind {
            NodeKind::Mainchain => self.mainchain.as_mut(),
            NodeKind::Sidechain => self.sidechain.as_mut(),
        }
        .ok_or_else(|| Error::Config(format!("no {kind} network was started")))
    }

    /// Mainchain node `index`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if there is no such node.
    pub fn mainchain(&self, index: usize) -> Result<Mainchain> {
        self.node_set(NodeKind::Mainchain)?.mainchain(index)
    }

    /// Sidechain node `index`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if there is no such node.
    pub fn sidechain(&self, index: usize) -> Result<Sidechain> {
        self.node_set(NodeKind::Sidechain)?.sidechain(index)
    }

    /// All mainchain nodes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the mainchain tier was not started.
    pub fn mainchains(&self) -> Result<Vec<Mainchain>> {
        self.node_set(NodeKind::Mainchain)?.mainchains()
    }

    /// All sidechain nodes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the sidechain tier was not started.
    pub fn sidechains(&self) -> Result<Vec<Sidechain>> {
        self.node_set(NodeKind::Sidechain)?.sidechains()
    }

    /// Connect `links` bidirectionally within the `kind` tier.
    ///
    /// # Errors
    ///
    /// Returns an RPC or timeout error if a connection cannot be made.
    pub async fn connect(&mut self, kind: NodeKind, links: &[(usize, usize)]) -> Result<()> {
        let convergence = self.convergence;
        topology::connect_links(self.node_set_mut(kind)?, links, &convergence).await
    }

    /// Wait for mainchain blocks, then mempools, to agree.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if they do not converge in time.
    pub async fn sync_all(&self) -> Result<()> {
        let nodes = self.mainchains()?;
        self.convergence.sync_blocks(&nodes).await?;
        self.convergence.sync_mempools(&nodes).await
    }

    /// Wait for sidechain blocks, then mempools, to agree.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if they do not converge in time.
    pub async fn sc_sync_all(&self) -> Result<()> {
        let nodes = self.sidechains()?;
        self.convergence.sync_blocks(&nodes).await?;
        self.convergence.sync_mempools(&nodes).await
    }
}

/// A test scenario plugged into the lifecycle.
///
/// Every hook has a default: one node per tier, a chain topology split at the
/// midpoint when `split_network` is set, and a sidechain genesis anchored at
/// mainchain node 0.
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Mainchain nodes to start; `None` skips the tier.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the plan cannot be built.
    fn mainchain_plan(&self, config: &HarnessConfig) -> Result<Option<LaunchPlan>> {
        LaunchPlan::from_config(config, NodeKind::Mainchain, 1).map(Some)
    }

    /// Sidechain nodes to start; `None` skips the tier.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the plan cannot be built.
    fn sidechain_plan(&self, config: &HarnessConfig) -> Result<Option<LaunchPlan>> {
        LaunchPlan::from_config(config, NodeKind::Sidechain, 1).map(Some)
    }

    /// Wire the mainchain topology once its nodes are up.
    async fn setup_mainchain(&self, ctx: &mut TestContext) -> Result<()> {
        default_topology(ctx, NodeKind::Mainchain).await
    }

    /// Genesis payload written into every sidechain node config.
    async fn sidechain_genesis(&self, ctx: &TestContext) -> Result<Value> {
        match ctx.mainchain(0) {
            Ok(node) => bootstrap::genesis_from_mainchain(&node).await,
            Err(_) => Ok(json!({})),
        }
    }

    /// Wire the sidechain topology once its nodes are up.
    async fn setup_sidechain(&self, ctx: &mut TestContext) -> Result<()> {
        default_topology(ctx, NodeKind::Sidechain).await
    }

    /// Scenario body.
    async fn run(&self, ctx: &mut TestContext) -> Result<()>;
}

async fn default_topology(ctx: &mut TestContext, kind: NodeKind) -> Result<()> {
    let count = ctx.node_set(kind)?.len();
    let links = topology::chain_links(count, ctx.config.split_network);
    ctx.connect(kind, &links).await
}

/// Drives scenarios through the lifecycle.
#[derive(Debug, Clone)]
pub struct TestRunner {
    config: HarnessConfig,
}

impl TestRunner {
    /// Runner for `config`.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Run `scenario` to completion.
    pub async fn run<S: Scenario + ?Sized>(&self, scenario: &S) -> TestOutcome {
        self.run_until(scenario, std::future::pending()).await
    }

    /// Run `scenario`, abandoning the remaining stages when `interrupt`
    /// completes first. Teardown still runs.
    pub async fn run_until<S, I>(&self, scenario: &S, interrupt: I) -> TestOutcome
    where
        S: Scenario + ?Sized,
        I: Future<Output = ()>,
    {
        let mut ctx = TestContext::new(self.config.clone());
        info!("Running scenario {}", scenario.name());

        let ended = {
            let stages = AssertUnwindSafe(drive(scenario, &mut ctx)).catch_unwind();
            tokio::select! {
                result = stages => match result {
                    Ok(result) => Ended::Finished(result),
                    Err(payload) => Ended::Panicked(payload),
                },
                () = interrupt => Ended::Interrupted,
            }
        };

        let failure = match ended {
            Ended::Finished(Ok(())) => None,
            Ended::Finished(Err(e)) => Some(Failure::from_error(&e, ctx.stage)),
            Ended::Panicked(payload) => Some(Failure::from_panic(payload.as_ref(), ctx.stage)),
            Ended::Interrupted => Some(Failure::from_error(
                &Error::Unclassified("interrupted".to_string()),
                ctx.stage,
            )),
        };
        if let Some(failure) = &failure {
            error!("{} ({})", failure, failure.stage);
        }

        let teardown_clean = self.teardown(&mut ctx).await;
        if teardown_clean && !self.config.nocleanup && !self.config.noshutdown {
            self.cleanup().await;
        }
        ctx.stage = Stage::Reported;

        TestOutcome {
            scenario: scenario.name().to_string(),
            failure,
            teardown_clean,
        }
    }

    /// Stop every node set that was created, sidechain first, including sets
    /// whose startup was abandoned. Returns whether teardown completed.
    async fn teardown(&self, ctx: &mut TestContext) -> bool {
        ctx.stage = Stage::TearingDown;

        if self.config.noshutdown {
            info!("Note: node processes were not stopped and may still be running");
            return true;
        }

        let supervisor = ctx.supervisor.clone();
        let stopped = AssertUnwindSafe(async {
            if let Some(set) = ctx.sidechain.as_mut() {
                info!("Stopping SC nodes");
                supervisor.stop_set(set).await;
            }
            if let Some(set) = ctx.mainchain.as_mut() {
                info!("Stopping MC nodes");
                supervisor.stop_set(set).await;
            }
        })
        .catch_unwind()
        .await;

        if stopped.is_err() {
            warn!("Teardown panicked; leaving {} in place", self.config.tmpdir.display());
            return false;
        }
        true
    }

    async fn cleanup(&self) {
        info!("Cleaning up {}", self.config.tmpdir.display());
        if let Err(e) = tokio::fs::remove_dir_all(&self.config.tmpdir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to clean up {}: {}", self.config.tmpdir.display(), e);
            }
        }
    }
}

enum Ended {
    Finished(Result<()>),
    Panicked(Box<dyn Any + Send>),
    Interrupted,
}

async fn drive<S: Scenario + ?Sized>(scenario: &S, ctx: &mut TestContext) -> Result<()> {
    ctx.stage = Stage::Configuring;
    ctx.config.validate()?;
    tokio::fs::create_dir_all(&ctx.config.tmpdir).await?;
    info!("Initializing test directory {}", ctx.config.tmpdir.display());

    if let Some(plan) = scenario.mainchain_plan(&ctx.config)? {
        ctx.stage = Stage::Bootstrapping(NodeKind::Mainchain);
        bootstrap::initialize_chain_clean(&plan).await?;

        ctx.stage = Stage::NetworkUp(NodeKind::Mainchain);
        let set = ctx.mainchain.insert(NodeSet::new(NodeKind::Mainchain));
        ctx.supervisor.start_into(&plan, set).await?;
        scenario.setup_mainchain(ctx).await?;
    }

    if let Some(plan) = scenario.sidechain_plan(&ctx.config)? {
        ctx.stage = Stage::Bootstrapping(NodeKind::Sidechain);
        let genesis = scenario.sidechain_genesis(ctx).await?;
        bootstrap::initialize_sc_chain_clean(&plan, &genesis).await?;

        ctx.stage = Stage::NetworkUp(NodeKind::Sidechain);
        let set = ctx.sidechain.insert(NodeSet::new(NodeKind::Sidechain));
        ctx.supervisor.start_into(&plan, set).await?;
        scenario.setup_sidechain(ctx).await?;
    }

    ctx.stage = Stage::Running;
    scenario.run(ctx).await
}
