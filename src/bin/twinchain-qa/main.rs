//! twinchain-qa CLI entry point.

mod cli;

use clap::Parser;
use cli::Cli;
use color_eyre::eyre::eyre;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use twinchain_harness::scenarios::{self, SCENARIO_NAMES};
use twinchain_harness::TestRunner;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    if cli.list {
        for name in SCENARIO_NAMES {
            println!("{name}");
        }
        return Ok(());
    }

    let config = cli.to_config()?;

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if config.trace_rpc {
        filter = filter.add_directive(cli::RPC_TRACE_DIRECTIVE.parse()?);
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("twinchain-qa v{}", env!("CARGO_PKG_VERSION"));

    let name = cli.scenario.clone().unwrap_or_default();
    let scenario = scenarios::by_name(&name, cli.comparison_binaries()?).ok_or_else(|| {
        eyre!(
            "unknown scenario {name:?}, expected one of: {}",
            SCENARIO_NAMES.join(", ")
        )
    })?;

    let runner = TestRunner::new(config);

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let outcome = runner.run_until(scenario.as_ref(), interrupt).await;

    println!("{outcome}");
    std::process::exit(outcome.exit_code());
}
