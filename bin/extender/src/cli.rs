//! Contains the extender CLI.

use crate::{
    commands::{ImportGenesisCommand, RunCommand, UpdatePricesCommand},
    flags::GlobalArgs,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use extender_cli::{cli_styles, init_prometheus_server, init_tracing_subscriber};
use extender_core::Metrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Subcommands of the extender.
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Runs the ingestion pipeline until interrupted.
    Run(RunCommand),
    /// Recomputes the price and capitalization of every stored coin.
    UpdatePrices(UpdatePricesCommand),
    /// Seeds an empty database from the node's genesis document.
    ImportGenesis(ImportGenesisCommand),
}

/// The extender CLI.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, styles = cli_styles(), long_about = None)]
pub struct Cli {
    /// Global arguments for the CLI.
    #[command(flatten)]
    pub global: GlobalArgs,
    /// The subcommand to run.
    #[command(subcommand)]
    pub subcommand: Commands,
}

impl Cli {
    /// Runs the CLI.
    pub fn run(self) -> Result<()> {
        Self::init_stack(&self.global)?;

        let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
        rt.block_on(async move {
            match self.subcommand {
                Commands::Run(cmd) => cmd.run(&self.global, shutdown_on_signal()).await,
                Commands::UpdatePrices(cmd) => cmd.run(&self.global).await,
                Commands::ImportGenesis(cmd) => cmd.run(&self.global).await,
            }
        })
    }

    /// Initializes the tracing subscriber and, if enabled, the Prometheus exporter.
    fn init_stack(args: &GlobalArgs) -> Result<()> {
        init_tracing_subscriber(args.log.verbosity, args.log.json)?;

        if args.metrics.enabled {
            init_prometheus_server(args.metrics.addr, args.metrics.port)?;
            Metrics::init();
        }
        Ok(())
    }
}

/// Returns a token cancelled on SIGINT or SIGTERM.
fn shutdown_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!(target: "extender", "Received shutdown signal");
        cancel.cancel();
    });
    token
}

/// Resolves on ctrl-c. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "extender", %err, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            warn!(target: "extender", %err, "Failed to install SIGTERM handler");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}
