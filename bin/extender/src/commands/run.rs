//! Run Subcommand

use crate::{commands::connect_store, flags::GlobalArgs};
use anyhow::{Context, Result};
use clap::Parser;
use extender_core::{Extender, ExtenderActor, FatalSignal};
use extender_node_api::HttpNodeApi;
use extender_storage::DeferredLedger;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The `run` Subcommand
///
/// Ingests the chain from the height after the last stored block until interrupted.
///
/// # Usage
///
/// ```sh
/// extender [FLAGS] [OPTIONS] run
/// ```
#[derive(Parser, Default, PartialEq, Eq, Debug, Clone)]
#[command(about = "Runs the ingestion pipeline until interrupted")]
pub struct RunCommand {}

impl RunCommand {
    /// Runs the subcommand.
    pub async fn run(self, args: &GlobalArgs, shutdown: CancellationToken) -> Result<()> {
        let store = connect_store(&args.db).await?;
        let node = HttpNodeApi::new(args.node.config()).context("Failed to build node client")?;
        let ledger = DeferredLedger::open(&args.ledger.path).with_context(|| {
            format!("Failed to open ledger at '{}'", args.ledger.path.display())
        })?;

        let extender = Extender::new(
            Arc::new(node),
            store,
            Arc::new(ledger),
            args.extender_config(),
            FatalSignal::new(shutdown),
        );
        extender.start().await.context("Extender stopped on a fatal error")
    }
}
