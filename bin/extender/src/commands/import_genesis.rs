//! Import Genesis Subcommand

use crate::{commands::connect_store, flags::GlobalArgs};
use anyhow::{Context, Result};
use clap::Parser;
use extender_core::GenesisImporter;
use extender_node_api::HttpNodeApi;
use std::sync::Arc;
use tracing::info;

/// The `import-genesis` Subcommand
///
/// Seeds the database with the addresses, coins, validators, balances and stakes of the
/// node's genesis document.
#[derive(Parser, Default, PartialEq, Eq, Debug, Clone)]
#[command(about = "Seeds an empty database from the node's genesis document")]
pub struct ImportGenesisCommand {}

impl ImportGenesisCommand {
    /// Runs the subcommand.
    pub async fn run(self, args: &GlobalArgs) -> Result<()> {
        let store = connect_store(&args.db).await?;
        let node = HttpNodeApi::new(args.node.config()).context("Failed to build node client")?;

        let report = GenesisImporter::new(Arc::new(node), store, args.extender_config())
            .import()
            .await
            .context("Failed to import genesis")?;
        info!(
            target: "extender",
            addresses = report.addresses,
            coins = report.coins,
            validators = report.validators,
            balances = report.balances,
            stakes = report.stakes,
            "Imported genesis"
        );
        Ok(())
    }
}
