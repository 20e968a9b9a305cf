//! Update Prices Subcommand

use crate::{commands::connect_store, flags::GlobalArgs};
use anyhow::Result;
use clap::Parser;
use extender_core::update_prices;
use tracing::info;

/// The `update-prices` Subcommand
///
/// Recomputes price and capitalization of every stored coin from its stored volume,
/// reserve and reserve ratio.
#[derive(Parser, Default, PartialEq, Eq, Debug, Clone)]
#[command(about = "Recomputes the price and capitalization of every stored coin")]
pub struct UpdatePricesCommand {}

impl UpdatePricesCommand {
    /// Runs the subcommand.
    pub async fn run(self, args: &GlobalArgs) -> Result<()> {
        let store = connect_store(&args.db).await?;
        let updated = update_prices(store.as_ref()).await?;
        info!(target: "extender", updated, "Prices updated");
        Ok(())
    }
}
