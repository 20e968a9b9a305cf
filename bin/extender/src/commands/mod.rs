//! Subcommands of the extender.

use crate::flags::DbArgs;
use anyhow::{Context, Result};
use extender_storage::{PgConfig, PgStore};
use std::sync::Arc;
use tracing::info;

mod run;
pub use run::RunCommand;

mod update_prices;
pub use update_prices::UpdatePricesCommand;

mod import_genesis;
pub use import_genesis::ImportGenesisCommand;

/// Connects to Postgres and applies pending migrations.
pub(crate) async fn connect_store(args: &DbArgs) -> Result<Arc<PgStore>> {
    let config = PgConfig::from(args);
    let store = PgStore::connect(&config).await.with_context(|| {
        format!("Failed to connect to database at {}:{}", config.host, config.port)
    })?;
    store.migrate().await.context("Failed to apply database migrations")?;
    info!(
        target: "extender",
        host = %config.host,
        database = %config.database,
        "Connected to database"
    );
    Ok(Arc::new(store))
}
