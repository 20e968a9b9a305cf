//! Database arguments.

use clap::Parser;
use extender_storage::PgConfig;

/// Postgres connection arguments.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct DbArgs {
    /// Database host.
    #[arg(long = "db.host", env = "DB_HOST", default_value = "localhost")]
    pub host: String,
    /// Database port.
    #[arg(long = "db.port", env = "DB_PORT", default_value_t = 5432)]
    pub port: u16,
    /// Database user.
    #[arg(long = "db.user", env = "DB_USER", default_value = "noah")]
    pub user: String,
    /// Database password.
    #[arg(long = "db.password", env = "DB_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,
    /// Database name.
    #[arg(long = "db.name", env = "DB_NAME", default_value = "explorer")]
    pub name: String,
    /// Upper bound on pooled connections.
    #[arg(long = "db.pool-size", env = "DB_POOL_SIZE", default_value_t = 20)]
    pub pool_size: u32,
    /// Connections kept open while idle.
    #[arg(long = "db.min-idle", env = "DB_MIN_IDLE", default_value_t = 5)]
    pub min_idle: u32,
}

impl From<&DbArgs> for PgConfig {
    fn from(args: &DbArgs) -> Self {
        Self {
            host: args.host.clone(),
            port: args.port,
            user: args.user.clone(),
            password: args.password.clone(),
            database: args.name.clone(),
            max_connections: args.pool_size,
            min_connections: args.min_idle,
        }
    }
}
