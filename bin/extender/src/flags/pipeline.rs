//! Pipeline tuning arguments.

use clap::Parser;
use extender_core::{ExtenderConfig, WorkerCounts};
use std::{path::PathBuf, time::Duration};

/// Deferred ledger arguments.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct LedgerArgs {
    /// Directory of the deferred-resolution ledger.
    #[arg(long = "ledger.path", env = "LEDGER_PATH", default_value = "./ledger")]
    pub path: PathBuf,
    /// Pause between two ledger sweeps, in seconds.
    #[arg(long = "ledger.sweep-interval", env = "LEDGER_SWEEP_INTERVAL", default_value_t = 5)]
    pub sweep_interval: u64,
}

impl LedgerArgs {
    /// Pause between two ledger sweeps.
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}

/// Worker pool sizes.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct WorkerArgs {
    /// Address writers.
    #[arg(long = "workers.addresses", env = "WORKERS_ADDRESSES", default_value_t = 3)]
    pub addresses: usize,
    /// Transaction writers.
    #[arg(long = "workers.transactions", env = "WORKERS_TRANSACTIONS", default_value_t = 3)]
    pub transactions: usize,
    /// Transaction output writers.
    #[arg(long = "workers.outputs", env = "WORKERS_OUTPUTS", default_value_t = 3)]
    pub outputs: usize,
    /// Invalid transaction writers.
    #[arg(
        long = "workers.invalid-transactions",
        env = "WORKERS_INVALID_TRANSACTIONS",
        default_value_t = 1,
    )]
    pub invalid_transactions: usize,
    /// Transaction-validator link writers.
    #[arg(
        long = "workers.transaction-validators",
        env = "WORKERS_TRANSACTION_VALIDATORS",
        default_value_t = 1,
    )]
    pub transaction_validators: usize,
    /// Reward writers.
    #[arg(long = "workers.rewards", env = "WORKERS_REWARDS", default_value_t = 3)]
    pub rewards: usize,
    /// Slash writers.
    #[arg(long = "workers.slashes", env = "WORKERS_SLASHES", default_value_t = 3)]
    pub slashes: usize,
    /// Balance fetchers.
    #[arg(long = "workers.balance-fetchers", env = "WORKERS_BALANCE_FETCHERS", default_value_t = 3)]
    pub balance_fetchers: usize,
    /// Balance writers.
    #[arg(long = "workers.balance-updaters", env = "WORKERS_BALANCE_UPDATERS", default_value_t = 3)]
    pub balance_updaters: usize,
    /// Coin refresh workers.
    #[arg(long = "workers.coins", env = "WORKERS_COINS", default_value_t = 1)]
    pub coins: usize,
}

impl From<&WorkerArgs> for WorkerCounts {
    fn from(args: &WorkerArgs) -> Self {
        Self {
            addresses: args.addresses,
            transactions: args.transactions,
            outputs: args.outputs,
            invalid_transactions: args.invalid_transactions,
            transaction_validators: args.transaction_validators,
            rewards: args.rewards,
            slashes: args.slashes,
            balance_fetchers: args.balance_fetchers,
            balance_updaters: args.balance_updaters,
            coins: args.coins,
        }
    }
}

/// Reward aggregation arguments.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct RewardArgs {
    /// Aggregate rewards every this many heights; `0` disables aggregation.
    #[arg(
        long = "rewards.aggregate-every-blocks",
        env = "REWARDS_AGGREGATE_EVERY_BLOCKS",
        default_value_t = 60,
    )]
    pub aggregate_every_blocks: u64,
    /// Time bucket of aggregated rewards, e.g. `hour` or `day`.
    #[arg(
        long = "rewards.aggregate-interval",
        env = "REWARDS_AGGREGATE_INTERVAL",
        default_value = "hour",
    )]
    pub aggregate_interval: String,
}

/// Pipeline tuning arguments.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct PipelineArgs {
    /// Symbol of the chain's base coin.
    #[arg(long = "base-coin", env = "BASE_COIN", default_value = "NOAH")]
    pub base_coin: String,
    /// Transactions per writer batch.
    #[arg(long = "tx-chunk-size", env = "TX_CHUNK_SIZE", default_value_t = 100)]
    pub tx_chunk_size: usize,
    /// Addresses per insert statement and balance request.
    #[arg(long = "addr-chunk-size", env = "ADDR_CHUNK_SIZE", default_value_t = 30)]
    pub addr_chunk_size: usize,
    /// Rewards and slashes per writer batch.
    #[arg(long = "events-chunk-size", env = "EVENTS_CHUNK_SIZE", default_value_t = 100)]
    pub events_chunk_size: usize,
    /// Stakes per insert statement.
    #[arg(long = "stake-chunk-size", env = "STAKE_CHUNK_SIZE", default_value_t = 1_000)]
    pub stake_chunk_size: usize,
    /// Worker pool sizes.
    #[command(flatten)]
    pub workers: WorkerArgs,
    /// Reward aggregation.
    #[command(flatten)]
    pub rewards: RewardArgs,
}

impl PipelineArgs {
    /// Applies the arguments to `config`.
    pub fn apply(&self, config: ExtenderConfig) -> ExtenderConfig {
        ExtenderConfig {
            base_coin: self.base_coin.clone(),
            tx_chunk_size: self.tx_chunk_size,
            addr_chunk_size: self.addr_chunk_size,
            events_chunk_size: self.events_chunk_size,
            stake_chunk_size: self.stake_chunk_size,
            workers: (&self.workers).into(),
            reward_aggregate_every_blocks: self.rewards.aggregate_every_blocks,
            reward_aggregate_interval: self.rewards.aggregate_interval.clone(),
            ..config
        }
    }
}
