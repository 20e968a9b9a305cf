//! Pipeline configuration.

use std::time::Duration;

/// Number of concurrent workers per writer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerCounts {
    /// Address savers.
    pub addresses: usize,
    /// Transaction savers.
    pub transactions: usize,
    /// Transaction output savers.
    pub outputs: usize,
    /// Invalid transaction savers.
    pub invalid_transactions: usize,
    /// Transaction to validator link savers.
    pub transaction_validators: usize,
    /// Reward savers.
    pub rewards: usize,
    /// Slash savers.
    pub slashes: usize,
    /// Workers fetching balances from the node.
    pub balance_fetchers: usize,
    /// Workers writing fetched balances.
    pub balance_updaters: usize,
    /// Workers refreshing coins from the node.
    pub coins: usize,
}

impl Default for WorkerCounts {
    fn default() -> Self {
        Self {
            addresses: 3,
            transactions: 3,
            outputs: 3,
            invalid_transactions: 1,
            transaction_validators: 1,
            rewards: 3,
            slashes: 3,
            balance_fetchers: 3,
            balance_updaters: 3,
            coins: 1,
        }
    }
}

/// Configuration of the extender pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtenderConfig {
    /// Symbol of the chain's base coin. It is never refreshed from the node.
    pub base_coin: String,
    /// Transactions per writer batch.
    pub tx_chunk_size: usize,
    /// Addresses per insert statement and per balance request.
    pub addr_chunk_size: usize,
    /// Rewards and slashes per writer batch.
    pub events_chunk_size: usize,
    /// Stakes per insert statement.
    pub stake_chunk_size: usize,
    /// Worker pool sizes.
    pub workers: WorkerCounts,
    /// Rewards are aggregated every this many heights.
    pub reward_aggregate_every_blocks: u64,
    /// Time bucket used for reward aggregation, e.g. `hour` or `day`.
    pub reward_aggregate_interval: String,
    /// Pause between two ledger sweeps.
    pub ledger_sweep_interval: Duration,
    /// Node head lag above which the pipeline is chasing.
    pub chasing_threshold: u64,
    /// Pause before asking again for a block that has not been produced.
    pub block_retry_delay: Duration,
}

impl Default for ExtenderConfig {
    fn default() -> Self {
        Self {
            base_coin: "NOAH".to_string(),
            tx_chunk_size: 100,
            addr_chunk_size: 30,
            events_chunk_size: 100,
            stake_chunk_size: 1_000,
            workers: WorkerCounts::default(),
            reward_aggregate_every_blocks: 60,
            reward_aggregate_interval: "hour".to_string(),
            ledger_sweep_interval: Duration::from_secs(5),
            chasing_threshold: 2,
            block_retry_delay: Duration::from_secs(2),
        }
    }
}
