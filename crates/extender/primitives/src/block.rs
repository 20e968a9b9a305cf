//! Block records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted block.
///
/// The height doubles as the primary key of the block table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub height: u64,
    /// Cumulative number of transactions up to and including this block.
    pub total_txs: u64,
    /// Number of transactions in this block.
    pub num_txs: u32,
    /// Encoded block size in bytes.
    pub size: u64,
    /// Nanoseconds elapsed since the previous block.
    pub block_time: u64,
    /// Block timestamp.
    pub created_at: DateTime<Utc>,
    /// Reward paid out for this block, as a decimal integer string.
    pub block_reward: String,
    /// Store id of the proposing validator, when the node reported one.
    pub proposer_validator_id: Option<u64>,
    /// Normalised block hash.
    pub hash: String,
}

impl Block {
    /// Interval assumed for the first block ingested without a predecessor.
    pub const FIRST_BLOCK_TIME: u64 = 1_000_000_000;

    /// Nanoseconds between `previous` and a block produced at `created_at`.
    ///
    /// Falls back to [`Self::FIRST_BLOCK_TIME`] when there is no predecessor and clamps
    /// out of order timestamps to zero.
    pub fn interval_since(previous: Option<&Self>, created_at: DateTime<Utc>) -> u64 {
        let Some(previous) = previous else {
            return Self::FIRST_BLOCK_TIME;
        };
        let delta = created_at.signed_duration_since(previous.created_at);
        delta.num_nanoseconds().map_or(i64::MAX as u64, |nanos| nanos.max(0) as u64)
    }
}

/// Participation of a validator in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockValidator {
    /// Block height.
    pub block_id: u64,
    /// Store id of the validator.
    pub validator_id: u64,
    /// Whether the validator signed the block.
    pub signed: bool,
}
