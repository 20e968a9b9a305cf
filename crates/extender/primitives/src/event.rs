//! Records derived from block events.

use serde::{Deserialize, Serialize};

/// A reward paid at a given height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub block_id: u64,
    pub address_id: u64,
    pub validator_id: u64,
    /// Role the reward was paid for (`Validator`, `Delegator`, `DAO`, `Developers`).
    pub role: String,
    pub amount: String,
}

/// A slash applied at a given height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slash {
    pub block_id: u64,
    pub address_id: u64,
    pub validator_id: u64,
    pub coin_id: u64,
    pub amount: String,
}
