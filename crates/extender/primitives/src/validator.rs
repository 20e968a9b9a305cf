//! Validator and stake records.

use serde::{Deserialize, Serialize};

/// A validator candidate, keyed by its public key.
///
/// Every field other than the key is optional so that a partial refresh only touches the
/// columns it carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Normalised public key.
    pub public_key: String,
    /// Store id of the owner address.
    pub owner_address_id: Option<u64>,
    /// Store id of the reward address.
    pub reward_address_id: Option<u64>,
    /// Candidate status as reported by the node.
    pub status: Option<u8>,
    /// Commission in percent.
    pub commission: Option<u64>,
    /// Total stake in the base coin.
    pub total_stake: Option<String>,
}

/// A delegated stake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub validator_id: u64,
    pub owner_address_id: u64,
    pub coin_id: u64,
    /// Staked amount in the staked coin.
    pub value: String,
    /// Staked amount converted to the base coin.
    pub noah_value: String,
}
