//! Coin records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bonding-curve coin, keyed by its symbol.
///
/// The creator address and creation transaction are filled in later by the deferred
/// ledger when they cannot be resolved at extraction time. Upserts never clear them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Ticker symbol, the natural key.
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Constant reserve ratio in percent, `1..=100`.
    pub crr: u64,
    /// Circulating supply.
    pub volume: String,
    /// Reserve held in the base coin.
    pub reserve_balance: String,
    /// Price of one whole coin in the base coin's smallest unit.
    pub price: String,
    /// Market capitalization in the base coin's smallest unit.
    pub capitalization: String,
    /// Store id of the creator address, once resolved.
    pub creation_address_id: Option<u64>,
    /// Store id of the creation transaction, once resolved.
    pub creation_transaction_id: Option<u64>,
    /// Time of the last refresh.
    pub updated_at: DateTime<Utc>,
}
