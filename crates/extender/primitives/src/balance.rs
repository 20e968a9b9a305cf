//! Account balance records.

use serde::{Deserialize, Serialize};

/// Balance of one coin held by one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub address_id: u64,
    pub coin_id: u64,
    pub value: String,
}

/// The full set of balances observed for a group of addresses.
///
/// Applying a snapshot replaces every stored balance of the listed addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    /// Addresses covered by the snapshot.
    pub address_ids: Vec<u64>,
    /// Balances of those addresses.
    pub balances: Vec<Balance>,
}
