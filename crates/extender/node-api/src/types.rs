//! Response types of the node HTTP API.
//!
//! The node renders most integers as JSON strings. Fields that the node guarantees to be
//! numeric are decoded straight into integers, so a malformed value fails the whole
//! response instead of surfacing later in the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Envelope wrapping every response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct NodeResponse<T> {
    /// Present on success.
    #[serde(default)]
    pub result: Option<T>,
    /// Present when the node rejected the request.
    #[serde(default)]
    pub error: Option<NodeErrorBody>,
}

/// Error object reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeErrorBody {
    /// Node specific error code.
    #[serde(default)]
    pub code: i64,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Optional detail.
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(u64),
    String(String),
}

pub(crate) fn u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Numeric::deserialize(deserializer)? {
        Numeric::Number(n) => Ok(n),
        Numeric::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// `/status`
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResult {
    /// Height of the newest block the node has committed.
    #[serde(deserialize_with = "u64_lenient")]
    pub latest_block_height: u64,
}

/// `/block`
#[derive(Debug, Clone, Deserialize)]
pub struct BlockResult {
    pub hash: String,
    #[serde(deserialize_with = "u64_lenient")]
    pub height: u64,
    pub time: DateTime<Utc>,
    #[serde(deserialize_with = "u64_lenient")]
    pub num_txs: u64,
    #[serde(deserialize_with = "u64_lenient")]
    pub total_txs: u64,
    #[serde(default)]
    pub transactions: Vec<TransactionResult>,
    pub block_reward: String,
    #[serde(deserialize_with = "u64_lenient")]
    pub size: u64,
    /// Public key of the proposer; empty for the genesis block.
    #[serde(default)]
    pub proposer: String,
    #[serde(default)]
    pub validators: Vec<BlockValidatorResult>,
}

/// A validator entry of [`BlockResult`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockValidatorResult {
    pub pub_key: String,
    pub signed: bool,
}

/// A transaction entry of [`BlockResult`].
///
/// Kept serialisable so that rejected transactions can be stored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub hash: String,
    pub raw_tx: String,
    pub from: String,
    #[serde(deserialize_with = "u64_lenient")]
    pub nonce: u64,
    #[serde(deserialize_with = "u64_lenient")]
    pub gas_price: u64,
    #[serde(deserialize_with = "u64_lenient")]
    pub gas: u64,
    pub gas_coin: String,
    #[serde(rename = "type")]
    pub tx_type: u8,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub service_data: String,
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub code: Option<u32>,
    /// Set by the node when the transaction failed.
    #[serde(default)]
    pub log: Option<String>,
}

impl TransactionResult {
    /// Whether the node accepted the transaction.
    pub const fn is_valid(&self) -> bool {
        self.log.is_none()
    }
}

/// `/events`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsResult {
    #[serde(default)]
    pub events: Vec<EventResult>,
}

/// A raw block event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventResult {
    /// Event type, e.g. `minter/RewardEvent`.
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
}

/// Value of a reward event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RewardEventValue {
    pub role: String,
    pub address: String,
    pub amount: String,
    pub validator_pub_key: String,
}

/// Value of a slash event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlashEventValue {
    pub address: String,
    pub amount: String,
    pub coin: String,
    pub validator_pub_key: String,
}

/// A decoded block event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEvent {
    /// Reward payout.
    Reward(RewardEventValue),
    /// Stake slash.
    Slash(SlashEventValue),
}

impl EventResult {
    /// Decodes the event value.
    ///
    /// Returns `Ok(None)` for event kinds the extender does not index.
    pub fn decode(&self) -> Result<Option<BlockEvent>, serde_json::Error> {
        let kind = self.kind.rsplit('/').next().unwrap_or_default();
        Ok(match kind {
            "RewardEvent" => Some(BlockEvent::Reward(serde_json::from_value(self.value.clone())?)),
            "SlashEvent" => Some(BlockEvent::Slash(serde_json::from_value(self.value.clone())?)),
            _ => None,
        })
    }
}

/// `/coinInfo`
#[derive(Debug, Clone, Deserialize)]
pub struct CoinInfoResult {
    pub name: String,
    pub symbol: String,
    pub volume: String,
    #[serde(deserialize_with = "u64_lenient")]
    pub crr: u64,
    pub reserve_balance: String,
}

/// An entry of `/candidates`.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateResult {
    pub reward_address: String,
    pub owner_address: String,
    pub total_stake: String,
    pub pub_key: String,
    #[serde(deserialize_with = "u64_lenient")]
    pub commission: u64,
    /// Present only when requested with `include_stakes`.
    #[serde(default)]
    pub stakes: Option<Vec<StakeResult>>,
    pub status: u8,
}

/// A stake entry of [`CandidateResult`].
#[derive(Debug, Clone, Deserialize)]
pub struct StakeResult {
    pub owner: String,
    pub coin: String,
    pub value: String,
    #[serde(alias = "bip_value")]
    pub noah_value: String,
}

/// An entry of `/addresses`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressResult {
    pub address: String,
    /// Balance per coin symbol.
    #[serde(default)]
    pub balance: BTreeMap<String, String>,
}

/// `/genesis`
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisResult {
    pub genesis_time: DateTime<Utc>,
    pub chain_id: String,
    pub app_state: AppState,
}

/// Application state embedded in the genesis document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub candidates: Vec<GenesisCandidate>,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
    #[serde(default)]
    pub coins: Vec<GenesisCoin>,
}

/// A candidate declared at genesis.
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisCandidate {
    pub reward_address: String,
    pub owner_address: String,
    #[serde(alias = "total_bip_stake")]
    pub total_noah_stake: String,
    pub pub_key: String,
    #[serde(deserialize_with = "u64_lenient")]
    pub commission: u64,
    #[serde(default)]
    pub stakes: Vec<StakeResult>,
    pub status: u8,
}

/// An account funded at genesis.
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisAccount {
    pub address: String,
    #[serde(default)]
    pub balance: Vec<GenesisBalance>,
}

/// A balance entry of [`GenesisAccount`].
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisBalance {
    pub coin: String,
    pub value: String,
}

/// A coin created at genesis.
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisCoin {
    pub name: String,
    pub symbol: String,
    pub volume: String,
    #[serde(deserialize_with = "u64_lenient")]
    pub crr: u64,
    pub reserve_balance: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_block_with_string_integers() {
        let body = json!({
            "result": {
                "hash": "abc",
                "height": "12",
                "time": "2019-06-05T12:00:00Z",
                "num_txs": "1",
                "total_txs": "40",
                "block_reward": "333000000000000000000",
                "size": "1024",
                "proposer": "Np01",
                "validators": [{ "pub_key": "Np01", "signed": true }],
                "transactions": [{
                    "hash": "Nt01",
                    "raw_tx": "f8",
                    "from": "NOAHxaa",
                    "nonce": "3",
                    "gas_price": 1,
                    "gas": "10",
                    "gas_coin": "NOAH",
                    "type": 1,
                    "data": { "coin": "NOAH", "to": "NOAHxbb", "value": "1" },
                    "payload": "",
                    "service_data": "",
                    "tags": { "tx.type": "01" }
                }]
            }
        });
        let resp: NodeResponse<BlockResult> = serde_json::from_value(body).unwrap();
        let block = resp.result.unwrap();
        assert_eq!(block.height, 12);
        assert_eq!(block.size, 1024);
        assert_eq!(block.transactions[0].nonce, 3);
        assert!(block.transactions[0].is_valid());
    }

    #[test]
    fn malformed_height_fails_decoding() {
        let body = json!({ "result": { "latest_block_height": "twelve" } });
        assert!(serde_json::from_value::<NodeResponse<StatusResult>>(body).is_err());
    }

    #[test]
    fn decodes_error_envelope() {
        let body = json!({ "error": { "code": 404, "message": "Block not found" } });
        let resp: NodeResponse<BlockResult> = serde_json::from_value(body).unwrap();
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().message, "Block not found");
    }

    #[test]
    fn decodes_known_events_and_skips_others() {
        let reward = EventResult {
            kind: "minter/RewardEvent".into(),
            value: json!({
                "role": "Validator",
                "address": "NOAHxaa",
                "amount": "10",
                "validator_pub_key": "Np01"
            }),
        };
        let other = EventResult { kind: "minter/UnbondEvent".into(), value: json!({}) };
        assert!(matches!(reward.decode().unwrap(), Some(BlockEvent::Reward(r)) if r.role == "Validator"));
        assert_eq!(other.decode().unwrap(), None);
    }

    #[test]
    fn stake_accepts_either_base_value_name() {
        let stake: StakeResult = serde_json::from_value(json!({
            "owner": "NOAHxaa", "coin": "NOAH", "value": "1", "bip_value": "1"
        }))
        .unwrap();
        assert_eq!(stake.noah_value, "1");
    }
}
