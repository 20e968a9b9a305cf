//! Transaction records and the per-kind payload union.

use crate::serde_helpers::{string_or_number, vec_string_or_number};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric transaction kind tag, as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum TxType {
    /// Transfer of a single coin.
    Send = 1,
    /// Sell a fixed amount of a coin.
    SellCoin = 2,
    /// Sell the whole balance of a coin.
    SellAllCoin = 3,
    /// Buy a fixed amount of a coin.
    BuyCoin = 4,
    /// Create a new bonding-curve coin.
    CreateCoin = 5,
    /// Declare a validator candidate.
    DeclareCandidacy = 6,
    /// Delegate stake to a candidate.
    Delegate = 7,
    /// Withdraw delegated stake.
    Unbond = 8,
    /// Redeem a check.
    RedeemCheck = 9,
    /// Switch a candidate on.
    SetCandidateOnline = 10,
    /// Switch a candidate off.
    SetCandidateOffline = 11,
    /// Create a multisig address.
    CreateMultisig = 12,
    /// Transfer to many recipients at once.
    MultiSend = 13,
    /// Change candidate owner or reward address.
    EditCandidate = 14,
}

/// A transaction kind tag the extender does not know how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction type {0}")]
pub struct UnknownTxType(pub u8);

impl TryFrom<u8> for TxType {
    type Error = UnknownTxType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::Send,
            2 => Self::SellCoin,
            3 => Self::SellAllCoin,
            4 => Self::BuyCoin,
            5 => Self::CreateCoin,
            6 => Self::DeclareCandidacy,
            7 => Self::Delegate,
            8 => Self::Unbond,
            9 => Self::RedeemCheck,
            10 => Self::SetCandidateOnline,
            11 => Self::SetCandidateOffline,
            12 => Self::CreateMultisig,
            13 => Self::MultiSend,
            14 => Self::EditCandidate,
            other => return Err(UnknownTxType(other)),
        })
    }
}

impl From<TxType> for u8 {
    fn from(value: TxType) -> Self {
        value as Self
    }
}

/// Payload of [`TxType::Send`], also used for every [`MultiSendData`] entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendData {
    /// Coin symbol.
    pub coin: String,
    /// Recipient address.
    pub to: String,
    /// Amount.
    pub value: String,
}

/// Payload of [`TxType::SellCoin`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellCoinData {
    pub coin_to_sell: String,
    pub value_to_sell: String,
    pub coin_to_buy: String,
    pub minimum_value_to_buy: String,
}

/// Payload of [`TxType::SellAllCoin`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellAllCoinData {
    pub coin_to_sell: String,
    pub coin_to_buy: String,
    pub minimum_value_to_buy: String,
}

/// Payload of [`TxType::BuyCoin`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyCoinData {
    pub coin_to_buy: String,
    pub value_to_buy: String,
    pub coin_to_sell: String,
    pub maximum_value_to_sell: String,
}

/// Payload of [`TxType::CreateCoin`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCoinData {
    pub name: String,
    pub symbol: String,
    pub initial_amount: String,
    pub initial_reserve: String,
    #[serde(deserialize_with = "string_or_number")]
    pub constant_reserve_ratio: String,
}

/// Payload of [`TxType::DeclareCandidacy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclareCandidacyData {
    pub address: String,
    pub pub_key: String,
    #[serde(deserialize_with = "string_or_number")]
    pub commission: String,
    pub coin: String,
    pub stake: String,
}

/// Payload of [`TxType::Delegate`] and [`TxType::Unbond`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeMoveData {
    pub pub_key: String,
    pub coin: String,
    pub value: String,
}

/// Payload of [`TxType::RedeemCheck`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemCheckData {
    pub raw_check: String,
    pub proof: String,
}

/// Payload of [`TxType::SetCandidateOnline`] and [`TxType::SetCandidateOffline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateStatusData {
    pub pub_key: String,
}

/// Payload of [`TxType::CreateMultisig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMultisigData {
    #[serde(deserialize_with = "string_or_number")]
    pub threshold: String,
    #[serde(deserialize_with = "vec_string_or_number")]
    pub weights: Vec<String>,
    pub addresses: Vec<String>,
}

/// Payload of [`TxType::MultiSend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSendData {
    pub list: Vec<SendData>,
}

/// Payload of [`TxType::EditCandidate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditCandidateData {
    pub pub_key: String,
    pub reward_address: String,
    pub owner_address: String,
}

/// Decoded transaction payload, one variant per [`TxType`].
///
/// Serialises untagged so the stored JSON matches what the node returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum TxData {
    Send(SendData),
    SellCoin(SellCoinData),
    SellAllCoin(SellAllCoinData),
    BuyCoin(BuyCoinData),
    CreateCoin(CreateCoinData),
    DeclareCandidacy(DeclareCandidacyData),
    Delegate(StakeMoveData),
    Unbond(StakeMoveData),
    RedeemCheck(RedeemCheckData),
    SetCandidateOnline(CandidateStatusData),
    SetCandidateOffline(CandidateStatusData),
    CreateMultisig(CreateMultisigData),
    MultiSend(MultiSendData),
    EditCandidate(EditCandidateData),
}

impl TxData {
    /// Decodes the raw `data` object of a transaction of the given kind.
    pub fn decode(kind: TxType, data: serde_json::Value) -> Result<Self, serde_json::Error> {
        use serde_json::from_value;
        Ok(match kind {
            TxType::Send => Self::Send(from_value(data)?),
            TxType::SellCoin => Self::SellCoin(from_value(data)?),
            TxType::SellAllCoin => Self::SellAllCoin(from_value(data)?),
            TxType::BuyCoin => Self::BuyCoin(from_value(data)?),
            TxType::CreateCoin => Self::CreateCoin(from_value(data)?),
            TxType::DeclareCandidacy => Self::DeclareCandidacy(from_value(data)?),
            TxType::Delegate => Self::Delegate(from_value(data)?),
            TxType::Unbond => Self::Unbond(from_value(data)?),
            TxType::RedeemCheck => Self::RedeemCheck(from_value(data)?),
            TxType::SetCandidateOnline => Self::SetCandidateOnline(from_value(data)?),
            TxType::SetCandidateOffline => Self::SetCandidateOffline(from_value(data)?),
            TxType::CreateMultisig => Self::CreateMultisig(from_value(data)?),
            TxType::MultiSend => Self::MultiSend(from_value(data)?),
            TxType::EditCandidate => Self::EditCandidate(from_value(data)?),
        })
    }

    /// The kind tag of this payload.
    pub const fn kind(&self) -> TxType {
        match self {
            Self::Send(_) => TxType::Send,
            Self::SellCoin(_) => TxType::SellCoin,
            Self::SellAllCoin(_) => TxType::SellAllCoin,
            Self::BuyCoin(_) => TxType::BuyCoin,
            Self::CreateCoin(_) => TxType::CreateCoin,
            Self::DeclareCandidacy(_) => TxType::DeclareCandidacy,
            Self::Delegate(_) => TxType::Delegate,
            Self::Unbond(_) => TxType::Unbond,
            Self::RedeemCheck(_) => TxType::RedeemCheck,
            Self::SetCandidateOnline(_) => TxType::SetCandidateOnline,
            Self::SetCandidateOffline(_) => TxType::SetCandidateOffline,
            Self::CreateMultisig(_) => TxType::CreateMultisig,
            Self::MultiSend(_) => TxType::MultiSend,
            Self::EditCandidate(_) => TxType::EditCandidate,
        }
    }

    /// Public key of the validator this transaction acts on, if any.
    pub fn validator_public_key(&self) -> Option<&str> {
        match self {
            Self::DeclareCandidacy(d) => Some(&d.pub_key),
            Self::Delegate(d) | Self::Unbond(d) => Some(&d.pub_key),
            Self::SetCandidateOnline(d) | Self::SetCandidateOffline(d) => Some(&d.pub_key),
            Self::EditCandidate(d) => Some(&d.pub_key),
            _ => None,
        }
    }

    /// Coins whose reserve or supply is moved by a conversion.
    pub fn traded_coins(&self) -> Vec<&str> {
        match self {
            Self::SellCoin(d) => vec![&d.coin_to_sell, &d.coin_to_buy],
            Self::SellAllCoin(d) => vec![&d.coin_to_sell, &d.coin_to_buy],
            Self::BuyCoin(d) => vec![&d.coin_to_sell, &d.coin_to_buy],
            _ => Vec::new(),
        }
    }

    /// Addresses, other than the sender, that this transaction references.
    pub fn referenced_addresses(&self) -> Vec<&str> {
        match self {
            Self::Send(d) => vec![&d.to],
            Self::MultiSend(d) => d.list.iter().map(|item| item.to.as_str()).collect(),
            Self::DeclareCandidacy(d) => vec![&d.address],
            Self::EditCandidate(d) => vec![&d.reward_address, &d.owner_address],
            Self::CreateMultisig(d) => d.addresses.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Transfers carried by this transaction, in declaration order.
    pub fn transfers(&self) -> Vec<&SendData> {
        match self {
            Self::Send(d) => vec![d],
            Self::MultiSend(d) => d.list.iter().collect(),
            _ => Vec::new(),
        }
    }
}

/// A valid transaction, ready to be inserted.
///
/// The store assigns the id on insert; see [`CommittedTransaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Store id of the sender.
    pub from_address_id: u64,
    /// Height of the containing block.
    pub block_id: u64,
    pub nonce: u64,
    pub gas_price: u64,
    pub gas: u64,
    /// Store id of the coin gas was paid in.
    pub gas_coin_id: u64,
    /// Timestamp of the containing block.
    pub created_at: DateTime<Utc>,
    /// Normalised transaction hash.
    pub hash: String,
    pub service_data: String,
    /// Decoded payload.
    pub data: TxData,
    pub tags: BTreeMap<String, String>,
    /// Decoded user payload.
    pub payload: Vec<u8>,
    /// Raw signed transaction bytes.
    pub raw_tx: Vec<u8>,
}

impl Transaction {
    /// The kind tag of this transaction.
    pub const fn kind(&self) -> TxType {
        self.data.kind()
    }
}

/// A [`Transaction`] together with the id the store assigned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransaction {
    /// Store id.
    pub id: u64,
    /// The inserted transaction.
    pub transaction: Transaction,
}

/// A transaction the node rejected; its raw JSON is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransaction {
    pub from_address_id: u64,
    pub block_id: u64,
    pub created_at: DateTime<Utc>,
    /// Raw kind tag, which may be unknown.
    pub tx_type: u8,
    pub hash: String,
    /// The transaction as the node returned it.
    pub tx_data: String,
}

/// A single transfer carried by a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    pub transaction_id: u64,
    /// Position of the transfer within the transaction.
    pub position: u32,
    pub to_address_id: u64,
    pub coin_id: u64,
    pub value: String,
}

/// Link between a committed transaction and the validator it acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionValidator {
    pub transaction_id: u64,
    pub validator_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(1, TxType::Send)]
    #[case(5, TxType::CreateCoin)]
    #[case(14, TxType::EditCandidate)]
    fn known_tags_decode(#[case] tag: u8, #[case] expected: TxType) {
        assert_eq!(TxType::try_from(tag), Ok(expected));
        assert_eq!(u8::from(expected), tag);
    }

    #[rstest]
    #[case(0)]
    #[case(15)]
    #[case(255)]
    fn unknown_tags_are_rejected(#[case] tag: u8) {
        assert_eq!(TxType::try_from(tag), Err(UnknownTxType(tag)));
    }

    #[test]
    fn decodes_create_coin_with_numeric_crr() {
        let data = json!({
            "name": "Test",
            "symbol": "TEST",
            "initial_amount": "600",
            "initial_reserve": "10000",
            "constant_reserve_ratio": 10
        });
        let TxData::CreateCoin(coin) = TxData::decode(TxType::CreateCoin, data).unwrap() else {
            panic!("expected create coin payload");
        };
        assert_eq!(coin.symbol, "TEST");
        assert_eq!(coin.constant_reserve_ratio, "10");
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let data = json!({ "coin": "NOAH" });
        assert!(TxData::decode(TxType::Send, data).is_err());
    }

    #[test]
    fn multisend_exposes_every_transfer() {
        let data = json!({
            "list": [
                { "coin": "NOAH", "to": "NOAHxaa", "value": "1" },
                { "coin": "TEST", "to": "NOAHxbb", "value": "2" }
            ]
        });
        let decoded = TxData::decode(TxType::MultiSend, data).unwrap();
        assert_eq!(decoded.kind(), TxType::MultiSend);
        assert_eq!(decoded.referenced_addresses(), vec!["NOAHxaa", "NOAHxbb"]);
        let transfers = decoded.transfers();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[1].coin, "TEST");
    }

    #[test]
    fn validator_kinds_expose_public_key() {
        let data = json!({ "pub_key": "Np01", "coin": "NOAH", "value": "5" });
        let delegate = TxData::decode(TxType::Delegate, data.clone()).unwrap();
        let unbond = TxData::decode(TxType::Unbond, data).unwrap();
        assert_eq!(delegate.validator_public_key(), Some("Np01"));
        assert_eq!(unbond.kind(), TxType::Unbond);

        let send = TxData::decode(
            TxType::Send,
            json!({ "coin": "NOAH", "to": "NOAHxaa", "value": "1" }),
        )
        .unwrap();
        assert_eq!(send.validator_public_key(), None);
    }

    #[test]
    fn conversions_expose_traded_coins() {
        let data = json!({
            "coin_to_sell": "NOAH",
            "value_to_sell": "1",
            "coin_to_buy": "TEST",
            "minimum_value_to_buy": "0"
        });
        let sell = TxData::decode(TxType::SellCoin, data).unwrap();
        assert_eq!(sell.traded_coins(), vec!["NOAH", "TEST"]);
    }

    #[test]
    fn payload_serialises_without_tag() {
        let data = json!({ "pub_key": "Np01" });
        let decoded = TxData::decode(TxType::SetCandidateOnline, data.clone()).unwrap();
        assert_eq!(serde_json::to_value(&decoded).unwrap(), data);
    }
}
