//! # extender-primitives
//!
//! Domain records shared by every stage of the extender pipeline.
//!
//! Records in this crate are produced by the extraction stage from node responses and
//! consumed by the batch writers. Identifiers that are assigned by the relational store
//! (address ids, coin ids, transaction ids) are plain `u64`s; a record that carries one
//! has already been resolved against the store.
//!
//! The [`price`] module holds the bonding-curve arithmetic used to derive coin prices.
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod prefix;
pub use prefix::{
    ADDRESS_PREFIX, normalize_address, normalize_hash, normalize_public_key, prefixed_address,
};

mod block;
pub use block::{Block, BlockValidator};

mod transaction;
pub use transaction::{
    BuyCoinData, CandidateStatusData, CommittedTransaction, CreateCoinData, CreateMultisigData,
    DeclareCandidacyData, EditCandidateData, InvalidTransaction, MultiSendData, RedeemCheckData,
    SellAllCoinData, SellCoinData, SendData, StakeMoveData, Transaction, TransactionOutput,
    TransactionValidator, TxData, TxType, UnknownTxType,
};

mod coin;
pub use coin::Coin;

mod validator;
pub use validator::{Stake, Validator};

mod event;
pub use event::{Reward, Slash};

mod balance;
pub use balance::{Balance, BalanceSnapshot};

mod link;
pub use link::{CorruptLinkKey, DeferredLink, LinkKind};

pub mod price;

mod serde_helpers;
