//! # extender-node-api
//!
//! Read access to the chain node consumed by the extender.
//!
//! The [`NodeApi`] trait is the seam every pipeline stage talks to; [`HttpNodeApi`] is the
//! production implementation over the node's JSON HTTP interface.
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
pub use error::{NodeApiError, NodeApiResult};

mod types;
pub use types::{
    AddressResult, AppState, BlockEvent, BlockResult, BlockValidatorResult, CandidateResult,
    CoinInfoResult, EventResult, EventsResult, GenesisAccount, GenesisBalance, GenesisCandidate,
    GenesisCoin, GenesisResult, NodeErrorBody, NodeResponse, RewardEventValue, SlashEventValue,
    StakeResult, StatusResult, TransactionResult,
};

mod traits;
pub use traits::NodeApi;
#[cfg(any(test, feature = "test-utils"))]
pub use traits::MockNodeApi;

mod http;
pub use http::{HttpNodeApi, HttpNodeApiConfig};
