//! The node API seam.

use crate::{
    AddressResult, BlockResult, CandidateResult, CoinInfoResult, EventsResult, GenesisResult,
    NodeApiResult, StatusResult,
};
use async_trait::async_trait;
use std::fmt::Debug;

/// Read access to a chain node.
///
/// Implementations own transport concerns such as host fallback, retries and timeouts.
/// Addresses passed in are normalised; implementations re-apply the node's prefix.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait NodeApi: Debug + Send + Sync {
    /// Returns the node status.
    async fn status(&self) -> NodeApiResult<StatusResult>;

    /// Returns the block at `height`.
    ///
    /// Fails with [`NodeApiError::Node`](crate::NodeApiError::Node) while the block has not
    /// been produced.
    async fn block(&self, height: u64) -> NodeApiResult<BlockResult>;

    /// Returns the events emitted at `height`.
    async fn block_events(&self, height: u64) -> NodeApiResult<EventsResult>;

    /// Returns the current state of a coin.
    async fn coin_info(&self, symbol: &str) -> NodeApiResult<CoinInfoResult>;

    /// Returns every candidate at `height`, optionally with their stakes.
    async fn candidates(
        &self,
        height: u64,
        include_stakes: bool,
    ) -> NodeApiResult<Vec<CandidateResult>>;

    /// Returns the balances of `addresses` at `height`; zero means latest.
    async fn addresses(&self, addresses: &[String], height: u64)
    -> NodeApiResult<Vec<AddressResult>>;

    /// Returns the genesis document.
    async fn genesis(&self) -> NodeApiResult<GenesisResult>;
}
