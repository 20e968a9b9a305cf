use super::{BatchWriter, Flush, chunked};
use crate::{ExtractionError, WriterError};
use async_trait::async_trait;
use extender_node_api::NodeApi;
use extender_primitives::{Balance, BalanceSnapshot, normalize_address};
use extender_storage::{AddressStorage, BalanceStorage, CoinStorage};
use std::{
    collections::{BTreeSet, HashMap},
    fmt::Debug,
    sync::Arc,
};
use tracing::warn;

/// Fetches the latest balances of addresses from the node.
///
/// Every fetched chunk is handed to the balance update writer as one [`BalanceSnapshot`].
#[derive(Debug)]
pub struct BalanceFetcher<N, S> {
    node: Arc<N>,
    store: Arc<S>,
    chunk_size: usize,
    updates: BatchWriter<BalanceSnapshot>,
}

impl<N, S> BalanceFetcher<N, S> {
    /// Creates a new [`BalanceFetcher`].
    pub const fn new(
        node: Arc<N>,
        store: Arc<S>,
        chunk_size: usize,
        updates: BatchWriter<BalanceSnapshot>,
    ) -> Self {
        Self { node, store, chunk_size, updates }
    }
}

impl<N, S> BalanceFetcher<N, S>
where
    N: NodeApi,
    S: AddressStorage + CoinStorage,
{
    async fn snapshot(
        &self,
        addresses: &[String],
        coin_ids: &mut HashMap<String, Option<u64>>,
    ) -> Result<BalanceSnapshot, WriterError> {
        let results = self.node.addresses(addresses, 0).await?;
        let ids = self.store.find_address_ids(addresses).await?;

        let mut snapshot = BalanceSnapshot::default();
        for result in results {
            let address = normalize_address(&result.address);
            let address_id = *ids
                .get(address)
                .ok_or_else(|| ExtractionError::MissingAddress(address.to_string()))?;
            snapshot.address_ids.push(address_id);

            for (symbol, value) in result.balance {
                if !coin_ids.contains_key(&symbol) {
                    let id = match self.store.find_coin_id(&symbol).await {
                        Ok(id) => Some(id),
                        Err(err) if err.is_not_found() => None,
                        Err(err) => return Err(err.into()),
                    };
                    coin_ids.insert(symbol.clone(), id);
                }
                let Some(coin_id) = coin_ids.get(&symbol).copied().flatten() else {
                    warn!(target: "writer", %symbol, address, "Skipping balance of unknown coin");
                    continue;
                };
                snapshot.balances.push(Balance { address_id, coin_id, value });
            }
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl<N, S> Flush<String> for BalanceFetcher<N, S>
where
    N: NodeApi + 'static,
    S: AddressStorage + CoinStorage + Debug + 'static,
{
    async fn flush(&self, batch: Vec<String>) -> Result<(), WriterError> {
        let unique: Vec<String> = batch.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut coin_ids = HashMap::new();
        for chunk in chunked(&unique, self.chunk_size) {
            let snapshot = self.snapshot(&chunk, &mut coin_ids).await?;
            self.updates.enqueue(vec![snapshot]).await?;
        }
        Ok(())
    }
}

/// Replaces stored balances with fetched snapshots.
#[derive(Debug)]
pub struct BalanceFlusher<S> {
    store: Arc<S>,
}

impl<S> BalanceFlusher<S> {
    /// Creates a new [`BalanceFlusher`].
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S> Flush<BalanceSnapshot> for BalanceFlusher<S>
where
    S: BalanceStorage + Debug + 'static,
{
    async fn flush(&self, batch: Vec<BalanceSnapshot>) -> Result<(), WriterError> {
        for snapshot in batch {
            self.store.replace_balances(&snapshot.address_ids, &snapshot.balances).await?;
        }
        Ok(())
    }
}
