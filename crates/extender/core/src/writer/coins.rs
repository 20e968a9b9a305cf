use super::Flush;
use crate::WriterError;
use async_trait::async_trait;
use chrono::Utc;
use extender_node_api::NodeApi;
use extender_primitives::{
    Coin,
    price::{PriceError, capitalization, token_price},
};
use extender_storage::CoinStorage;
use std::{collections::BTreeSet, fmt::Debug, sync::Arc};
use tracing::{trace, warn};

/// Builds a coin record with its price and capitalization derived from the curve state.
///
/// Creation references are left unset so an upsert never touches them.
pub(crate) fn priced_coin(
    symbol: String,
    name: String,
    crr: u64,
    volume: String,
    reserve_balance: String,
) -> Result<Coin, PriceError> {
    let price = token_price(&volume, &reserve_balance, crr)?;
    let capitalization = capitalization(&volume, &price)?;
    Ok(Coin {
        symbol,
        name,
        crr,
        volume,
        reserve_balance,
        price,
        capitalization,
        creation_address_id: None,
        creation_transaction_id: None,
        updated_at: Utc::now(),
    })
}

/// Refreshes coins from the node and recomputes their price.
///
/// A coin the node cannot describe is logged and skipped; the rest of the batch is saved.
#[derive(Debug)]
pub struct CoinRefresher<N, S> {
    node: Arc<N>,
    store: Arc<S>,
}

impl<N, S> CoinRefresher<N, S> {
    /// Creates a new [`CoinRefresher`].
    pub const fn new(node: Arc<N>, store: Arc<S>) -> Self {
        Self { node, store }
    }
}

#[async_trait]
impl<N, S> Flush<String> for CoinRefresher<N, S>
where
    N: NodeApi + 'static,
    S: CoinStorage + Debug + 'static,
{
    async fn flush(&self, batch: Vec<String>) -> Result<(), WriterError> {
        let symbols: BTreeSet<String> = batch.into_iter().collect();
        let mut coins = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let info = match self.node.coin_info(&symbol).await {
                Ok(info) => info,
                Err(err) => {
                    warn!(target: "writer", %symbol, %err, "Failed to fetch coin info");
                    continue;
                }
            };
            match priced_coin(symbol, info.name, info.crr, info.volume, info.reserve_balance) {
                Ok(coin) => coins.push(coin),
                Err(err) => warn!(target: "writer", symbol = %info.symbol, %err, "Failed to price coin"),
            }
        }
        trace!(target: "writer", count = coins.len(), "Refreshed coins");
        Ok(self.store.save_coins(&coins).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priced_coin_derives_price_and_capitalization() {
        let coin =
            priced_coin("TEST".into(), "Test".into(), 100, "600".into(), "10000".into()).unwrap();
        assert_eq!(coin.price, "16666666666666666666");
        assert_eq!(coin.capitalization, "10000000000000000000000");
        assert_eq!(coin.creation_address_id, None);
    }
}
