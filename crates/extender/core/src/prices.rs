//! Offline price recomputation.

use crate::{ExtenderError, writer::priced_coin};
use extender_storage::CoinStorage;
use tracing::{info, warn};

/// Recomputes price and capitalization of every stored coin from its stored curve state.
///
/// Returns the number of coins written back.
pub async fn update_prices<S: CoinStorage>(store: &S) -> Result<usize, ExtenderError> {
    let coins = store.all_coins().await?;
    let total = coins.len();

    let mut updated = Vec::with_capacity(total);
    for coin in coins {
        let symbol = coin.symbol;
        match priced_coin(symbol.clone(), coin.name, coin.crr, coin.volume, coin.reserve_balance) {
            Ok(priced) => updated.push(priced),
            Err(err) => warn!(target: "prices", %symbol, %err, "Failed to price coin"),
        }
    }

    store.save_coins(&updated).await?;
    info!(target: "prices", updated = updated.len(), total, "Updated coin prices");
    Ok(updated.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use extender_primitives::Coin;
    use extender_storage::MemoryStore;

    #[tokio::test]
    async fn recomputes_stale_prices_and_keeps_links() {
        let store = MemoryStore::new();
        let stale = Coin {
            symbol: "TEST".into(),
            name: "Test".into(),
            crr: 10,
            volume: "600".into(),
            reserve_balance: "10000".into(),
            price: "1".into(),
            capitalization: "1".into(),
            creation_address_id: Some(4),
            creation_transaction_id: Some(9),
            updated_at: Utc::now(),
        };
        store.save_coins(&[stale]).await.unwrap();

        assert_eq!(update_prices(&store).await.unwrap(), 1);
        let coin = store.coin("TEST").unwrap();
        assert_eq!(coin.price, "167922238458378386515");
        assert_eq!(coin.capitalization, "100753343100000000000000");
        assert_eq!(coin.creation_address_id, Some(4));
        assert_eq!(coin.creation_transaction_id, Some(9));
    }
}
