//! Resolution of deferred coin links.

use crate::{ExtenderActor, FatalSignal, Metrics};
use async_trait::async_trait;
use extender_primitives::{DeferredLink, LinkKind};
use extender_storage::{
    AddressStorage, CoinStorage, DeferredLedger, LedgerError, StorageResult, TransactionStorage,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

/// Looks up the id a deferred link refers to.
pub(crate) async fn resolve_link<S>(store: &S, link: &DeferredLink) -> StorageResult<u64>
where
    S: AddressStorage + TransactionStorage,
{
    match link.kind {
        LinkKind::Address => store.find_address_id(&link.reference).await,
        LinkKind::Transaction => store.find_transaction_id(&link.reference).await,
    }
}

/// Resolves a link and writes the id onto its coin.
///
/// Applying the same link twice writes the same value twice.
async fn apply_link<S>(store: &S, link: &DeferredLink) -> StorageResult<()>
where
    S: AddressStorage + TransactionStorage + CoinStorage,
{
    let id = resolve_link(store, link).await?;
    match link.kind {
        LinkKind::Address => store.update_coin_owner(&link.coin_symbol, id).await,
        LinkKind::Transaction => store.update_coin_transaction(&link.coin_symbol, id).await,
    }
}

/// Outcome of one sweep over the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Links resolved and deleted.
    pub resolved: usize,
    /// Links left for a later sweep.
    pub pending: usize,
    /// Malformed keys deleted without resolution.
    pub corrupt: usize,
}

/// Periodically resolves every pending link in the [`DeferredLedger`].
///
/// The sweeper is the only component that deletes ledger entries. Passes never overlap.
#[derive(Debug)]
pub struct LedgerSweeper<S> {
    store: Arc<S>,
    ledger: Arc<DeferredLedger>,
    interval: Duration,
    fatal: FatalSignal,
    pass: Mutex<()>,
}

impl<S> LedgerSweeper<S>
where
    S: AddressStorage + TransactionStorage + CoinStorage,
{
    /// Creates a new [`LedgerSweeper`].
    pub fn new(
        store: Arc<S>,
        ledger: Arc<DeferredLedger>,
        interval: Duration,
        fatal: FatalSignal,
    ) -> Self {
        Self { store, ledger, interval, fatal, pass: Mutex::new(()) }
    }

    /// Runs a single pass over every pending entry.
    ///
    /// Entries whose reference does not resolve yet, or whose coin is not stored yet, stay
    /// in the ledger. Any other store failure is logged and the entry retried next pass.
    pub async fn sweep(&self) -> Result<SweepReport, LedgerError> {
        let _pass = self.pass.lock().await;
        let mut report = SweepReport::default();

        for entry in self.ledger.pending()? {
            let link = match DeferredLink::from_key(&entry.key) {
                Ok(link) => link,
                Err(err) => {
                    warn!(target: "ledger", key = %String::from_utf8_lossy(&entry.key), %err, "Deleting corrupt ledger key");
                    self.ledger.delete(&entry.key)?;
                    metrics::counter!(Metrics::LEDGER_CORRUPT).increment(1);
                    report.corrupt += 1;
                    continue;
                }
            };

            match apply_link(self.store.as_ref(), &link).await {
                Ok(()) => {
                    self.ledger.delete(&entry.key)?;
                    metrics::counter!(Metrics::LEDGER_RESOLVED).increment(1);
                    debug!(target: "ledger", kind = %link.kind, symbol = %link.coin_symbol, "Resolved deferred link");
                    report.resolved += 1;
                }
                Err(err) if err.is_not_found() => {
                    trace!(target: "ledger", kind = %link.kind, symbol = %link.coin_symbol, "Deferred link still unresolved");
                    report.pending += 1;
                }
                Err(err) => {
                    warn!(target: "ledger", kind = %link.kind, symbol = %link.coin_symbol, %err, "Failed to resolve deferred link");
                    report.pending += 1;
                }
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl<S> ExtenderActor for LedgerSweeper<S>
where
    S: AddressStorage + TransactionStorage + CoinStorage + std::fmt::Debug + 'static,
{
    type Error = LedgerError;

    async fn start(self) -> Result<(), Self::Error> {
        info!(target: "ledger", interval = ?self.interval, "Started ledger sweeper");
        loop {
            let report = self.sweep().await?;
            if report != SweepReport::default() {
                debug!(
                    target: "ledger",
                    resolved = report.resolved,
                    pending = report.pending,
                    corrupt = report.corrupt,
                    "Swept ledger"
                );
            }

            tokio::select! {
                _ = self.fatal.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!(target: "ledger", "Stopped ledger sweeper");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use extender_primitives::Coin;
    use extender_storage::MemoryStore;
    use tempfile::TempDir;

    fn coin(symbol: &str) -> Coin {
        Coin {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            crr: 100,
            volume: "1".into(),
            reserve_balance: "1".into(),
            price: "0".into(),
            capitalization: "0".into(),
            creation_address_id: None,
            creation_transaction_id: None,
            updated_at: Utc::now(),
        }
    }

    fn sweeper() -> (TempDir, Arc<MemoryStore>, Arc<DeferredLedger>, LedgerSweeper<MemoryStore>) {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(DeferredLedger::open(dir.path()).unwrap());
        let store = Arc::new(MemoryStore::new());
        let sweeper = LedgerSweeper::new(
            store.clone(),
            ledger.clone(),
            Duration::from_millis(10),
            FatalSignal::default(),
        );
        (dir, store, ledger, sweeper)
    }

    #[tokio::test]
    async fn unresolved_links_stay_until_reference_exists() {
        let (_dir, store, ledger, sweeper) = sweeper();
        store.save_coins(&[coin("TEST")]).await.unwrap();
        ledger.record(&DeferredLink::address("TEST", "aa")).unwrap();

        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report, SweepReport { pending: 1, ..Default::default() });
        assert_eq!(ledger.len().unwrap(), 1);

        store.save_addresses(&["aa".to_string()]).await.unwrap();
        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report, SweepReport { resolved: 1, ..Default::default() });
        assert!(ledger.is_empty().unwrap());
        assert_eq!(store.coin("TEST").unwrap().creation_address_id, store.address_id("aa"));

        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn link_waits_for_its_coin() {
        let (_dir, store, ledger, sweeper) = sweeper();
        store.save_addresses(&["aa".to_string()]).await.unwrap();
        ledger.record(&DeferredLink::address("LATE", "aa")).unwrap();

        assert_eq!(sweeper.sweep().await.unwrap().pending, 1);
        store.save_coins(&[coin("LATE")]).await.unwrap();
        assert_eq!(sweeper.sweep().await.unwrap().resolved, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overlapping_sweeps_resolve_a_link_once() {
        let (_dir, store, ledger, sweeper) = sweeper();
        store.save_coins(&[coin("TEST")]).await.unwrap();
        store.save_addresses(&["aa".to_string()]).await.unwrap();
        ledger.record(&DeferredLink::address("TEST", "aa")).unwrap();

        let (first, second) = tokio::join!(sweeper.sweep(), sweeper.sweep());
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.resolved + second.resolved, 1);
        assert_eq!(first.pending + second.pending, 0);
        assert!(ledger.is_empty().unwrap());
        assert_eq!(store.coin("TEST").unwrap().creation_address_id, store.address_id("aa"));
    }

    #[tokio::test]
    async fn corrupt_keys_are_deleted() {
        let (_dir, _store, ledger, sweeper) = sweeper();
        ledger.insert_raw(b"address_TEST", b"").unwrap();
        ledger.insert_raw(b"trx_A_B_C", b"").unwrap();
        ledger.insert_raw(b"coin_TEST_aa", b"").unwrap();

        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report.corrupt, 3);
        assert!(ledger.is_empty().unwrap());
    }

    #[tokio::test]
    async fn start_stops_on_shutdown() {
        let (_dir, _store, _ledger, sweeper) = sweeper();
        let fatal = sweeper.fatal.clone();
        let handle = tokio::spawn(sweeper.start());
        fatal.token().cancel();
        handle.await.unwrap().unwrap();
    }
}
