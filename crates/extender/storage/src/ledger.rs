//! Durable ledger of deferred coin links.
//!
//! Keys are the encoded [`DeferredLink`]s; values are the time the link was first recorded
//! as big-endian unix seconds. Recording a link that is already pending is a no-op, so a
//! link survives until a sweep resolves it and deletes its key.

use crate::LedgerResult;
use extender_primitives::DeferredLink;
use rocksdb::{DB, IteratorMode, Options, WriteOptions};
use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::trace;

/// A raw entry read back from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Raw key bytes, possibly malformed.
    pub key: Vec<u8>,
    /// Time the entry was recorded, if the value decodes.
    pub enqueued_at: Option<u64>,
}

/// RocksDB backed deferred-resolution ledger.
#[derive(Debug)]
pub struct DeferredLedger {
    db: DB,
}

impl DeferredLedger {
    /// Opens (or creates) the ledger at `path`.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    fn write_options() -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        opts
    }

    /// Records `link` unless it is already pending.
    ///
    /// Returns `true` if a new entry was written.
    pub fn record(&self, link: &DeferredLink) -> LedgerResult<bool> {
        let key = link.key();
        if self.db.get_pinned(key.as_bytes())?.is_some() {
            return Ok(false);
        }
        let now = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
        self.db.put_opt(key.as_bytes(), now.to_be_bytes(), &Self::write_options())?;
        trace!(target: "ledger", %key, "Recorded deferred link");
        Ok(true)
    }

    /// Returns a snapshot of every pending entry, in key order.
    pub fn pending(&self) -> LedgerResult<Vec<PendingEntry>> {
        self.db
            .iterator(IteratorMode::Start)
            .map(|item| -> LedgerResult<PendingEntry> {
                let (key, value) = item?;
                let enqueued_at =
                    <[u8; 8]>::try_from(value.as_ref()).ok().map(u64::from_be_bytes);
                Ok(PendingEntry { key: key.into_vec(), enqueued_at })
            })
            .collect()
    }

    /// Deletes an entry by its raw key.
    pub fn delete(&self, key: &[u8]) -> LedgerResult<()> {
        self.db.delete_opt(key, &Self::write_options())?;
        Ok(())
    }

    /// Number of pending entries.
    pub fn len(&self) -> LedgerResult<usize> {
        let mut count = 0;
        for item in self.db.iterator(IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Whether no entry is pending.
    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.db.iterator(IteratorMode::Start).next().transpose()?.is_none())
    }

    /// Writes a raw entry, bypassing key encoding.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn insert_raw(&self, key: &[u8], value: &[u8]) -> LedgerResult<()> {
        self.db.put_opt(key, value, &Self::write_options())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, DeferredLedger) {
        let dir = TempDir::new().unwrap();
        let ledger = DeferredLedger::open(dir.path()).unwrap();
        (dir, ledger)
    }

    #[test]
    fn record_is_idempotent() {
        let (_dir, ledger) = open();
        let link = DeferredLink::address("TEST", "ab12");

        assert!(ledger.record(&link).unwrap());
        assert!(!ledger.record(&link).unwrap());
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[test]
    fn pending_decodes_timestamp() {
        let (_dir, ledger) = open();
        ledger.record(&DeferredLink::transaction("TEST", "ff")).unwrap();
        ledger.insert_raw(b"garbage", b"x").unwrap();

        let entries = ledger.pending().unwrap();
        assert_eq!(entries.len(), 2);
        let garbage = entries.iter().find(|e| e.key == b"garbage").unwrap();
        assert_eq!(garbage.enqueued_at, None);
        let link = entries.iter().find(|e| e.key == b"trx_TEST_ff").unwrap();
        assert!(link.enqueued_at.unwrap() > 0);
    }

    #[test]
    fn delete_removes_entry() {
        let (_dir, ledger) = open();
        let link = DeferredLink::address("TEST", "ab12");
        ledger.record(&link).unwrap();

        ledger.delete(link.key().as_bytes()).unwrap();
        assert!(ledger.is_empty().unwrap());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let ledger = DeferredLedger::open(dir.path()).unwrap();
            ledger.record(&DeferredLink::address("TEST", "ab12")).unwrap();
        }
        let ledger = DeferredLedger::open(dir.path()).unwrap();
        assert_eq!(ledger.pending().unwrap()[0].key, b"address_TEST_ab12");
    }
}
