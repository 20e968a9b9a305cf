//! # extender-storage
//!
//! Persistence for the extender pipeline.
//!
//! - The relational store is described by a set of narrow traits ([`AddressStorage`],
//!   [`BlockStorage`], ...) bundled into [`Store`]. [`PgStore`] implements them over Postgres.
//! - The [`DeferredLedger`] is a small embedded key/value store that remembers coin links the
//!   pipeline could not resolve when the coin was first saved.
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
pub use error::{LedgerError, LedgerResult, StorageError, StorageResult};

mod traits;
pub use traits::{
    AddressStorage, BalanceStorage, BlockStorage, CoinStorage, EventStorage, Store,
    TransactionStorage, ValidatorStorage,
};

mod ledger;
pub use ledger::{DeferredLedger, PendingEntry};

mod pg;
pub use pg::{PgConfig, PgStore};

#[cfg(any(test, feature = "test-utils"))]
mod memory;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStore;
