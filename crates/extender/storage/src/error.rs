use thiserror::Error;

/// Errors that may occur while interacting with the relational store.
///
/// This enum is used across all implementations of the storage traits.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database driver failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying the schema migrations failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The expected entry was not found in the store.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// A stored value could not be converted back into a domain value.
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

impl StorageError {
    /// Whether the error means the looked up entry does not exist (yet).
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::EntryNotFound(_))
    }
}

/// Result alias for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that may occur while interacting with the deferred ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The embedded key/value store failed.
    #[error("ledger database error: {0}")]
    Database(#[from] rocksdb::Error),
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
