//! Error types of the extender pipeline.

use extender_node_api::NodeApiError;
use extender_primitives::price::PriceError;
use extender_storage::{LedgerError, StorageError};
use thiserror::Error;

/// An error raised while turning node responses into domain records.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// A store lookup failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Recording a deferred link failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Price arithmetic failed on a value the node guarantees to be numeric.
    #[error(transparent)]
    Price(#[from] PriceError),
    /// An address that must have been saved at this height is unknown.
    #[error("address {0} is not stored")]
    MissingAddress(String),
    /// A coin referenced by a record is unknown.
    #[error("coin {0} is not stored")]
    MissingCoin(String),
    /// A numeric field the node guarantees is well formed did not parse.
    #[error("malformed {field}: {value:?}")]
    Malformed {
        /// Name of the field.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// An error raised by a batch writer.
#[derive(Debug, Error)]
pub enum WriterError {
    /// The store rejected a write.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A node request made by the writer failed.
    #[error(transparent)]
    Node(#[from] NodeApiError),
    /// Price arithmetic failed.
    #[error(transparent)]
    Price(#[from] PriceError),
    /// A record could not be resolved against the store.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// The writer's workers have stopped.
    #[error("{0} writer is closed")]
    Closed(&'static str),
}

/// An error that stops the ingestion loop.
#[derive(Debug, Error)]
pub enum ExtenderError {
    /// A node request failed for a reason other than the block not existing yet.
    #[error(transparent)]
    Node(#[from] NodeApiError),
    /// The store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The deferred ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// A synchronous write failed.
    #[error(transparent)]
    Writer(#[from] WriterError),
    /// A background stage hit a fatal error.
    #[error("a background stage failed")]
    Fatal,
}
