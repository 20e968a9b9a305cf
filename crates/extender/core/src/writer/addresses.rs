use super::{BatchWriter, Flush, chunked};
use crate::WriterError;
use async_trait::async_trait;
use extender_storage::AddressStorage;
use std::sync::Arc;
use tracing::trace;

/// Saves normalised addresses and forwards them to the balance pipeline.
#[derive(Debug)]
pub struct AddressFlusher<S> {
    store: Arc<S>,
    chunk_size: usize,
    balances: BatchWriter<String>,
}

impl<S> AddressFlusher<S> {
    /// Creates a new [`AddressFlusher`].
    pub const fn new(store: Arc<S>, chunk_size: usize, balances: BatchWriter<String>) -> Self {
        Self { store, chunk_size, balances }
    }
}

#[async_trait]
impl<S> Flush<String> for AddressFlusher<S>
where
    S: AddressStorage + std::fmt::Debug + 'static,
{
    async fn flush(&self, batch: Vec<String>) -> Result<(), WriterError> {
        for chunk in chunked(&batch, self.chunk_size) {
            self.store.save_addresses(&chunk).await?;
        }
        trace!(target: "writer", count = batch.len(), "Saved addresses");
        self.balances.enqueue(batch).await
    }
}
