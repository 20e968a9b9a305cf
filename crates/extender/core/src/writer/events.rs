use super::Flush;
use crate::WriterError;
use async_trait::async_trait;
use extender_primitives::{Reward, Slash};
use extender_storage::EventStorage;
use std::{fmt::Debug, sync::Arc};

/// Inserts validator rewards.
#[derive(Debug)]
pub struct RewardFlusher<S> {
    store: Arc<S>,
}

impl<S> RewardFlusher<S> {
    /// Creates a new [`RewardFlusher`].
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S> Flush<Reward> for RewardFlusher<S>
where
    S: EventStorage + Debug + 'static,
{
    async fn flush(&self, batch: Vec<Reward>) -> Result<(), WriterError> {
        Ok(self.store.save_rewards(&batch).await?)
    }
}

/// Inserts validator slashes.
#[derive(Debug)]
pub struct SlashFlusher<S> {
    store: Arc<S>,
}

impl<S> SlashFlusher<S> {
    /// Creates a new [`SlashFlusher`].
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S> Flush<Slash> for SlashFlusher<S>
where
    S: EventStorage + Debug + 'static,
{
    async fn flush(&self, batch: Vec<Slash>) -> Result<(), WriterError> {
        Ok(self.store.save_slashes(&batch).await?)
    }
}
