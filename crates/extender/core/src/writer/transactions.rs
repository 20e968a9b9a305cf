use super::{BatchWriter, Flush, chunked};
use crate::{ExtractionError, Metrics, WriterError};
use async_trait::async_trait;
use extender_primitives::{
    CommittedTransaction, InvalidTransaction, Transaction, TransactionOutput,
    TransactionValidator, TxType, normalize_address, normalize_public_key,
};
use extender_storage::{AddressStorage, CoinStorage, TransactionStorage, ValidatorStorage};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Debug,
    sync::Arc,
};
use tracing::{debug, trace};

/// Inserts valid transactions and fans the committed batch out to the dependent writers.
///
/// Once ids are assigned the batch produces:
/// - transaction to validator links, for kinds that act on a validator;
/// - transfer outputs and the address index, through the output writer;
/// - the set of coins whose state the batch touched, through the coin refresher.
#[derive(Debug)]
pub struct TransactionFlusher<S> {
    store: Arc<S>,
    base_coin: String,
    chunk_size: usize,
    outputs: BatchWriter<CommittedTransaction>,
    validators: BatchWriter<TransactionValidator>,
    coins: BatchWriter<String>,
}

impl<S> TransactionFlusher<S> {
    /// Creates a new [`TransactionFlusher`].
    pub const fn new(
        store: Arc<S>,
        base_coin: String,
        chunk_size: usize,
        outputs: BatchWriter<CommittedTransaction>,
        validators: BatchWriter<TransactionValidator>,
        coins: BatchWriter<String>,
    ) -> Self {
        Self { store, base_coin, chunk_size, outputs, validators, coins }
    }
}

impl<S> TransactionFlusher<S>
where
    S: TransactionStorage + ValidatorStorage + CoinStorage,
{
    async fn validator_links(
        &self,
        committed: &[CommittedTransaction],
    ) -> Result<Vec<TransactionValidator>, WriterError> {
        let mut links = Vec::new();
        for tx in committed {
            let Some(public_key) = tx.transaction.data.validator_public_key() else {
                continue;
            };
            let validator_id =
                self.store.find_or_create_validator_id(normalize_public_key(public_key)).await?;
            links.push(TransactionValidator { transaction_id: tx.id, validator_id });
        }
        Ok(links)
    }

    async fn touched_coins(
        &self,
        committed: &[CommittedTransaction],
    ) -> Result<Vec<String>, WriterError> {
        let mut gas_coins = BTreeMap::new();
        let mut symbols = BTreeSet::new();
        for tx in committed {
            let gas_coin_id = tx.transaction.gas_coin_id;
            if !gas_coins.contains_key(&gas_coin_id) {
                let symbol = self.store.find_coin_symbol(gas_coin_id).await?;
                gas_coins.insert(gas_coin_id, symbol);
            }
            symbols.extend(tx.transaction.data.traded_coins().into_iter().map(str::to_string));
        }
        symbols.extend(gas_coins.into_values());
        symbols.remove(&self.base_coin);
        Ok(symbols.into_iter().collect())
    }
}

#[async_trait]
impl<S> Flush<Transaction> for TransactionFlusher<S>
where
    S: TransactionStorage + ValidatorStorage + CoinStorage + Debug + 'static,
{
    async fn flush(&self, batch: Vec<Transaction>) -> Result<(), WriterError> {
        let ids = self.store.save_transactions(&batch).await?;
        metrics::counter!(Metrics::TRANSACTIONS_SAVED).increment(batch.len() as u64);

        let committed: Vec<_> = ids
            .into_iter()
            .zip(batch)
            .map(|(id, transaction)| CommittedTransaction { id, transaction })
            .collect();

        for chunk in chunked(&self.validator_links(&committed).await?, self.chunk_size) {
            self.validators.enqueue(chunk).await?;
        }
        let symbols = self.touched_coins(&committed).await?;
        trace!(target: "writer", count = committed.len(), "Saved transactions");

        self.outputs.enqueue(committed).await?;
        self.coins.enqueue(symbols).await
    }
}

/// Writes transfer outputs of committed transactions and indexes them by address.
#[derive(Debug)]
pub struct OutputFlusher<S> {
    store: Arc<S>,
}

impl<S> OutputFlusher<S> {
    /// Creates a new [`OutputFlusher`].
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S> OutputFlusher<S>
where
    S: AddressStorage + CoinStorage,
{
    async fn outputs(
        &self,
        batch: &[CommittedTransaction],
    ) -> Result<Vec<TransactionOutput>, WriterError> {
        let recipients: Vec<String> = batch
            .iter()
            .flat_map(|tx| tx.transaction.data.transfers())
            .map(|transfer| normalize_address(&transfer.to).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let address_ids = self.store.find_address_ids(&recipients).await?;

        let mut coin_ids = BTreeMap::new();
        let mut outputs = Vec::new();
        for tx in batch {
            if tx.transaction.kind() == TxType::RedeemCheck {
                debug!(target: "writer", hash = %tx.transaction.hash, "Skipping check redemption outputs");
                continue;
            }
            for (position, transfer) in tx.transaction.data.transfers().into_iter().enumerate() {
                let to = normalize_address(&transfer.to);
                let to_address_id = *address_ids
                    .get(to)
                    .ok_or_else(|| ExtractionError::MissingAddress(to.to_string()))?;
                let coin_id = match coin_ids.get(&transfer.coin) {
                    Some(id) => *id,
                    None => {
                        let id = self.store.find_coin_id(&transfer.coin).await?;
                        coin_ids.insert(transfer.coin.clone(), id);
                        id
                    }
                };
                outputs.push(TransactionOutput {
                    transaction_id: tx.id,
                    position: position as u32,
                    to_address_id,
                    coin_id,
                    value: transfer.value.clone(),
                });
            }
        }
        Ok(outputs)
    }
}

#[async_trait]
impl<S> Flush<CommittedTransaction> for OutputFlusher<S>
where
    S: TransactionStorage + AddressStorage + CoinStorage + Debug + 'static,
{
    async fn flush(&self, batch: Vec<CommittedTransaction>) -> Result<(), WriterError> {
        let outputs = self.outputs(&batch).await?;
        self.store.save_transaction_outputs(&outputs).await?;

        let ids: Vec<u64> = batch.iter().map(|tx| tx.id).collect();
        self.store.index_transaction_addresses(&ids).await?;
        Ok(())
    }
}

/// Inserts transactions the node rejected.
#[derive(Debug)]
pub struct InvalidTransactionFlusher<S> {
    store: Arc<S>,
}

impl<S> InvalidTransactionFlusher<S> {
    /// Creates a new [`InvalidTransactionFlusher`].
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S> Flush<InvalidTransaction> for InvalidTransactionFlusher<S>
where
    S: TransactionStorage + Debug + 'static,
{
    async fn flush(&self, batch: Vec<InvalidTransaction>) -> Result<(), WriterError> {
        self.store.save_invalid_transactions(&batch).await?;
        metrics::counter!(Metrics::INVALID_TRANSACTIONS).increment(batch.len() as u64);
        Ok(())
    }
}

/// Links transactions to the validators they act on.
#[derive(Debug)]
pub struct TransactionValidatorFlusher<S> {
    store: Arc<S>,
}

impl<S> TransactionValidatorFlusher<S> {
    /// Creates a new [`TransactionValidatorFlusher`].
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S> Flush<TransactionValidator> for TransactionValidatorFlusher<S>
where
    S: TransactionStorage + Debug + 'static,
{
    async fn flush(&self, batch: Vec<TransactionValidator>) -> Result<(), WriterError> {
        self.store.link_transaction_validators(&batch).await?;
        Ok(())
    }
}
