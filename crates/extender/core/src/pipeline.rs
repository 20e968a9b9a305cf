//! Wiring of the batch writers.

use crate::{
    ExtenderConfig, FatalSignal,
    writer::{
        AddressFlusher, BalanceFetcher, BalanceFlusher, BatchWriter, CoinRefresher,
        InvalidTransactionFlusher, OutputFlusher, RewardFlusher, SlashFlusher, StakeRefresher,
        TransactionFlusher, TransactionValidatorFlusher, ValidatorRefresher,
    },
};
use extender_node_api::NodeApi;
use extender_primitives::{InvalidTransaction, Reward, Slash, Transaction};
use extender_storage::Store;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Entry points of the writer graph fed by the ingestion loop.
///
/// Downstream writers (outputs, validator links, balances, coin refresh) are only reachable
/// through the flushers that feed them, so dropping a [`Pipeline`] lets the whole graph
/// drain and stop.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Address saver; forwards to the balance fetchers.
    pub addresses: BatchWriter<String>,
    /// Transaction saver; forwards to outputs, validator links and coin refresh.
    pub transactions: BatchWriter<Transaction>,
    /// Invalid transaction saver.
    pub invalid_transactions: BatchWriter<InvalidTransaction>,
    /// Reward saver.
    pub rewards: BatchWriter<Reward>,
    /// Slash saver.
    pub slashes: BatchWriter<Slash>,
    /// Validator info refresh, fed heights.
    pub validators: BatchWriter<u64>,
    /// Stake refresh, fed heights.
    pub stakes: BatchWriter<u64>,
}

impl Pipeline {
    /// Spawns every writer pool onto `tasks`.
    pub fn spawn<N, S>(
        node: &Arc<N>,
        store: &Arc<S>,
        config: &ExtenderConfig,
        fatal: &FatalSignal,
        tasks: &mut JoinSet<()>,
    ) -> Self
    where
        N: NodeApi + 'static,
        S: Store,
    {
        let workers = &config.workers;

        let balance_updates = BatchWriter::spawn(
            "balance_update",
            workers.balance_updaters,
            Arc::new(BalanceFlusher::new(store.clone())),
            fatal.clone(),
            tasks,
        );
        let balance_fetch = BatchWriter::spawn(
            "balance_fetch",
            workers.balance_fetchers,
            Arc::new(BalanceFetcher::new(
                node.clone(),
                store.clone(),
                config.addr_chunk_size,
                balance_updates,
            )),
            fatal.clone(),
            tasks,
        );
        let addresses = BatchWriter::spawn(
            "addresses",
            workers.addresses,
            Arc::new(AddressFlusher::new(store.clone(), config.addr_chunk_size, balance_fetch)),
            fatal.clone(),
            tasks,
        );

        let coins = BatchWriter::spawn(
            "coins",
            workers.coins,
            Arc::new(CoinRefresher::new(node.clone(), store.clone())),
            fatal.clone(),
            tasks,
        );
        let outputs = BatchWriter::spawn(
            "outputs",
            workers.outputs,
            Arc::new(OutputFlusher::new(store.clone())),
            fatal.clone(),
            tasks,
        );
        let transaction_validators = BatchWriter::spawn(
            "transaction_validators",
            workers.transaction_validators,
            Arc::new(TransactionValidatorFlusher::new(store.clone())),
            fatal.clone(),
            tasks,
        );
        let transactions = BatchWriter::spawn(
            "transactions",
            workers.transactions,
            Arc::new(TransactionFlusher::new(
                store.clone(),
                config.base_coin.clone(),
                config.tx_chunk_size,
                outputs,
                transaction_validators,
                coins,
            )),
            fatal.clone(),
            tasks,
        );
        let invalid_transactions = BatchWriter::spawn(
            "invalid_transactions",
            workers.invalid_transactions,
            Arc::new(InvalidTransactionFlusher::new(store.clone())),
            fatal.clone(),
            tasks,
        );

        let rewards = BatchWriter::spawn(
            "rewards",
            workers.rewards,
            Arc::new(RewardFlusher::new(store.clone())),
            fatal.clone(),
            tasks,
        );
        let slashes = BatchWriter::spawn(
            "slashes",
            workers.slashes,
            Arc::new(SlashFlusher::new(store.clone())),
            fatal.clone(),
            tasks,
        );

        let validators = BatchWriter::spawn_coalescing(
            "validators",
            Arc::new(ValidatorRefresher::new(node.clone(), store.clone())),
            fatal.clone(),
            tasks,
        );
        let stakes = BatchWriter::spawn_coalescing(
            "stakes",
            Arc::new(StakeRefresher::new(node.clone(), store.clone(), config.stake_chunk_size)),
            fatal.clone(),
            tasks,
        );

        Self { addresses, transactions, invalid_transactions, rewards, slashes, validators, stakes }
    }
}
