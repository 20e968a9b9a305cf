use crate::StorageResult;
use async_trait::async_trait;
use extender_primitives::{
    Balance, Block, BlockValidator, Coin, InvalidTransaction, Reward, Slash, Stake, Transaction,
    TransactionOutput, TransactionValidator, Validator,
};
use std::{collections::HashMap, fmt::Debug};

/// Provides access to the address dictionary.
///
/// Addresses are stored normalised (without prefix) and keyed by that string.
#[async_trait]
pub trait AddressStorage: Send + Sync {
    /// Saves every address that is not stored yet.
    ///
    /// # Arguments
    /// * `addresses` - Normalised addresses; duplicates are allowed.
    ///
    /// # Returns
    /// * `Ok(())` once every address is present in the store.
    /// * `Err(StorageError)` if the write fails.
    async fn save_addresses(&self, addresses: &[String]) -> StorageResult<()>;

    /// Looks up the id of a single address.
    ///
    /// # Returns
    /// * `Ok(id)` if the address is stored.
    /// * `Err(StorageError::EntryNotFound)` if it is not.
    async fn find_address_id(&self, address: &str) -> StorageResult<u64>;

    /// Looks up the ids of many addresses. Unknown addresses are absent from the map.
    async fn find_address_ids(&self, addresses: &[String]) -> StorageResult<HashMap<String, u64>>;
}

/// Provides access to blocks and their validator participation.
#[async_trait]
pub trait BlockStorage: Send + Sync {
    /// Saves a block. Saving an already stored height is a no-op.
    async fn save_block(&self, block: &Block) -> StorageResult<()>;

    /// Returns the highest stored block, if any.
    async fn last_block(&self) -> StorageResult<Option<Block>>;

    /// Deletes the highest stored block together with every row that references it.
    ///
    /// Used at startup to discard a block whose dependent writes may be partial.
    async fn delete_last_block_data(&self) -> StorageResult<()>;

    /// Links validators to blocks.
    async fn link_block_validators(&self, links: &[BlockValidator]) -> StorageResult<()>;
}

/// Provides access to transactions and their dependent rows.
#[async_trait]
pub trait TransactionStorage: Send + Sync {
    /// Inserts transactions, keyed by hash.
    ///
    /// # Arguments
    /// * `transactions` - Transactions to insert. Already stored hashes are left untouched.
    ///
    /// # Returns
    /// * `Ok(ids)` with one id per input transaction, in input order.
    /// * `Err(StorageError)` if the write fails.
    async fn save_transactions(&self, transactions: &[Transaction]) -> StorageResult<Vec<u64>>;

    /// Inserts transactions the node rejected.
    async fn save_invalid_transactions(
        &self,
        transactions: &[InvalidTransaction],
    ) -> StorageResult<()>;

    /// Inserts transfer outputs.
    async fn save_transaction_outputs(&self, outputs: &[TransactionOutput]) -> StorageResult<()>;

    /// Links transactions to the validators they act on.
    async fn link_transaction_validators(
        &self,
        links: &[TransactionValidator],
    ) -> StorageResult<()>;

    /// Indexes the given transactions by sender and recipients.
    async fn index_transaction_addresses(&self, transaction_ids: &[u64]) -> StorageResult<()>;

    /// Looks up a transaction id by normalised hash.
    async fn find_transaction_id(&self, hash: &str) -> StorageResult<u64>;
}

/// Provides access to coins.
#[async_trait]
pub trait CoinStorage: Send + Sync {
    /// Upserts coins by symbol.
    ///
    /// Creation references are only written when the incoming coin carries them; an
    /// upsert never clears a reference that is already stored.
    async fn save_coins(&self, coins: &[Coin]) -> StorageResult<()>;

    /// Looks up a coin id by symbol.
    async fn find_coin_id(&self, symbol: &str) -> StorageResult<u64>;

    /// Looks up a coin symbol by id.
    async fn find_coin_symbol(&self, id: u64) -> StorageResult<String>;

    /// Returns every stored coin.
    async fn all_coins(&self) -> StorageResult<Vec<Coin>>;

    /// Sets the creator address of a coin.
    ///
    /// # Returns
    /// * `Err(StorageError::EntryNotFound)` if the coin is not stored yet.
    async fn update_coin_owner(&self, symbol: &str, address_id: u64) -> StorageResult<()>;

    /// Sets the creation transaction of a coin.
    ///
    /// # Returns
    /// * `Err(StorageError::EntryNotFound)` if the coin is not stored yet.
    async fn update_coin_transaction(&self, symbol: &str, transaction_id: u64)
    -> StorageResult<()>;
}

/// Provides access to validators and stakes.
#[async_trait]
pub trait ValidatorStorage: Send + Sync {
    /// Looks up a validator id by normalised public key.
    async fn find_validator_id(&self, public_key: &str) -> StorageResult<u64>;

    /// Looks up a validator id, inserting a bare validator if it is unknown.
    async fn find_or_create_validator_id(&self, public_key: &str) -> StorageResult<u64>;

    /// Upserts validators by public key, touching only the fields each record carries.
    async fn save_validators(&self, validators: &[Validator]) -> StorageResult<()>;

    /// Atomically replaces every stake of `validator_ids` with `stakes`.
    async fn replace_stakes(&self, validator_ids: &[u64], stakes: &[Stake]) -> StorageResult<()>;
}

/// Provides access to rewards and slashes.
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Inserts rewards.
    async fn save_rewards(&self, rewards: &[Reward]) -> StorageResult<()>;

    /// Inserts slashes.
    async fn save_slashes(&self, slashes: &[Slash]) -> StorageResult<()>;

    /// Moves every reward below `before_height` into time bucketed aggregates.
    ///
    /// # Arguments
    /// * `interval` - Bucket width understood by the store, e.g. `hour` or `day`.
    /// * `before_height` - Exclusive upper bound on the rewarded height.
    ///
    /// # Returns
    /// * `Ok(count)` with the number of aggregate rows written.
    async fn aggregate_rewards(&self, interval: &str, before_height: u64) -> StorageResult<u64>;
}

/// Provides access to account balances.
#[async_trait]
pub trait BalanceStorage: Send + Sync {
    /// Atomically replaces every balance of `address_ids` with `balances`.
    async fn replace_balances(&self, address_ids: &[u64], balances: &[Balance])
    -> StorageResult<()>;
}

/// The complete relational store used by the pipeline.
pub trait Store:
    AddressStorage
    + BlockStorage
    + TransactionStorage
    + CoinStorage
    + ValidatorStorage
    + EventStorage
    + BalanceStorage
    + Debug
    + 'static
{
}

impl<T> Store for T where
    T: AddressStorage
        + BlockStorage
        + TransactionStorage
        + CoinStorage
        + ValidatorStorage
        + EventStorage
        + BalanceStorage
        + Debug
        + 'static
{
}
