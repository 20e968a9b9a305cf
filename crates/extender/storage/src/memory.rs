//! In-memory store for tests.

use crate::{
    AddressStorage, BalanceStorage, BlockStorage, CoinStorage, EventStorage, StorageError,
    StorageResult, TransactionStorage, ValidatorStorage,
};
use async_trait::async_trait;
use chrono::Utc;
use extender_primitives::{
    Balance, Block, BlockValidator, Coin, CommittedTransaction, InvalidTransaction, Reward, Slash,
    Stake, Transaction, TransactionOutput, TransactionValidator, Validator,
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    addresses: BTreeMap<String, u64>,
    blocks: BTreeMap<u64, Block>,
    block_validators: BTreeMap<(u64, u64), BlockValidator>,
    transactions: BTreeMap<u64, Transaction>,
    transaction_ids: HashMap<String, u64>,
    invalid_transactions: BTreeMap<String, InvalidTransaction>,
    outputs: BTreeMap<(u64, u32), TransactionOutput>,
    transaction_validators: BTreeSet<(u64, u64)>,
    address_index: BTreeSet<(u64, u64)>,
    coins: BTreeMap<String, (u64, Coin)>,
    validators: BTreeMap<String, (u64, Validator)>,
    stakes: Vec<Stake>,
    balances: BTreeMap<(u64, u64), Balance>,
    rewards: Vec<Reward>,
    aggregated_rewards: BTreeMap<(u64, u64, String), u128>,
    slashes: Vec<Slash>,
    saved_heights: Vec<u64>,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A [`Store`](crate::Store) that keeps everything in process memory.
///
/// Mirrors the conflict semantics of the Postgres store closely enough to run the whole
/// pipeline in tests, and exposes read helpers to inspect the result.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a coin directly, returning its id.
    pub fn seed_coin(&self, symbol: &str) -> u64 {
        let mut inner = self.lock();
        if let Some((id, _)) = inner.coins.get(symbol) {
            return *id;
        }
        let id = inner.next_id();
        let coin = Coin {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            crr: 100,
            volume: "0".to_string(),
            reserve_balance: "0".to_string(),
            price: "0".to_string(),
            capitalization: "0".to_string(),
            creation_address_id: None,
            creation_transaction_id: None,
            updated_at: Utc::now(),
        };
        inner.coins.insert(symbol.to_string(), (id, coin));
        id
    }

    /// Every height passed to `save_block`, in call order, including repeats.
    pub fn saved_heights(&self) -> Vec<u64> {
        self.lock().saved_heights.clone()
    }

    /// Stored blocks by height.
    pub fn blocks(&self) -> Vec<Block> {
        self.lock().blocks.values().cloned().collect()
    }

    /// Stored coin by symbol.
    pub fn coin(&self, symbol: &str) -> Option<Coin> {
        self.lock().coins.get(symbol).map(|(_, coin)| coin.clone())
    }

    /// Stored transactions with their ids, in id order.
    pub fn transactions(&self) -> Vec<CommittedTransaction> {
        self.lock()
            .transactions
            .iter()
            .map(|(id, tx)| CommittedTransaction { id: *id, transaction: tx.clone() })
            .collect()
    }

    /// Stored invalid transactions.
    pub fn invalid_transactions(&self) -> Vec<InvalidTransaction> {
        self.lock().invalid_transactions.values().cloned().collect()
    }

    /// Stored transfer outputs.
    pub fn outputs(&self) -> Vec<TransactionOutput> {
        self.lock().outputs.values().cloned().collect()
    }

    /// Stored transaction to validator links.
    pub fn transaction_validators(&self) -> Vec<TransactionValidator> {
        self.lock()
            .transaction_validators
            .iter()
            .map(|(transaction_id, validator_id)| TransactionValidator {
                transaction_id: *transaction_id,
                validator_id: *validator_id,
            })
            .collect()
    }

    /// Stored `(address id, transaction id)` index rows.
    pub fn address_index(&self) -> Vec<(u64, u64)> {
        self.lock().address_index.iter().copied().collect()
    }

    /// Stored block to validator links.
    pub fn block_validators(&self) -> Vec<BlockValidator> {
        self.lock().block_validators.values().copied().collect()
    }

    /// Stored validators.
    pub fn validators(&self) -> Vec<Validator> {
        self.lock().validators.values().map(|(_, v)| v.clone()).collect()
    }

    /// Stored stakes.
    pub fn stakes(&self) -> Vec<Stake> {
        self.lock().stakes.clone()
    }

    /// Stored balances.
    pub fn balances(&self) -> Vec<Balance> {
        self.lock().balances.values().cloned().collect()
    }

    /// Stored, not yet aggregated, rewards.
    pub fn rewards(&self) -> Vec<Reward> {
        self.lock().rewards.clone()
    }

    /// Aggregated reward totals keyed by `(address id, validator id, role)`.
    pub fn aggregated_rewards(&self) -> BTreeMap<(u64, u64, String), u128> {
        self.lock().aggregated_rewards.clone()
    }

    /// Stored slashes.
    pub fn slashes(&self) -> Vec<Slash> {
        self.lock().slashes.clone()
    }

    /// Id of a stored address.
    pub fn address_id(&self, address: &str) -> Option<u64> {
        self.lock().addresses.get(address).copied()
    }
}

fn not_found(what: &str, key: impl std::fmt::Display) -> StorageError {
    StorageError::EntryNotFound(format!("{what} {key}"))
}

#[async_trait]
impl AddressStorage for MemoryStore {
    async fn save_addresses(&self, addresses: &[String]) -> StorageResult<()> {
        let mut inner = self.lock();
        for address in addresses {
            if !inner.addresses.contains_key(address) {
                let id = inner.next_id();
                inner.addresses.insert(address.clone(), id);
            }
        }
        Ok(())
    }

    async fn find_address_id(&self, address: &str) -> StorageResult<u64> {
        self.lock().addresses.get(address).copied().ok_or_else(|| not_found("address", address))
    }

    async fn find_address_ids(&self, addresses: &[String]) -> StorageResult<HashMap<String, u64>> {
        let inner = self.lock();
        Ok(addresses
            .iter()
            .filter_map(|a| inner.addresses.get(a).map(|id| (a.clone(), *id)))
            .collect())
    }
}

#[async_trait]
impl BlockStorage for MemoryStore {
    async fn save_block(&self, block: &Block) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.saved_heights.push(block.height);
        inner.blocks.entry(block.height).or_insert_with(|| block.clone());
        Ok(())
    }

    async fn last_block(&self) -> StorageResult<Option<Block>> {
        Ok(self.lock().blocks.values().next_back().cloned())
    }

    async fn delete_last_block_data(&self) -> StorageResult<()> {
        let mut inner = self.lock();
        let Some((height, _)) = inner.blocks.pop_last() else {
            return Ok(());
        };
        let dropped: BTreeSet<u64> = inner
            .transactions
            .iter()
            .filter(|(_, tx)| tx.block_id == height)
            .map(|(id, _)| *id)
            .collect();
        inner.transactions.retain(|id, _| !dropped.contains(id));
        inner.transaction_ids.retain(|_, id| !dropped.contains(id));
        inner.outputs.retain(|(id, _), _| !dropped.contains(id));
        inner.transaction_validators.retain(|(id, _)| !dropped.contains(id));
        inner.address_index.retain(|(_, id)| !dropped.contains(id));
        inner.invalid_transactions.retain(|_, tx| tx.block_id != height);
        inner.block_validators.retain(|(block, _), _| *block != height);
        inner.rewards.retain(|r| r.block_id != height);
        inner.slashes.retain(|s| s.block_id != height);
        Ok(())
    }

    async fn link_block_validators(&self, links: &[BlockValidator]) -> StorageResult<()> {
        let mut inner = self.lock();
        for link in links {
            inner.block_validators.entry((link.block_id, link.validator_id)).or_insert(*link);
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionStorage for MemoryStore {
    async fn save_transactions(&self, transactions: &[Transaction]) -> StorageResult<Vec<u64>> {
        let mut inner = self.lock();
        let mut ids = Vec::with_capacity(transactions.len());
        for tx in transactions {
            if let Some(id) = inner.transaction_ids.get(&tx.hash) {
                ids.push(*id);
                continue;
            }
            let id = inner.next_id();
            inner.transaction_ids.insert(tx.hash.clone(), id);
            inner.transactions.insert(id, tx.clone());
            ids.push(id);
        }
        Ok(ids)
    }

    async fn save_invalid_transactions(
        &self,
        transactions: &[InvalidTransaction],
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        for tx in transactions {
            inner.invalid_transactions.entry(tx.hash.clone()).or_insert_with(|| tx.clone());
        }
        Ok(())
    }

    async fn save_transaction_outputs(&self, outputs: &[TransactionOutput]) -> StorageResult<()> {
        let mut inner = self.lock();
        for output in outputs {
            inner
                .outputs
                .entry((output.transaction_id, output.position))
                .or_insert_with(|| output.clone());
        }
        Ok(())
    }

    async fn link_transaction_validators(
        &self,
        links: &[TransactionValidator],
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.transaction_validators.extend(links.iter().map(|l| (l.transaction_id, l.validator_id)));
        Ok(())
    }

    async fn index_transaction_addresses(&self, transaction_ids: &[u64]) -> StorageResult<()> {
        let mut inner = self.lock();
        let mut rows = Vec::new();
        for id in transaction_ids {
            if let Some(tx) = inner.transactions.get(id) {
                rows.push((tx.from_address_id, *id));
            }
            rows.extend(
                inner
                    .outputs
                    .values()
                    .filter(|o| o.transaction_id == *id)
                    .map(|o| (o.to_address_id, *id)),
            );
        }
        inner.address_index.extend(rows);
        Ok(())
    }

    async fn find_transaction_id(&self, hash: &str) -> StorageResult<u64> {
        self.lock().transaction_ids.get(hash).copied().ok_or_else(|| not_found("transaction", hash))
    }
}

#[async_trait]
impl CoinStorage for MemoryStore {
    async fn save_coins(&self, coins: &[Coin]) -> StorageResult<()> {
        let mut inner = self.lock();
        for coin in coins {
            if let Some((_, stored)) = inner.coins.get_mut(&coin.symbol) {
                let creation_address_id = coin.creation_address_id.or(stored.creation_address_id);
                let creation_transaction_id =
                    coin.creation_transaction_id.or(stored.creation_transaction_id);
                *stored = Coin { creation_address_id, creation_transaction_id, ..coin.clone() };
            } else {
                let id = inner.next_id();
                inner.coins.insert(coin.symbol.clone(), (id, coin.clone()));
            }
        }
        Ok(())
    }

    async fn find_coin_id(&self, symbol: &str) -> StorageResult<u64> {
        self.lock().coins.get(symbol).map(|(id, _)| *id).ok_or_else(|| not_found("coin", symbol))
    }

    async fn find_coin_symbol(&self, id: u64) -> StorageResult<String> {
        self.lock()
            .coins
            .values()
            .find(|(coin_id, _)| *coin_id == id)
            .map(|(_, coin)| coin.symbol.clone())
            .ok_or_else(|| not_found("coin", format!("#{id}")))
    }

    async fn all_coins(&self) -> StorageResult<Vec<Coin>> {
        Ok(self.lock().coins.values().map(|(_, coin)| coin.clone()).collect())
    }

    async fn update_coin_owner(&self, symbol: &str, address_id: u64) -> StorageResult<()> {
        let mut inner = self.lock();
        let (_, coin) = inner.coins.get_mut(symbol).ok_or_else(|| not_found("coin", symbol))?;
        coin.creation_address_id = Some(address_id);
        Ok(())
    }

    async fn update_coin_transaction(
        &self,
        symbol: &str,
        transaction_id: u64,
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        let (_, coin) = inner.coins.get_mut(symbol).ok_or_else(|| not_found("coin", symbol))?;
        coin.creation_transaction_id = Some(transaction_id);
        Ok(())
    }
}

#[async_trait]
impl ValidatorStorage for MemoryStore {
    async fn find_validator_id(&self, public_key: &str) -> StorageResult<u64> {
        self.lock()
            .validators
            .get(public_key)
            .map(|(id, _)| *id)
            .ok_or_else(|| not_found("validator", public_key))
    }

    async fn find_or_create_validator_id(&self, public_key: &str) -> StorageResult<u64> {
        let mut inner = self.lock();
        if let Some((id, _)) = inner.validators.get(public_key) {
            return Ok(*id);
        }
        let id = inner.next_id();
        let validator = Validator { public_key: public_key.to_string(), ..Default::default() };
        inner.validators.insert(public_key.to_string(), (id, validator));
        Ok(id)
    }

    async fn save_validators(&self, validators: &[Validator]) -> StorageResult<()> {
        let mut inner = self.lock();
        for validator in validators {
            if let Some((_, stored)) = inner.validators.get_mut(&validator.public_key) {
                stored.owner_address_id = validator.owner_address_id.or(stored.owner_address_id);
                stored.reward_address_id =
                    validator.reward_address_id.or(stored.reward_address_id);
                stored.status = validator.status.or(stored.status);
                stored.commission = validator.commission.or(stored.commission);
                stored.total_stake = validator.total_stake.clone().or(stored.total_stake.take());
            } else {
                let id = inner.next_id();
                inner.validators.insert(validator.public_key.clone(), (id, validator.clone()));
            }
        }
        Ok(())
    }

    async fn replace_stakes(&self, validator_ids: &[u64], stakes: &[Stake]) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.stakes.retain(|s| !validator_ids.contains(&s.validator_id));
        inner.stakes.extend_from_slice(stakes);
        Ok(())
    }
}

#[async_trait]
impl EventStorage for MemoryStore {
    async fn save_rewards(&self, rewards: &[Reward]) -> StorageResult<()> {
        let mut inner = self.lock();
        for reward in rewards {
            if !inner.rewards.contains(reward) {
                inner.rewards.push(reward.clone());
            }
        }
        Ok(())
    }

    async fn save_slashes(&self, slashes: &[Slash]) -> StorageResult<()> {
        let mut inner = self.lock();
        for slash in slashes {
            if !inner.slashes.contains(slash) {
                inner.slashes.push(slash.clone());
            }
        }
        Ok(())
    }

    async fn aggregate_rewards(&self, _interval: &str, before_height: u64) -> StorageResult<u64> {
        let mut inner = self.lock();
        let (moved, kept): (Vec<Reward>, Vec<Reward>) =
            std::mem::take(&mut inner.rewards).into_iter().partition(|r| r.block_id < before_height);
        inner.rewards = kept;
        let mut touched = BTreeSet::new();
        for reward in moved {
            let key = (reward.address_id, reward.validator_id, reward.role);
            let amount = reward.amount.parse::<u128>().unwrap_or_default();
            *inner.aggregated_rewards.entry(key.clone()).or_default() += amount;
            touched.insert(key);
        }
        Ok(touched.len() as u64)
    }
}

#[async_trait]
impl BalanceStorage for MemoryStore {
    async fn replace_balances(
        &self,
        address_ids: &[u64],
        balances: &[Balance],
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.balances.retain(|(address_id, _), _| !address_ids.contains(address_id));
        for balance in balances {
            inner.balances.insert((balance.address_id, balance.coin_id), balance.clone());
        }
        Ok(())
    }
}
