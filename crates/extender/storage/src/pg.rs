//! Postgres implementation of the storage traits.

use crate::{
    AddressStorage, BalanceStorage, BlockStorage, CoinStorage, EventStorage, StorageError,
    StorageResult, TransactionStorage, ValidatorStorage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use extender_primitives::{
    Balance, Block, BlockValidator, Coin, InvalidTransaction, Reward, Slash, Stake, Transaction,
    TransactionOutput, TransactionValidator, Validator,
};
use lru::LruCache;
use sqlx::{
    FromRow, Postgres, QueryBuilder,
    postgres::{PgConnectOptions, PgPool, PgPoolOptions},
    types::Json,
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    num::NonZeroUsize,
    sync::Mutex,
};
use tracing::{debug, info};

/// Rows per statement for writes the store chunks itself.
const MAX_ROWS_PER_STATEMENT: usize = 1_000;

const CACHE_SIZE: NonZeroUsize = NonZeroUsize::new(16_384).unwrap();

/// Connection settings for [`PgStore`].
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub min_connections: u32,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "noah".to_string(),
            password: String::new(),
            database: "explorer".to_string(),
            max_connections: 20,
            min_connections: 5,
        }
    }
}

type IdCache = Mutex<LruCache<String, u64>>;

/// Relational store backed by Postgres.
///
/// Natural key lookups for addresses, coins and validators are memoised; ids never change
/// once assigned.
#[derive(Debug)]
pub struct PgStore {
    pool: PgPool,
    addresses: IdCache,
    coins: IdCache,
    validators: IdCache,
}

#[derive(Debug, FromRow)]
struct BlockRow {
    id: i64,
    total_txs: i64,
    num_txs: i32,
    size: i64,
    block_time: i64,
    created_at: DateTime<Utc>,
    block_reward: String,
    proposer_validator_id: Option<i64>,
    hash: String,
}

impl From<BlockRow> for Block {
    fn from(row: BlockRow) -> Self {
        Self {
            height: row.id as u64,
            total_txs: row.total_txs as u64,
            num_txs: row.num_txs as u32,
            size: row.size as u64,
            block_time: row.block_time as u64,
            created_at: row.created_at,
            block_reward: row.block_reward,
            proposer_validator_id: row.proposer_validator_id.map(|id| id as u64),
            hash: row.hash,
        }
    }
}

#[derive(Debug, FromRow)]
struct CoinRow {
    symbol: String,
    name: String,
    crr: i64,
    volume: String,
    reserve_balance: String,
    price: String,
    capitalization: String,
    creation_address_id: Option<i64>,
    creation_transaction_id: Option<i64>,
    updated_at: DateTime<Utc>,
}

impl From<CoinRow> for Coin {
    fn from(row: CoinRow) -> Self {
        Self {
            symbol: row.symbol,
            name: row.name,
            crr: row.crr as u64,
            volume: row.volume,
            reserve_balance: row.reserve_balance,
            price: row.price,
            capitalization: row.capitalization,
            creation_address_id: row.creation_address_id.map(|id| id as u64),
            creation_transaction_id: row.creation_transaction_id.map(|id| id as u64),
            updated_at: row.updated_at,
        }
    }
}

impl PgStore {
    /// Connects to the database described by `config`.
    pub async fn connect(config: &PgConfig) -> StorageResult<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_with(options)
            .await?;
        info!(target: "storage", host = %config.host, database = %config.database, "Connected to database");
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            addresses: Mutex::new(LruCache::new(CACHE_SIZE)),
            coins: Mutex::new(LruCache::new(CACHE_SIZE)),
            validators: Mutex::new(LruCache::new(CACHE_SIZE)),
        }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!(target: "storage", "Schema migrations applied");
        Ok(())
    }

    fn cached(cache: &IdCache, key: &str) -> Option<u64> {
        cache.lock().ok()?.get(key).copied()
    }

    fn remember(cache: &IdCache, key: &str, id: u64) {
        if let Ok(mut cache) = cache.lock() {
            cache.put(key.to_string(), id);
        }
    }

    async fn find_id(&self, sql: &str, key: &str, what: &str) -> StorageResult<u64> {
        let row: Option<(i64,)> =
            sqlx::query_as(sql).bind(key).fetch_optional(&self.pool).await?;
        row.map(|(id,)| id as u64).ok_or_else(|| StorageError::EntryNotFound(format!("{what} {key}")))
    }
}

#[async_trait]
impl AddressStorage for PgStore {
    async fn save_addresses(&self, addresses: &[String]) -> StorageResult<()> {
        let unique: Vec<String> =
            addresses.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        if unique.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO addresses (address) ");
        qb.push_values(unique, |mut row, address| {
            row.push_bind(address);
        });
        qb.push(" ON CONFLICT (address) DO NOTHING");
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn find_address_id(&self, address: &str) -> StorageResult<u64> {
        if let Some(id) = Self::cached(&self.addresses, address) {
            return Ok(id);
        }
        let id =
            self.find_id("SELECT id FROM addresses WHERE address = $1", address, "address").await?;
        Self::remember(&self.addresses, address, id);
        Ok(id)
    }

    async fn find_address_ids(&self, addresses: &[String]) -> StorageResult<HashMap<String, u64>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, address FROM addresses WHERE address = ANY($1)")
                .bind(addresses)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, address)| {
                Self::remember(&self.addresses, &address, id as u64);
                (address, id as u64)
            })
            .collect())
    }
}

#[async_trait]
impl BlockStorage for PgStore {
    async fn save_block(&self, block: &Block) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO blocks (id, total_txs, num_txs, size, block_time, created_at, \
             block_reward, proposer_validator_id, hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7::numeric, $8, $9) ON CONFLICT (id) DO NOTHING",
        )
        .bind(block.height as i64)
        .bind(block.total_txs as i64)
        .bind(block.num_txs as i32)
        .bind(block.size as i64)
        .bind(block.block_time as i64)
        .bind(block.created_at)
        .bind(&block.block_reward)
        .bind(block.proposer_validator_id.map(|id| id as i64))
        .bind(&block.hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_block(&self) -> StorageResult<Option<Block>> {
        let row: Option<BlockRow> = sqlx::query_as(
            "SELECT id, total_txs, num_txs, size, block_time, created_at, \
             block_reward::text AS block_reward, proposer_validator_id, hash \
             FROM blocks ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Block::from))
    }

    async fn delete_last_block_data(&self) -> StorageResult<()> {
        let result =
            sqlx::query("DELETE FROM blocks WHERE id = (SELECT max(id) FROM blocks)")
                .execute(&self.pool)
                .await?;
        debug!(target: "storage", rows = result.rows_affected(), "Deleted last block data");
        Ok(())
    }

    async fn link_block_validators(&self, links: &[BlockValidator]) -> StorageResult<()> {
        if links.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO block_validator (block_id, validator_id, signed) ",
        );
        qb.push_values(links, |mut row, link| {
            row.push_bind(link.block_id as i64)
                .push_bind(link.validator_id as i64)
                .push_bind(link.signed);
        });
        qb.push(" ON CONFLICT DO NOTHING");
        qb.build().execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionStorage for PgStore {
    async fn save_transactions(&self, transactions: &[Transaction]) -> StorageResult<Vec<u64>> {
        if transactions.is_empty() {
            return Ok(Vec::new());
        }
        let mut seen = HashSet::new();
        let unique: Vec<&Transaction> =
            transactions.iter().filter(|tx| seen.insert(tx.hash.as_str())).collect();

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO transactions (from_address_id, block_id, nonce, gas_price, gas, \
             gas_coin_id, created_at, type, hash, service_data, data, tags, payload, raw_tx) ",
        );
        qb.push_values(unique, |mut row, tx| {
            row.push_bind(tx.from_address_id as i64)
                .push_bind(tx.block_id as i64)
                .push_bind(tx.nonce as i64)
                .push_bind(tx.gas_price as i64)
                .push_bind(tx.gas as i64)
                .push_bind(tx.gas_coin_id as i64)
                .push_bind(tx.created_at)
                .push_bind(i16::from(u8::from(tx.kind())))
                .push_bind(tx.hash.clone())
                .push_bind(tx.service_data.clone())
                .push_bind(Json(tx.data.clone()))
                .push_bind(Json(tx.tags.clone()))
                .push_bind(tx.payload.clone())
                .push_bind(tx.raw_tx.clone());
        });
        // A no-op update makes conflicting rows report their existing id.
        qb.push(" ON CONFLICT (hash) DO UPDATE SET hash = EXCLUDED.hash RETURNING id, hash");
        let rows: Vec<(i64, String)> = qb.build_query_as().fetch_all(&self.pool).await?;
        let ids: HashMap<String, u64> =
            rows.into_iter().map(|(id, hash)| (hash, id as u64)).collect();

        transactions
            .iter()
            .map(|tx| {
                ids.get(&tx.hash)
                    .copied()
                    .ok_or_else(|| StorageError::EntryNotFound(format!("transaction {}", tx.hash)))
            })
            .collect()
    }

    async fn save_invalid_transactions(
        &self,
        transactions: &[InvalidTransaction],
    ) -> StorageResult<()> {
        if transactions.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO invalid_transactions (from_address_id, block_id, created_at, type, hash, \
             tx_data) ",
        );
        qb.push_values(transactions, |mut row, tx| {
            row.push_bind(tx.from_address_id as i64)
                .push_bind(tx.block_id as i64)
                .push_bind(tx.created_at)
                .push_bind(i16::from(tx.tx_type))
                .push_bind(tx.hash.clone())
                .push_bind(tx.tx_data.clone())
                .push_unseparated("::jsonb");
        });
        qb.push(" ON CONFLICT (hash) DO NOTHING");
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn save_transaction_outputs(&self, outputs: &[TransactionOutput]) -> StorageResult<()> {
        if outputs.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO transaction_outputs (transaction_id, position, to_address_id, coin_id, \
             value) ",
        );
        qb.push_values(outputs, |mut row, output| {
            row.push_bind(output.transaction_id as i64)
                .push_bind(output.position as i32)
                .push_bind(output.to_address_id as i64)
                .push_bind(output.coin_id as i64)
                .push_bind(output.value.clone())
                .push_unseparated("::numeric");
        });
        qb.push(" ON CONFLICT (transaction_id, position) DO NOTHING");
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn link_transaction_validators(
        &self,
        links: &[TransactionValidator],
    ) -> StorageResult<()> {
        if links.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO transaction_validator (transaction_id, validator_id) ",
        );
        qb.push_values(links, |mut row, link| {
            row.push_bind(link.transaction_id as i64).push_bind(link.validator_id as i64);
        });
        qb.push(" ON CONFLICT DO NOTHING");
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn index_transaction_addresses(&self, transaction_ids: &[u64]) -> StorageResult<()> {
        if transaction_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = transaction_ids.iter().map(|id| *id as i64).collect();
        sqlx::query(
            "INSERT INTO index_transaction_by_address (block_id, address_id, transaction_id) \
             SELECT t.block_id, t.from_address_id, t.id FROM transactions t WHERE t.id = ANY($1) \
             UNION \
             SELECT t.block_id, o.to_address_id, t.id FROM transactions t \
             JOIN transaction_outputs o ON o.transaction_id = t.id WHERE t.id = ANY($1) \
             ON CONFLICT DO NOTHING",
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_transaction_id(&self, hash: &str) -> StorageResult<u64> {
        self.find_id("SELECT id FROM transactions WHERE hash = $1", hash, "transaction").await
    }
}

#[async_trait]
impl CoinStorage for PgStore {
    async fn save_coins(&self, coins: &[Coin]) -> StorageResult<()> {
        let unique: BTreeMap<&str, &Coin> = coins.iter().map(|c| (c.symbol.as_str(), c)).collect();
        if unique.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO coins (symbol, name, crr, volume, reserve_balance, price, capitalization, \
             creation_address_id, creation_transaction_id, updated_at) ",
        );
        qb.push_values(unique.into_values(), |mut row, coin| {
            row.push_bind(coin.symbol.clone())
                .push_bind(coin.name.clone())
                .push_bind(coin.crr as i64)
                .push_bind(coin.volume.clone())
                .push_unseparated("::numeric")
                .push_bind(coin.reserve_balance.clone())
                .push_unseparated("::numeric")
                .push_bind(coin.price.clone())
                .push_unseparated("::numeric")
                .push_bind(coin.capitalization.clone())
                .push_unseparated("::numeric")
                .push_bind(coin.creation_address_id.map(|id| id as i64))
                .push_bind(coin.creation_transaction_id.map(|id| id as i64))
                .push_bind(coin.updated_at);
        });
        qb.push(
            " ON CONFLICT (symbol) DO UPDATE SET name = EXCLUDED.name, crr = EXCLUDED.crr, \
             volume = EXCLUDED.volume, reserve_balance = EXCLUDED.reserve_balance, \
             price = EXCLUDED.price, capitalization = EXCLUDED.capitalization, \
             creation_address_id = COALESCE(EXCLUDED.creation_address_id, coins.creation_address_id), \
             creation_transaction_id = COALESCE(EXCLUDED.creation_transaction_id, coins.creation_transaction_id), \
             updated_at = EXCLUDED.updated_at",
        );
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn find_coin_id(&self, symbol: &str) -> StorageResult<u64> {
        if let Some(id) = Self::cached(&self.coins, symbol) {
            return Ok(id);
        }
        let id = self.find_id("SELECT id FROM coins WHERE symbol = $1", symbol, "coin").await?;
        Self::remember(&self.coins, symbol, id);
        Ok(id)
    }

    async fn find_coin_symbol(&self, id: u64) -> StorageResult<String> {
        let row: Option<(String,)> = sqlx::query_as("SELECT symbol FROM coins WHERE id = $1")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(symbol,)| symbol).ok_or_else(|| StorageError::EntryNotFound(format!("coin #{id}")))
    }

    async fn all_coins(&self) -> StorageResult<Vec<Coin>> {
        let rows: Vec<CoinRow> = sqlx::query_as(
            "SELECT symbol, name, crr, volume::text AS volume, \
             reserve_balance::text AS reserve_balance, price::text AS price, \
             capitalization::text AS capitalization, creation_address_id, \
             creation_transaction_id, updated_at FROM coins ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Coin::from).collect())
    }

    async fn update_coin_owner(&self, symbol: &str, address_id: u64) -> StorageResult<()> {
        let result = sqlx::query("UPDATE coins SET creation_address_id = $1 WHERE symbol = $2")
            .bind(address_id as i64)
            .bind(symbol)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::EntryNotFound(format!("coin {symbol}")));
        }
        Ok(())
    }

    async fn update_coin_transaction(
        &self,
        symbol: &str,
        transaction_id: u64,
    ) -> StorageResult<()> {
        let result =
            sqlx::query("UPDATE coins SET creation_transaction_id = $1 WHERE symbol = $2")
                .bind(transaction_id as i64)
                .bind(symbol)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::EntryNotFound(format!("coin {symbol}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ValidatorStorage for PgStore {
    async fn find_validator_id(&self, public_key: &str) -> StorageResult<u64> {
        if let Some(id) = Self::cached(&self.validators, public_key) {
            return Ok(id);
        }
        let id = self
            .find_id("SELECT id FROM validators WHERE public_key = $1", public_key, "validator")
            .await?;
        Self::remember(&self.validators, public_key, id);
        Ok(id)
    }

    async fn find_or_create_validator_id(&self, public_key: &str) -> StorageResult<u64> {
        if let Some(id) = Self::cached(&self.validators, public_key) {
            return Ok(id);
        }
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO validators (public_key) VALUES ($1) \
             ON CONFLICT (public_key) DO UPDATE SET public_key = EXCLUDED.public_key RETURNING id",
        )
        .bind(public_key)
        .fetch_one(&self.pool)
        .await?;
        Self::remember(&self.validators, public_key, id as u64);
        Ok(id as u64)
    }

    async fn save_validators(&self, validators: &[Validator]) -> StorageResult<()> {
        let unique: BTreeMap<&str, &Validator> =
            validators.iter().map(|v| (v.public_key.as_str(), v)).collect();
        if unique.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO validators (public_key, owner_address_id, reward_address_id, status, \
             commission, total_stake) ",
        );
        qb.push_values(unique.into_values(), |mut row, validator| {
            row.push_bind(validator.public_key.clone())
                .push_bind(validator.owner_address_id.map(|id| id as i64))
                .push_bind(validator.reward_address_id.map(|id| id as i64))
                .push_bind(validator.status.map(i16::from))
                .push_bind(validator.commission.map(|c| c as i64))
                .push_bind(validator.total_stake.clone())
                .push_unseparated("::numeric");
        });
        qb.push(
            " ON CONFLICT (public_key) DO UPDATE SET \
             owner_address_id = COALESCE(EXCLUDED.owner_address_id, validators.owner_address_id), \
             reward_address_id = COALESCE(EXCLUDED.reward_address_id, validators.reward_address_id), \
             status = COALESCE(EXCLUDED.status, validators.status), \
             commission = COALESCE(EXCLUDED.commission, validators.commission), \
             total_stake = COALESCE(EXCLUDED.total_stake, validators.total_stake), \
             updated_at = now()",
        );
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn replace_stakes(&self, validator_ids: &[u64], stakes: &[Stake]) -> StorageResult<()> {
        let ids: Vec<i64> = validator_ids.iter().map(|id| *id as i64).collect();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM stakes WHERE validator_id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        for chunk in stakes.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO stakes (owner_address_id, validator_id, coin_id, value, noah_value) ",
            );
            qb.push_values(chunk, |mut row, stake| {
                row.push_bind(stake.owner_address_id as i64)
                    .push_bind(stake.validator_id as i64)
                    .push_bind(stake.coin_id as i64)
                    .push_bind(stake.value.clone())
                    .push_unseparated("::numeric")
                    .push_bind(stake.noah_value.clone())
                    .push_unseparated("::numeric");
            });
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EventStorage for PgStore {
    async fn save_rewards(&self, rewards: &[Reward]) -> StorageResult<()> {
        if rewards.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO rewards (block_id, address_id, validator_id, role, amount) ",
        );
        qb.push_values(rewards, |mut row, reward| {
            row.push_bind(reward.block_id as i64)
                .push_bind(reward.address_id as i64)
                .push_bind(reward.validator_id as i64)
                .push_bind(reward.role.clone())
                .push_bind(reward.amount.clone())
                .push_unseparated("::numeric");
        });
        qb.push(" ON CONFLICT DO NOTHING");
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn save_slashes(&self, slashes: &[Slash]) -> StorageResult<()> {
        if slashes.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO slashes (block_id, address_id, validator_id, coin_id, amount) ",
        );
        qb.push_values(slashes, |mut row, slash| {
            row.push_bind(slash.block_id as i64)
                .push_bind(slash.address_id as i64)
                .push_bind(slash.validator_id as i64)
                .push_bind(slash.coin_id as i64)
                .push_bind(slash.amount.clone())
                .push_unseparated("::numeric");
        });
        qb.push(" ON CONFLICT DO NOTHING");
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn aggregate_rewards(&self, interval: &str, before_height: u64) -> StorageResult<u64> {
        // Rewards are moved, not copied, within a single statement.
        let result = sqlx::query(
            "WITH moved AS ( \
                 DELETE FROM rewards WHERE block_id < $2 \
                 RETURNING block_id, address_id, validator_id, role, amount \
             ) \
             INSERT INTO aggregated_rewards \
                 (time_id, from_block_id, to_block_id, address_id, validator_id, role, amount) \
             SELECT date_trunc($1, b.created_at), min(m.block_id), max(m.block_id), \
                    m.address_id, m.validator_id, m.role, sum(m.amount) \
             FROM moved m JOIN blocks b ON b.id = m.block_id \
             GROUP BY 1, m.address_id, m.validator_id, m.role \
             ON CONFLICT (time_id, address_id, validator_id, role) DO UPDATE SET \
                 from_block_id = LEAST(aggregated_rewards.from_block_id, EXCLUDED.from_block_id), \
                 to_block_id = GREATEST(aggregated_rewards.to_block_id, EXCLUDED.to_block_id), \
                 amount = aggregated_rewards.amount + EXCLUDED.amount",
        )
        .bind(interval)
        .bind(before_height as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BalanceStorage for PgStore {
    async fn replace_balances(
        &self,
        address_ids: &[u64],
        balances: &[Balance],
    ) -> StorageResult<()> {
        let ids: Vec<i64> = address_ids.iter().map(|id| *id as i64).collect();
        let unique: Vec<&Balance> = balances
            .iter()
            .map(|b| ((b.address_id, b.coin_id), b))
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .collect();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM balances WHERE address_id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        for chunk in unique.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut qb =
                QueryBuilder::<Postgres>::new("INSERT INTO balances (address_id, coin_id, value) ");
            qb.push_values(chunk, |mut row, balance| {
                row.push_bind(balance.address_id as i64)
                    .push_bind(balance.coin_id as i64)
                    .push_bind(balance.value.clone())
                    .push_unseparated("::numeric");
            });
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(all(test, feature = "postgres-tests"))]
mod tests {
    use super::*;

    type ValidatorRow =
        (i64, String, Option<i64>, Option<i64>, Option<i16>, Option<i64>, Option<String>);

    async fn stored_validators(pool: &PgPool) -> Vec<ValidatorRow> {
        sqlx::query_as(
            "SELECT id, public_key, owner_address_id, reward_address_id, status, commission, \
             total_stake::text FROM validators ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .unwrap()
    }

    fn coin(symbol: &str, creator: Option<u64>) -> Coin {
        Coin {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            crr: 10,
            volume: "600".to_string(),
            reserve_balance: "10000".to_string(),
            price: "167922238458378386515".to_string(),
            capitalization: "100753343100000000000000".to_string(),
            creation_address_id: creator,
            creation_transaction_id: None,
            updated_at: Utc::now(),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn coin_batch_applied_twice_leaves_same_state(pool: PgPool) {
        let store = PgStore::from_pool(pool);
        store.save_addresses(&["aa".to_string()]).await.unwrap();
        let owner = store.find_address_id("aa").await.unwrap();
        let batch = vec![coin("AAA", Some(owner)), coin("BBB", None)];

        store.save_coins(&batch).await.unwrap();
        store.update_coin_transaction("BBB", 42).await.unwrap();
        let first = store.all_coins().await.unwrap();

        store.save_coins(&batch).await.unwrap();
        assert_eq!(store.all_coins().await.unwrap(), first);
        assert_eq!(first[1].creation_transaction_id, Some(42));
        assert_eq!(first[1].capitalization, "100753343100000000000000");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn validator_batch_applied_twice_leaves_same_state(pool: PgPool) {
        let store = PgStore::from_pool(pool.clone());
        store.save_addresses(&["aa".to_string(), "bb".to_string()]).await.unwrap();
        let owner = store.find_address_id("aa").await.unwrap();
        let reward = store.find_address_id("bb").await.unwrap();
        let batch = vec![
            Validator {
                public_key: "01".to_string(),
                owner_address_id: Some(owner),
                reward_address_id: Some(reward),
                status: Some(2),
                commission: Some(10),
                total_stake: Some("100".to_string()),
            },
            Validator { public_key: "02".to_string(), ..Default::default() },
        ];

        store.save_validators(&batch).await.unwrap();
        let first = stored_validators(&pool).await;

        store.save_validators(&batch).await.unwrap();
        assert_eq!(stored_validators(&pool).await, first);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].6.as_deref(), Some("100"));
    }
}
