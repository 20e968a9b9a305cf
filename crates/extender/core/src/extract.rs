//! Extraction stage.
//!
//! Turns node responses into domain records resolved against the store. A record that
//! cannot be decoded is logged and skipped. A reference the pipeline guarantees to exist
//! (an address saved earlier at the same height, a known coin) fails extraction. A coin's
//! creator address or creation transaction that is not stored yet is recorded in the
//! [`DeferredLedger`] and left unset.

use crate::{ExtractionError, Metrics, sweeper::resolve_link, writer::priced_coin};
use alloy_primitives::hex;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use extender_node_api::{BlockEvent, BlockResult, EventsResult, TransactionResult};
use extender_primitives::{
    Block, BlockValidator, Coin, InvalidTransaction, Reward, Slash, Transaction, TxData, TxType,
    DeferredLink, normalize_address, normalize_hash, normalize_public_key,
};
use extender_storage::{DeferredLedger, Store};
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tracing::{trace, warn};

/// Transactions of one chunk, split by validity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedTransactions {
    /// Transactions the node accepted.
    pub valid: Vec<Transaction>,
    /// Transactions the node rejected.
    pub invalid: Vec<InvalidTransaction>,
}

/// Rewards and slashes of one height.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedEvents {
    /// Validator and delegator rewards.
    pub rewards: Vec<Reward>,
    /// Slashes.
    pub slashes: Vec<Slash>,
}

/// Decodes node responses into store-ready records.
#[derive(Debug)]
pub struct Extractor<S> {
    store: Arc<S>,
    ledger: Arc<DeferredLedger>,
}

impl<S> Clone for Extractor<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), ledger: self.ledger.clone() }
    }
}

fn decode_data(tx: &TransactionResult) -> Option<TxData> {
    let kind = match TxType::try_from(tx.tx_type) {
        Ok(kind) => kind,
        Err(err) => {
            warn!(target: "extract", hash = %tx.hash, %err, "Skipping transaction");
            return None;
        }
    };
    match TxData::decode(kind, tx.data.clone()) {
        Ok(data) => Some(data),
        Err(err) => {
            warn!(target: "extract", hash = %tx.hash, ?kind, %err, "Skipping malformed transaction data");
            None
        }
    }
}

impl<S: Store> Extractor<S> {
    /// Creates a new [`Extractor`].
    pub const fn new(store: Arc<S>, ledger: Arc<DeferredLedger>) -> Self {
        Self { store, ledger }
    }

    /// Every address a block and its events reference, normalised and de-duplicated.
    pub fn addresses(block: &BlockResult, events: &EventsResult) -> Vec<String> {
        let mut addresses = BTreeSet::new();
        for tx in &block.transactions {
            addresses.insert(normalize_address(&tx.from).to_string());
            if !tx.is_valid() {
                continue;
            }
            let Ok(kind) = TxType::try_from(tx.tx_type) else { continue };
            if let Ok(data) = TxData::decode(kind, tx.data.clone()) {
                addresses.extend(
                    data.referenced_addresses().into_iter().map(|a| normalize_address(a).to_string()),
                );
            }
        }
        for event in &events.events {
            match event.decode() {
                Ok(Some(BlockEvent::Reward(reward))) => {
                    addresses.insert(normalize_address(&reward.address).to_string());
                }
                Ok(Some(BlockEvent::Slash(slash))) => {
                    addresses.insert(normalize_address(&slash.address).to_string());
                }
                Ok(None) | Err(_) => {}
            }
        }
        addresses.into_iter().collect()
    }

    /// Ids of the block's validators, creating unknown validators.
    pub async fn block_validators(
        &self,
        block: &BlockResult,
    ) -> Result<Vec<BlockValidator>, ExtractionError> {
        let mut links = Vec::with_capacity(block.validators.len());
        for validator in &block.validators {
            let validator_id = self
                .store
                .find_or_create_validator_id(normalize_public_key(&validator.pub_key))
                .await?;
            links.push(BlockValidator {
                block_id: block.height,
                validator_id,
                signed: validator.signed,
            });
        }
        Ok(links)
    }

    /// The block record, timed against `previous`.
    pub async fn block(
        &self,
        block: &BlockResult,
        previous: Option<&Block>,
    ) -> Result<Block, ExtractionError> {
        let proposer_validator_id = if block.proposer.is_empty() {
            None
        } else {
            match self.store.find_validator_id(normalize_public_key(&block.proposer)).await {
                Ok(id) => Some(id),
                Err(err) if err.is_not_found() => None,
                Err(err) => return Err(err.into()),
            }
        };
        let num_txs = u32::try_from(block.num_txs).map_err(|_| ExtractionError::Malformed {
            field: "num_txs",
            value: block.num_txs.to_string(),
        })?;

        Ok(Block {
            height: block.height,
            total_txs: block.total_txs,
            num_txs,
            size: block.size,
            block_time: Block::interval_since(previous, block.time),
            created_at: block.time,
            block_reward: block.block_reward.clone(),
            proposer_validator_id,
            hash: normalize_hash(&block.hash).to_string(),
        })
    }

    /// Decodes a chunk of the transactions of block `height`.
    pub async fn transactions(
        &self,
        height: u64,
        created_at: DateTime<Utc>,
        chunk: &[TransactionResult],
    ) -> Result<ExtractedTransactions, ExtractionError> {
        let senders: Vec<String> = chunk
            .iter()
            .map(|tx| normalize_address(&tx.from).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let sender_ids = self.store.find_address_ids(&senders).await?;
        let mut coin_ids: HashMap<&str, u64> = HashMap::new();

        let mut extracted = ExtractedTransactions::default();
        for tx in chunk {
            let from = normalize_address(&tx.from);
            let from_address_id = *sender_ids
                .get(from)
                .ok_or_else(|| ExtractionError::MissingAddress(from.to_string()))?;
            let hash = normalize_hash(&tx.hash).to_string();

            if !tx.is_valid() {
                let tx_data = serde_json::to_string(tx).map_err(|err| {
                    ExtractionError::Malformed { field: "tx_data", value: err.to_string() }
                })?;
                extracted.invalid.push(InvalidTransaction {
                    from_address_id,
                    block_id: height,
                    created_at,
                    tx_type: tx.tx_type,
                    hash,
                    tx_data,
                });
                continue;
            }

            let Some(data) = decode_data(tx) else { continue };
            let payload = match STANDARD.decode(&tx.payload) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(target: "extract", %hash, %err, "Skipping transaction with malformed payload");
                    continue;
                }
            };
            let raw_tx = match hex::decode(&tx.raw_tx) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(target: "extract", %hash, %err, "Skipping transaction with malformed body");
                    continue;
                }
            };

            let gas_coin_id = match coin_ids.get(tx.gas_coin.as_str()) {
                Some(id) => *id,
                None => {
                    let id = match self.store.find_coin_id(&tx.gas_coin).await {
                        Ok(id) => id,
                        Err(err) if err.is_not_found() => {
                            return Err(ExtractionError::MissingCoin(tx.gas_coin.clone()));
                        }
                        Err(err) => return Err(err.into()),
                    };
                    coin_ids.insert(&tx.gas_coin, id);
                    id
                }
            };

            extracted.valid.push(Transaction {
                from_address_id,
                block_id: height,
                nonce: tx.nonce,
                gas_price: tx.gas_price,
                gas: tx.gas,
                gas_coin_id,
                created_at,
                hash,
                service_data: tx.service_data.clone(),
                data,
                tags: tx.tags.clone().unwrap_or_default(),
                payload,
                raw_tx,
            });
        }
        trace!(
            target: "extract",
            height,
            valid = extracted.valid.len(),
            invalid = extracted.invalid.len(),
            "Extracted transactions"
        );
        Ok(extracted)
    }

    async fn resolve_or_defer(&self, link: DeferredLink) -> Result<Option<u64>, ExtractionError> {
        match resolve_link(self.store.as_ref(), &link).await {
            Ok(id) => Ok(Some(id)),
            Err(err) if err.is_not_found() => {
                if self.ledger.record(&link)? {
                    metrics::counter!(Metrics::LEDGER_RECORDED).increment(1);
                }
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Coins created by the valid transactions of a block.
    pub async fn coins(&self, block: &BlockResult) -> Result<Vec<Coin>, ExtractionError> {
        let mut coins = Vec::new();
        for tx in block.transactions.iter().filter(|tx| tx.is_valid()) {
            if tx.tx_type != u8::from(TxType::CreateCoin) {
                continue;
            }
            let Some(TxData::CreateCoin(data)) = decode_data(tx) else { continue };
            let crr = data.constant_reserve_ratio.parse().map_err(|_| {
                ExtractionError::Malformed {
                    field: "constant_reserve_ratio",
                    value: data.constant_reserve_ratio.clone(),
                }
            })?;

            let symbol = data.symbol;
            let mut coin =
                priced_coin(symbol.clone(), data.name, crr, data.initial_amount, data.initial_reserve)?;
            coin.creation_address_id = self
                .resolve_or_defer(DeferredLink::address(&symbol, normalize_address(&tx.from)))
                .await?;
            coin.creation_transaction_id = self
                .resolve_or_defer(DeferredLink::transaction(&symbol, normalize_hash(&tx.hash)))
                .await?;
            coins.push(coin);
        }
        Ok(coins)
    }

    /// Rewards and slashes emitted at `height`.
    pub async fn events(
        &self,
        height: u64,
        events: &EventsResult,
    ) -> Result<ExtractedEvents, ExtractionError> {
        let decoded: Vec<BlockEvent> = events
            .events
            .iter()
            .filter_map(|event| match event.decode() {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(target: "extract", height, kind = %event.kind, %err, "Skipping malformed event");
                    None
                }
            })
            .collect();

        let addresses: Vec<String> = decoded
            .iter()
            .map(|event| match event {
                BlockEvent::Reward(reward) => normalize_address(&reward.address).to_string(),
                BlockEvent::Slash(slash) => normalize_address(&slash.address).to_string(),
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let address_ids = self.store.find_address_ids(&addresses).await?;
        let address_id = |raw: &str| {
            let address = normalize_address(raw);
            address_ids
                .get(address)
                .copied()
                .ok_or_else(|| ExtractionError::MissingAddress(address.to_string()))
        };

        let mut extracted = ExtractedEvents::default();
        for event in decoded {
            match event {
                BlockEvent::Reward(reward) => {
                    let validator_id = self
                        .store
                        .find_or_create_validator_id(normalize_public_key(&reward.validator_pub_key))
                        .await?;
                    extracted.rewards.push(Reward {
                        block_id: height,
                        address_id: address_id(&reward.address)?,
                        validator_id,
                        role: reward.role,
                        amount: reward.amount,
                    });
                }
                BlockEvent::Slash(slash) => {
                    let validator_id = self
                        .store
                        .find_or_create_validator_id(normalize_public_key(&slash.validator_pub_key))
                        .await?;
                    let coin_id = match self.store.find_coin_id(&slash.coin).await {
                        Ok(id) => id,
                        Err(err) if err.is_not_found() => {
                            return Err(ExtractionError::MissingCoin(slash.coin));
                        }
                        Err(err) => return Err(err.into()),
                    };
                    extracted.slashes.push(Slash {
                        block_id: height,
                        address_id: address_id(&slash.address)?,
                        validator_id,
                        coin_id,
                        amount: slash.amount,
                    });
                }
            }
        }
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extender_node_api::{BlockValidatorResult, EventResult};
    use extender_storage::{AddressStorage, MemoryStore, TransactionStorage};
    use serde_json::json;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: Arc<MemoryStore>,
        ledger: Arc<DeferredLedger>,
        extractor: Extractor<MemoryStore>,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(DeferredLedger::open(dir.path()).unwrap());
        let store = Arc::new(MemoryStore::new());
        store.seed_coin("NOAH");
        let extractor = Extractor::new(store.clone(), ledger.clone());
        Harness { _dir: dir, store, ledger, extractor }
    }

    fn tx(hash: &str, tx_type: u8, data: serde_json::Value) -> TransactionResult {
        TransactionResult {
            hash: format!("Nt{hash}"),
            raw_tx: "f8a0".into(),
            from: "NOAHxsender".into(),
            nonce: 1,
            gas_price: 1,
            gas: 10,
            gas_coin: "NOAH".into(),
            tx_type,
            data,
            payload: "aGk=".into(),
            service_data: String::new(),
            tags: None,
            code: None,
            log: None,
        }
    }

    fn block(transactions: Vec<TransactionResult>) -> BlockResult {
        BlockResult {
            hash: "Mtabcd".into(),
            height: 7,
            time: Utc::now(),
            num_txs: transactions.len() as u64,
            total_txs: 40,
            transactions,
            block_reward: "100".into(),
            size: 512,
            proposer: "Np01".into(),
            validators: vec![BlockValidatorResult { pub_key: "Np01".into(), signed: true }],
        }
    }

    fn create_coin() -> TransactionResult {
        tx(
            "c0",
            5,
            json!({
                "name": "Test",
                "symbol": "TEST",
                "initial_amount": "600",
                "initial_reserve": "10000",
                "constant_reserve_ratio": "100"
            }),
        )
    }

    #[test]
    fn collects_addresses_from_transactions_and_events() {
        let block = block(vec![tx("01", 1, json!({ "coin": "NOAH", "to": "NOAHxbob", "value": "1" }))]);
        let events = EventsResult {
            events: vec![EventResult {
                kind: "minter/RewardEvent".into(),
                value: json!({
                    "role": "DAO",
                    "address": "NOAHxdao",
                    "amount": "5",
                    "validator_pub_key": "Np01"
                }),
            }],
        };
        assert_eq!(Extractor::<MemoryStore>::addresses(&block, &events), vec!["bob", "dao", "sender"]);
    }

    #[tokio::test]
    async fn splits_valid_and_invalid_and_skips_unknown() {
        let h = harness();
        h.store.save_addresses(&["sender".to_string()]).await.unwrap();
        let mut rejected = tx("02", 1, json!({}));
        rejected.log = Some("insufficient funds".into());
        let chunk = vec![
            tx("01", 1, json!({ "coin": "NOAH", "to": "NOAHxbob", "value": "1" })),
            rejected,
            tx("03", 99, json!({})),
            tx("04", 1, json!({ "coin": "NOAH" })),
        ];

        let extracted = h.extractor.transactions(7, Utc::now(), &chunk).await.unwrap();
        assert_eq!(extracted.valid.len(), 1);
        assert_eq!(extracted.valid[0].hash, "01");
        assert_eq!(extracted.valid[0].payload, b"hi");
        assert_eq!(extracted.valid[0].raw_tx, vec![0xf8, 0xa0]);
        assert_eq!(extracted.invalid.len(), 1);
        assert_eq!(extracted.invalid[0].hash, "02");
    }

    #[tokio::test]
    async fn unknown_sender_is_an_error() {
        let h = harness();
        let chunk = vec![tx("01", 1, json!({ "coin": "NOAH", "to": "NOAHxbob", "value": "1" }))];
        let err = h.extractor.transactions(7, Utc::now(), &chunk).await.unwrap_err();
        assert!(matches!(err, ExtractionError::MissingAddress(a) if a == "sender"));
    }

    #[tokio::test]
    async fn new_coin_defers_unresolved_links() {
        let h = harness();
        h.store.save_addresses(&["sender".to_string()]).await.unwrap();

        let coins = h.extractor.coins(&block(vec![create_coin()])).await.unwrap();
        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].price, "16666666666666666666");
        assert_eq!(coins[0].creation_address_id, h.store.address_id("sender"));
        assert_eq!(coins[0].creation_transaction_id, None);

        let pending = h.ledger.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, b"trx_TEST_c0");
    }

    #[tokio::test]
    async fn new_coin_resolves_committed_transaction() {
        let h = harness();
        h.store.save_addresses(&["sender".to_string()]).await.unwrap();
        let extracted =
            h.extractor.transactions(7, Utc::now(), &[create_coin()]).await.unwrap();
        let ids = h.store.save_transactions(&extracted.valid).await.unwrap();

        let coins = h.extractor.coins(&block(vec![create_coin()])).await.unwrap();
        assert_eq!(coins[0].creation_transaction_id, Some(ids[0]));
        assert!(h.ledger.is_empty().unwrap());
    }

    #[tokio::test]
    async fn block_without_known_proposer() {
        let h = harness();
        let record = h.extractor.block(&block(Vec::new()), None).await.unwrap();
        assert_eq!(record.proposer_validator_id, None);
        assert_eq!(record.block_time, Block::FIRST_BLOCK_TIME);
        assert_eq!(record.hash, "abcd");

        let links = h.extractor.block_validators(&block(Vec::new())).await.unwrap();
        let record = h.extractor.block(&block(Vec::new()), None).await.unwrap();
        assert_eq!(record.proposer_validator_id, Some(links[0].validator_id));
    }

    #[tokio::test]
    async fn events_resolve_ids_and_skip_other_kinds() {
        let h = harness();
        h.store.save_addresses(&["dao".to_string(), "bad".to_string()]).await.unwrap();
        let events = EventsResult {
            events: vec![
                EventResult {
                    kind: "minter/RewardEvent".into(),
                    value: json!({
                        "role": "DAO",
                        "address": "NOAHxdao",
                        "amount": "5",
                        "validator_pub_key": "Np01"
                    }),
                },
                EventResult {
                    kind: "minter/SlashEvent".into(),
                    value: json!({
                        "address": "NOAHxbad",
                        "amount": "3",
                        "coin": "NOAH",
                        "validator_pub_key": "Np01"
                    }),
                },
                EventResult { kind: "minter/UnbondEvent".into(), value: json!({}) },
            ],
        };

        let extracted = h.extractor.events(7, &events).await.unwrap();
        assert_eq!(extracted.rewards.len(), 1);
        assert_eq!(extracted.rewards[0].role, "DAO");
        assert_eq!(extracted.slashes.len(), 1);
        assert_eq!(extracted.slashes[0].validator_id, extracted.rewards[0].validator_id);
    }
}
