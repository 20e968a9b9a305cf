//! The ingestion loop.

use crate::{
    ChasingMonitor, ExtenderActor, ExtenderConfig, ExtenderError, Extractor, FatalSignal,
    LedgerSweeper, Metrics, Pipeline, writer::priced_coin,
};
use async_trait::async_trait;
use extender_node_api::{BlockResult, EventsResult, NodeApi};
use extender_primitives::Block;
use extender_storage::{DeferredLedger, Store};
use std::{future::Future, sync::Arc, time::Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Spawns a background stage whose failure is fatal.
fn spawn_stage<F, E>(tasks: &mut JoinSet<()>, fatal: &FatalSignal, stage: &'static str, fut: F)
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let fatal = fatal.clone();
    tasks.spawn(async move {
        if let Err(err) = fut.await {
            error!(target: "extender", stage, %err, "Background stage failed");
            fatal.trip(stage);
        }
    });
}

/// Drives the pipeline height by height.
///
/// Each height is fetched, its addresses and block record are written before the loop
/// moves on, and everything else is handed to the batch writers. The loop never waits for
/// the writers to commit, so a later height can be visible in the store before an earlier
/// height's transactions are.
#[derive(Debug)]
pub struct Extender<N, S> {
    node: Arc<N>,
    store: Arc<S>,
    ledger: Arc<DeferredLedger>,
    config: ExtenderConfig,
    fatal: FatalSignal,
}

impl<N, S> Extender<N, S>
where
    N: NodeApi + 'static,
    S: Store,
{
    /// Creates a new [`Extender`].
    pub const fn new(
        node: Arc<N>,
        store: Arc<S>,
        ledger: Arc<DeferredLedger>,
        config: ExtenderConfig,
        fatal: FatalSignal,
    ) -> Self {
        Self { node, store, ledger, config, fatal }
    }

    /// Sleeps for the block retry delay. Returns `false` if shutdown was requested.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.fatal.cancelled() => false,
            _ = tokio::time::sleep(self.config.block_retry_delay) => true,
        }
    }

    /// Makes sure the base coin exists so gas paid in it resolves.
    async fn ensure_base_coin(&self) -> Result<(), ExtenderError> {
        match self.store.find_coin_id(&self.config.base_coin).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => {
                let symbol = self.config.base_coin.clone();
                let coin = priced_coin(symbol.clone(), symbol, 100, "0".into(), "0".into())
                    .map_err(crate::ExtractionError::from)?;
                Ok(self.store.save_coins(&[coin]).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fetches the block at `height`, waiting while the node has not produced it.
    ///
    /// Returns `None` if shutdown was requested while waiting.
    async fn fetch_block(&self, height: u64) -> Result<Option<BlockResult>, ExtenderError> {
        loop {
            match self.node.block(height).await {
                Ok(block) => return Ok(Some(block)),
                Err(err) if err.is_node_error() => {
                    debug!(target: "extender", height, %err, "Block not produced yet");
                    if !self.pause().await {
                        return Ok(None);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn fetch_events(&self, height: u64) -> EventsResult {
        match self.node.block_events(height).await {
            Ok(events) => events,
            Err(err) => {
                warn!(target: "extender", height, %err, "Failed to fetch block events");
                EventsResult::default()
            }
        }
    }

    /// Handles one fetched height.
    async fn process(
        &self,
        raw: BlockResult,
        events: EventsResult,
        previous: Option<&Block>,
        extractor: &Extractor<S>,
        pipeline: &Pipeline,
        tasks: &mut JoinSet<()>,
    ) -> Result<Block, ExtenderError> {
        let height = raw.height;

        pipeline.addresses.enqueue_and_wait(Extractor::<S>::addresses(&raw, &events)).await?;

        let validators = extractor.block_validators(&raw).await?;
        let block = extractor.block(&raw, previous).await?;
        self.store.save_block(&block).await?;
        if height > 1 {
            self.store.link_block_validators(&validators).await?;
        }

        // Coins go first so transfers and gas in a coin created at this height resolve.
        let coins = extractor.coins(&raw).await?;
        self.store.save_coins(&coins).await?;

        if raw.num_txs > 0 && !validators.is_empty() {
            for chunk in raw.transactions.chunks(self.config.tx_chunk_size.max(1)) {
                let extracted = extractor.transactions(height, raw.time, chunk).await?;
                pipeline.transactions.enqueue(extracted.valid).await?;
                pipeline.invalid_transactions.enqueue(extracted.invalid).await?;
            }
        }

        if height % 12 == 0 {
            pipeline.stakes.enqueue(vec![height]).await?;
        } else if height > 1 {
            pipeline.validators.enqueue(vec![height]).await?;
        }

        let every = self.config.reward_aggregate_every_blocks;
        if every > 0 && height % every == 0 {
            let store = self.store.clone();
            let interval = self.config.reward_aggregate_interval.clone();
            spawn_stage(tasks, &self.fatal, "reward_aggregation", async move {
                let rows = store.aggregate_rewards(&interval, height).await?;
                debug!(target: "extender", height, rows, "Aggregated rewards");
                Ok::<_, ExtenderError>(())
            });
        }

        if !events.events.is_empty() {
            let extractor = extractor.clone();
            let rewards = pipeline.rewards.clone();
            let slashes = pipeline.slashes.clone();
            let chunk_size = self.config.events_chunk_size.max(1);
            spawn_stage(tasks, &self.fatal, "events", async move {
                let extracted = extractor.events(height, &events).await?;
                for chunk in extracted.rewards.chunks(chunk_size) {
                    rewards.enqueue(chunk.to_vec()).await?;
                }
                for chunk in extracted.slashes.chunks(chunk_size) {
                    slashes.enqueue(chunk.to_vec()).await?;
                }
                Ok::<_, ExtenderError>(())
            });
        }

        Ok(block)
    }

    /// Runs heights from `height` onwards until shutdown.
    async fn ingest(
        &self,
        mut height: u64,
        mut previous: Option<Block>,
        pipeline: &Pipeline,
        tasks: &mut JoinSet<()>,
    ) -> Result<(), ExtenderError> {
        let extractor = Extractor::new(self.store.clone(), self.ledger.clone());
        let mut monitor = ChasingMonitor::new(self.node.clone(), self.config.chasing_threshold);

        while !self.fatal.is_cancelled() {
            while let Some(joined) = tasks.try_join_next() {
                if let Err(err) = joined {
                    error!(target: "extender", %err, "Background task panicked");
                    self.fatal.trip("task");
                }
            }

            let started = Instant::now();
            let mode = monitor.observe(height).await?;
            metrics::gauge!(Metrics::CURRENT_HEIGHT).set(height as f64);

            let Some(raw) = self.fetch_block(height).await? else { break };
            let events = self.fetch_events(height).await;
            let block =
                self.process(raw, events, previous.as_ref(), &extractor, pipeline, tasks).await?;

            metrics::counter!(Metrics::BLOCKS_PROCESSED).increment(1);
            info!(
                target: "extender",
                height,
                txs = block.num_txs,
                %mode,
                elapsed = ?started.elapsed(),
                "Processed block"
            );
            previous = Some(block);
            height += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl<N, S> ExtenderActor for Extender<N, S>
where
    N: NodeApi + 'static,
    S: Store,
{
    type Error = ExtenderError;

    async fn start(self) -> Result<(), Self::Error> {
        let status = self.node.status().await?;
        self.store.delete_last_block_data().await?;
        self.ensure_base_coin().await?;

        let mut tasks = JoinSet::new();
        let pipeline =
            Pipeline::spawn(&self.node, &self.store, &self.config, &self.fatal, &mut tasks);
        let sweeper = LedgerSweeper::new(
            self.store.clone(),
            self.ledger.clone(),
            self.config.ledger_sweep_interval,
            self.fatal.clone(),
        );
        spawn_stage(&mut tasks, &self.fatal, "ledger_sweeper", sweeper.start());

        let previous = self.store.last_block().await?;
        let height = previous.as_ref().map_or(1, |block| block.height + 1);
        info!(
            target: "extender",
            height,
            node_head = status.latest_block_height,
            "Starting ingestion"
        );

        let result = self.ingest(height, previous, &pipeline, &mut tasks).await;
        if let Err(err) = &result {
            error!(target: "extender", %err, "Ingestion loop failed");
            self.fatal.trip("extender");
        }

        drop(pipeline);
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(target: "extender", %err, "Background task panicked");
                self.fatal.trip("task");
            }
        }
        info!(target: "extender", "Stopped ingestion");

        result?;
        if self.fatal.is_tripped() {
            return Err(ExtenderError::Fatal);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use extender_node_api::{
        AddressResult, BlockValidatorResult, CandidateResult, CoinInfoResult, GenesisResult,
        NodeApiError, NodeApiResult, StatusResult, TransactionResult,
    };
    use extender_storage::MemoryStore;
    use serde_json::json;
    use std::{collections::HashMap, sync::Mutex, time::Duration};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    /// Serves a fixed chain and requests shutdown once asked for a height past its head.
    #[derive(Debug)]
    struct ScriptedNode {
        blocks: HashMap<u64, BlockResult>,
        misses: Mutex<HashMap<u64, u32>>,
        calls: Mutex<HashMap<u64, u32>>,
        shutdown: CancellationToken,
    }

    impl ScriptedNode {
        fn head(&self) -> u64 {
            self.blocks.keys().copied().max().unwrap_or_default()
        }

        fn calls(&self, height: u64) -> u32 {
            self.calls.lock().unwrap().get(&height).copied().unwrap_or_default()
        }

        fn not_produced() -> NodeApiError {
            NodeApiError::Node { code: 404, message: "block not produced yet".into() }
        }
    }

    #[async_trait]
    impl NodeApi for ScriptedNode {
        async fn status(&self) -> NodeApiResult<StatusResult> {
            Ok(StatusResult { latest_block_height: self.head() })
        }

        async fn block(&self, height: u64) -> NodeApiResult<BlockResult> {
            *self.calls.lock().unwrap().entry(height).or_default() += 1;
            if let Some(left) = self.misses.lock().unwrap().get_mut(&height) {
                if *left > 0 {
                    *left -= 1;
                    return Err(Self::not_produced());
                }
            }
            match self.blocks.get(&height) {
                Some(block) => Ok(block.clone()),
                None => {
                    self.shutdown.cancel();
                    Err(Self::not_produced())
                }
            }
        }

        async fn block_events(&self, _height: u64) -> NodeApiResult<EventsResult> {
            Ok(EventsResult::default())
        }

        async fn coin_info(&self, symbol: &str) -> NodeApiResult<CoinInfoResult> {
            Ok(CoinInfoResult {
                name: symbol.to_string(),
                symbol: symbol.to_string(),
                volume: "700".into(),
                crr: 100,
                reserve_balance: "11000".into(),
            })
        }

        async fn candidates(
            &self,
            _height: u64,
            _include_stakes: bool,
        ) -> NodeApiResult<Vec<CandidateResult>> {
            Ok(Vec::new())
        }

        async fn addresses(
            &self,
            addresses: &[String],
            _height: u64,
        ) -> NodeApiResult<Vec<AddressResult>> {
            Ok(addresses
                .iter()
                .map(|address| AddressResult {
                    address: format!("NOAHx{address}"),
                    balance: [("NOAH".to_string(), "10".to_string())].into(),
                })
                .collect())
        }

        async fn genesis(&self) -> NodeApiResult<GenesisResult> {
            Err(Self::not_produced())
        }
    }

    fn tx(hash: &str, tx_type: u8, data: serde_json::Value) -> TransactionResult {
        TransactionResult {
            hash: format!("Nt{hash}"),
            raw_tx: "f8a0".into(),
            from: "NOAHxalice".into(),
            nonce: 1,
            gas_price: 1,
            gas: 10,
            gas_coin: "NOAH".into(),
            tx_type,
            data,
            payload: String::new(),
            service_data: String::new(),
            tags: None,
            code: None,
            log: None,
        }
    }

    fn block(height: u64, transactions: Vec<TransactionResult>) -> BlockResult {
        BlockResult {
            hash: format!("Mt{height:04x}"),
            height,
            time: Utc::now(),
            num_txs: transactions.len() as u64,
            total_txs: height,
            transactions,
            block_reward: "100".into(),
            size: 256,
            proposer: "Np01".into(),
            validators: vec![BlockValidatorResult { pub_key: "Np01".into(), signed: true }],
        }
    }

    fn chain(shutdown: CancellationToken) -> ScriptedNode {
        let create_coin = tx(
            "c0",
            5,
            json!({
                "name": "Test",
                "symbol": "TEST",
                "initial_amount": "600",
                "initial_reserve": "10000",
                "constant_reserve_ratio": "100"
            }),
        );
        let send = tx("s0", 1, json!({ "coin": "TEST", "to": "NOAHxbob", "value": "1" }));
        ScriptedNode {
            blocks: HashMap::from([
                (1, block(1, Vec::new())),
                (2, block(2, vec![create_coin])),
                (3, block(3, vec![send])),
            ]),
            misses: Mutex::new(HashMap::from([(3, 1)])),
            calls: Mutex::default(),
            shutdown,
        }
    }

    fn config() -> ExtenderConfig {
        ExtenderConfig {
            block_retry_delay: Duration::from_millis(10),
            ledger_sweep_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ingests_chain_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(DeferredLedger::open(dir.path()).unwrap());
        let store = Arc::new(MemoryStore::new());
        let shutdown = CancellationToken::new();
        let node = Arc::new(chain(shutdown.clone()));
        let fatal = FatalSignal::new(shutdown);

        let extender =
            Extender::new(node.clone(), store.clone(), ledger.clone(), config(), fatal.clone());
        extender.start().await.unwrap();

        assert!(!fatal.is_tripped());
        assert_eq!(store.saved_heights(), vec![1, 2, 3]);
        assert_eq!(node.calls(3), 2);
        assert_eq!(store.transactions().len(), 2);
        assert_eq!(store.outputs().len(), 1);
        assert!(store.address_id("bob").is_some());
        assert!(!store.balances().is_empty());

        // The coin's creating transaction may still be pending if the sweeper stopped first.
        let sweeper =
            LedgerSweeper::new(store.clone(), ledger.clone(), config().ledger_sweep_interval, fatal);
        let report = sweeper.sweep().await.unwrap();
        assert_eq!(report.corrupt, 0);
        assert_eq!(report.pending, 0);
        assert!(ledger.is_empty().unwrap());

        let coin = store.coin("TEST").unwrap();
        assert_eq!(coin.creation_address_id, store.address_id("alice"));
        assert!(coin.creation_transaction_id.is_some());
        assert_eq!(coin.volume, "700");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn resumes_after_last_saved_block() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(DeferredLedger::open(dir.path()).unwrap());
        let store = Arc::new(MemoryStore::new());

        let shutdown = CancellationToken::new();
        let node = Arc::new(chain(shutdown.clone()));
        Extender::new(node, store.clone(), ledger.clone(), config(), FatalSignal::new(shutdown))
            .start()
            .await
            .unwrap();

        // A restart discards the newest height and ingests it again.
        let shutdown = CancellationToken::new();
        let node = Arc::new(chain(shutdown.clone()));
        Extender::new(node.clone(), store.clone(), ledger, config(), FatalSignal::new(shutdown))
            .start()
            .await
            .unwrap();

        assert_eq!(node.calls(1), 0);
        assert_eq!(node.calls(2), 0);
        assert_eq!(node.calls(3), 2);
        assert_eq!(store.saved_heights(), vec![1, 2, 3]);
    }
}
