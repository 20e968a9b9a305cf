//! # extender-core
//!
//! The extender pipeline: the ingestion loop, the extraction stage that turns node
//! responses into records, and the pools of batch writers that commit them.
//!
//! - [`Extender`] walks the chain height by height and feeds a [`Pipeline`] of
//!   [`BatchWriter`]s.
//! - [`ChasingMonitor`] tracks whether the pipeline lags the node head.
//! - [`LedgerSweeper`] resolves coin links parked in the deferred ledger.
//! - [`GenesisImporter`] and [`update_prices`] are one-shot maintenance operations.
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod actor;
pub use actor::ExtenderActor;

mod config;
pub use config::{ExtenderConfig, WorkerCounts};

mod error;
pub use error::{ExtenderError, ExtractionError, WriterError};

mod fatal;
pub use fatal::FatalSignal;

mod metrics;
pub use metrics::Metrics;

pub mod writer;
pub use writer::{BatchWriter, Flush};

mod chasing;
pub use chasing::{ChasingMonitor, SyncMode};

mod sweeper;
pub use sweeper::{LedgerSweeper, SweepReport};

mod extract;
pub use extract::{ExtractedEvents, ExtractedTransactions, Extractor};

mod pipeline;
pub use pipeline::Pipeline;

mod extender;
pub use extender::Extender;

mod prices;
pub use prices::update_prices;

mod genesis;
pub use genesis::{GenesisImporter, GenesisReport};
