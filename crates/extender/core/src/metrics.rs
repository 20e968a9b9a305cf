//! Metrics for the extender pipeline.

/// Container for the pipeline's metric names.
#[derive(Debug, Clone)]
pub struct Metrics;

impl Metrics {
    /// Identifier for the counter of fully handled heights.
    pub const BLOCKS_PROCESSED: &'static str = "extender_blocks_processed_total";
    /// Identifier for the counter of inserted transactions.
    pub const TRANSACTIONS_SAVED: &'static str = "extender_transactions_saved_total";
    /// Identifier for the counter of inserted invalid transactions.
    pub const INVALID_TRANSACTIONS: &'static str = "extender_invalid_transactions_total";
    /// Identifier for the counter of deferred links written to the ledger.
    pub const LEDGER_RECORDED: &'static str = "extender_ledger_links_recorded_total";
    /// Identifier for the counter of deferred links resolved by the sweeper.
    pub const LEDGER_RESOLVED: &'static str = "extender_ledger_links_resolved_total";
    /// Identifier for the counter of corrupt ledger keys deleted by the sweeper.
    pub const LEDGER_CORRUPT: &'static str = "extender_ledger_links_corrupt_total";
    /// Identifier for the counter of failed writer flushes, labelled by writer.
    pub const WRITER_FLUSH_FAILURES: &'static str = "extender_writer_flush_failures_total";
    /// Identifier for the gauge of the height being processed.
    pub const CURRENT_HEIGHT: &'static str = "extender_current_height";
    /// Identifier for the gauge of the last known node head.
    pub const NODE_HEAD: &'static str = "extender_node_head";
    /// Identifier for the gauge that is `1` while chasing.
    pub const CHASING: &'static str = "extender_chasing_mode";

    /// Initializes metrics for the pipeline.
    ///
    /// This does two things:
    /// * Describes various metrics.
    /// * Initializes metrics to 0 so they can be queried immediately.
    pub fn init() {
        Self::describe();
        Self::zero();
    }

    fn describe() {
        metrics::describe_counter!(
            Self::BLOCKS_PROCESSED,
            metrics::Unit::Count,
            "Heights fully handled by the ingestion loop"
        );
        metrics::describe_counter!(
            Self::TRANSACTIONS_SAVED,
            metrics::Unit::Count,
            "Transactions inserted by the transaction writer"
        );
        metrics::describe_counter!(
            Self::INVALID_TRANSACTIONS,
            metrics::Unit::Count,
            "Rejected transactions inserted by the invalid transaction writer"
        );
        metrics::describe_counter!(
            Self::LEDGER_RECORDED,
            metrics::Unit::Count,
            "Deferred coin links written to the ledger"
        );
        metrics::describe_counter!(
            Self::LEDGER_RESOLVED,
            metrics::Unit::Count,
            "Deferred coin links resolved and deleted by the sweeper"
        );
        metrics::describe_counter!(
            Self::LEDGER_CORRUPT,
            metrics::Unit::Count,
            "Corrupt ledger keys deleted by the sweeper"
        );
        metrics::describe_counter!(
            Self::WRITER_FLUSH_FAILURES,
            metrics::Unit::Count,
            "Batches a writer failed to flush"
        );
        metrics::describe_gauge!(Self::CURRENT_HEIGHT, "Height being processed");
        metrics::describe_gauge!(Self::NODE_HEAD, "Last known node head height");
        metrics::describe_gauge!(Self::CHASING, "1 while the pipeline lags the node head");
    }

    fn zero() {
        metrics::counter!(Self::BLOCKS_PROCESSED).absolute(0);
        metrics::counter!(Self::TRANSACTIONS_SAVED).absolute(0);
        metrics::counter!(Self::INVALID_TRANSACTIONS).absolute(0);
        metrics::counter!(Self::LEDGER_RECORDED).absolute(0);
        metrics::counter!(Self::LEDGER_RESOLVED).absolute(0);
        metrics::counter!(Self::LEDGER_CORRUPT).absolute(0);
        metrics::gauge!(Self::CURRENT_HEIGHT).set(0.0);
        metrics::gauge!(Self::NODE_HEAD).set(0.0);
        metrics::gauge!(Self::CHASING).set(0.0);
    }
}
