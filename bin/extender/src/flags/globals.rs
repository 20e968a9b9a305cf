//! Global arguments for the CLI.

use super::{DbArgs, LedgerArgs, LogArgs, MetricsArgs, NodeArgs, PipelineArgs};
use clap::Parser;
use extender_core::ExtenderConfig;

/// Global arguments for the CLI.
#[derive(Parser, Clone, Debug)]
pub struct GlobalArgs {
    /// Logging arguments.
    #[command(flatten)]
    pub log: LogArgs,
    /// Prometheus arguments.
    #[command(flatten)]
    pub metrics: MetricsArgs,
    /// Node API arguments.
    #[command(flatten)]
    pub node: NodeArgs,
    /// Database arguments.
    #[command(flatten)]
    pub db: DbArgs,
    /// Deferred ledger arguments.
    #[command(flatten)]
    pub ledger: LedgerArgs,
    /// Pipeline tuning arguments.
    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

impl GlobalArgs {
    /// Builds the pipeline configuration.
    pub fn extender_config(&self) -> ExtenderConfig {
        let mut config = self.pipeline.apply(ExtenderConfig::default());
        config.ledger_sweep_interval = self.ledger.sweep_interval();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_match_pipeline_defaults() {
        let args = GlobalArgs::try_parse_from(["extender"]).unwrap();
        assert_eq!(args.extender_config(), ExtenderConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let args = GlobalArgs::try_parse_from([
            "extender",
            "--base-coin",
            "MNT",
            "--tx-chunk-size",
            "10",
            "--workers.transactions",
            "8",
            "--rewards.aggregate-interval",
            "day",
            "--ledger.sweep-interval",
            "1",
        ])
        .unwrap();
        let config = args.extender_config();

        assert_eq!(config.base_coin, "MNT");
        assert_eq!(config.tx_chunk_size, 10);
        assert_eq!(config.workers.transactions, 8);
        assert_eq!(config.reward_aggregate_interval, "day");
        assert_eq!(config.ledger_sweep_interval, Duration::from_secs(1));
    }
}
