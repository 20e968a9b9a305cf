//! # extender-cli
//!
//! Utilities shared by the extender binaries: terminal styling, the tracing subscriber,
//! the Prometheus exporter and backtrace setup.
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod backtrace;

mod error;
pub use error::{CliError, CliResult, PrometheusError};

mod prometheus;
pub use prometheus::init_prometheus_server;

mod tracing;
pub use tracing::init_tracing_subscriber;

mod styles;
pub use styles::cli_styles;
