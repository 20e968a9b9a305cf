//! CLI flags.

mod globals;
pub use globals::GlobalArgs;

mod log;
pub use log::LogArgs;

mod metrics;
pub use metrics::MetricsArgs;

mod node;
pub use node::NodeArgs;

mod db;
pub use db::DbArgs;

mod pipeline;
pub use pipeline::{LedgerArgs, PipelineArgs, RewardArgs, WorkerArgs};
