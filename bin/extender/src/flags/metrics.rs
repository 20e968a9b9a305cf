//! Prometheus arguments.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr};

/// Prometheus exporter arguments.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct MetricsArgs {
    /// Serve Prometheus metrics.
    #[arg(long = "metrics.enabled", env = "METRICS_ENABLED")]
    pub enabled: bool,
    /// Address the metrics server listens on.
    #[arg(
        long = "metrics.addr",
        env = "METRICS_ADDR",
        default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    )]
    pub addr: IpAddr,
    /// Port the metrics server listens on.
    #[arg(long = "metrics.port", env = "METRICS_PORT", default_value_t = 9090)]
    pub port: u16,
}
