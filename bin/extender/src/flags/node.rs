//! Node API arguments.

use clap::Parser;
use extender_node_api::HttpNodeApiConfig;
use std::time::Duration;
use url::Url;

/// Node API arguments.
#[derive(Parser, Clone, Debug, PartialEq, Eq)]
pub struct NodeArgs {
    /// Base URL of the node API.
    #[arg(long = "node.api", env = "NODE_API", default_value = "http://localhost:8841/")]
    pub api: Url,
    /// Fallback node API URLs, tried in order when the primary fails.
    #[arg(long = "node.fallback", env = "NODE_FALLBACK", value_delimiter = ',')]
    pub fallback: Vec<Url>,
    /// Attempts per host for transport failures.
    #[arg(long = "node.retries", env = "NODE_RETRIES", default_value_t = 3)]
    pub retries: usize,
    /// Per request timeout, in seconds.
    #[arg(long = "node.timeout", env = "NODE_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,
}

impl NodeArgs {
    /// Builds the client configuration.
    pub fn config(&self) -> HttpNodeApiConfig {
        HttpNodeApiConfig {
            hosts: std::iter::once(&self.api).chain(&self.fallback).cloned().collect(),
            retries: self.retries,
            timeout: Duration::from_secs(self.timeout),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_host_comes_first() {
        let args = NodeArgs::try_parse_from([
            "extender",
            "--node.api",
            "http://primary:8841",
            "--node.fallback",
            "http://a:8841,http://b:8841",
        ])
        .unwrap();
        let config = args.config();
        let hosts: Vec<_> = config.hosts.iter().filter_map(Url::host_str).collect();
        assert_eq!(hosts, ["primary", "a", "b"]);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
