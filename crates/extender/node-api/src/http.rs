//! [`NodeApi`] over the node's JSON HTTP interface.

use crate::{
    AddressResult, BlockResult, CandidateResult, CoinInfoResult, EventsResult, GenesisResult,
    NodeApi, NodeApiError, NodeApiResult, NodeResponse, StatusResult,
};
use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use extender_primitives::prefixed_address;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Configuration for [`HttpNodeApi`].
#[derive(Debug, Clone)]
pub struct HttpNodeApiConfig {
    /// Primary host followed by fallback hosts, tried in order.
    pub hosts: Vec<Url>,
    /// Additional attempts per host for transport failures.
    pub retries: usize,
    /// Delay between attempts against the same host.
    pub retry_delay: Duration,
    /// Per request timeout.
    pub timeout: Duration,
}

impl Default for HttpNodeApiConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            retries: 3,
            retry_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// A [`NodeApi`] backed by [`reqwest`].
///
/// Each request is retried against a host while the failure is transport level or the
/// envelope is empty; once the retries are exhausted the next host is tried. Errors
/// reported by the node itself are returned immediately.
#[derive(Debug, Clone)]
pub struct HttpNodeApi {
    hosts: Vec<Url>,
    client: reqwest::Client,
    retries: usize,
    retry_delay: Duration,
}

impl HttpNodeApi {
    /// Builds a client from `config`.
    pub fn new(config: HttpNodeApiConfig) -> NodeApiResult<Self> {
        if config.hosts.is_empty() {
            return Err(NodeApiError::NoHosts);
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let hosts = config.hosts.into_iter().map(with_trailing_slash).collect();
        Ok(Self { hosts, client, retries: config.retries, retry_delay: config.retry_delay })
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default().with_delay(self.retry_delay).with_max_times(self.retries)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> NodeApiResult<T> {
        let mut last_error = None;
        for host in &self.hosts {
            let url = host.join(endpoint)?;
            let outcome = (|| self.fetch::<T>(url.clone(), endpoint, query))
                .retry(self.backoff())
                .when(NodeApiError::is_retryable)
                .notify(|err, after| {
                    debug!(target: "node_api", %host, endpoint, %err, ?after, "Retrying node request");
                })
                .await;
            match outcome {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() => {
                    warn!(target: "node_api", %host, endpoint, %err, "Node host unavailable, trying next");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error.unwrap_or(NodeApiError::NoHosts))
    }

    /// Sends one request and unwraps the response envelope.
    async fn fetch<T: DeserializeOwned>(
        &self,
        url: Url,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> NodeApiResult<T> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        match serde_json::from_slice::<NodeResponse<T>>(&body) {
            Ok(envelope) => into_result(endpoint, envelope),
            Err(_) if !status.is_success() => {
                Err(NodeApiError::Status { endpoint: endpoint.to_string(), status })
            }
            Err(source) => Err(NodeApiError::Decode { endpoint: endpoint.to_string(), source }),
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn into_result<T>(endpoint: &str, envelope: NodeResponse<T>) -> NodeApiResult<T> {
    match envelope {
        NodeResponse { error: Some(err), .. } => {
            Err(NodeApiError::Node { code: err.code, message: err.message })
        }
        NodeResponse { result: Some(result), .. } => Ok(result),
        NodeResponse { .. } => Err(NodeApiError::EmptyResponse(endpoint.to_string())),
    }
}

fn address_list(addresses: &[String]) -> String {
    let quoted: Vec<String> =
        addresses.iter().map(|a| format!("\"{}\"", prefixed_address(a))).collect();
    format!("[{}]", quoted.join(","))
}

#[async_trait]
impl NodeApi for HttpNodeApi {
    async fn status(&self) -> NodeApiResult<StatusResult> {
        self.get("status", &[]).await
    }

    async fn block(&self, height: u64) -> NodeApiResult<BlockResult> {
        self.get("block", &[("height", height.to_string())]).await
    }

    async fn block_events(&self, height: u64) -> NodeApiResult<EventsResult> {
        self.get("events", &[("height", height.to_string())]).await
    }

    async fn coin_info(&self, symbol: &str) -> NodeApiResult<CoinInfoResult> {
        self.get("coin_info", &[("symbol", symbol.to_string())]).await
    }

    async fn candidates(
        &self,
        height: u64,
        include_stakes: bool,
    ) -> NodeApiResult<Vec<CandidateResult>> {
        self.get(
            "candidates",
            &[("height", height.to_string()), ("include_stakes", include_stakes.to_string())],
        )
        .await
    }

    async fn addresses(
        &self,
        addresses: &[String],
        height: u64,
    ) -> NodeApiResult<Vec<AddressResult>> {
        let mut query = vec![("addresses", address_list(addresses))];
        if height > 0 {
            query.push(("height", height.to_string()));
        }
        self.get("addresses", &query).await
    }

    async fn genesis(&self) -> NodeApiResult<GenesisResult> {
        self.get("genesis", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeErrorBody;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Serves `body` to every request and counts the requests.
    async fn serve(body: &'static str) -> (Url, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = vec![0u8; 4096];
                let _ = socket.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (url, hits)
    }

    fn api(hosts: Vec<Url>, retries: usize) -> HttpNodeApi {
        HttpNodeApi::new(HttpNodeApiConfig {
            hosts,
            retries,
            retry_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn empty_envelope_falls_back_to_next_host() {
        let (empty, empty_hits) = serve("{}").await;
        let (healthy, healthy_hits) = serve(r#"{"result":7}"#).await;

        let value: u64 = api(vec![empty, healthy], 2).get("status", &[]).await.unwrap();

        assert_eq!(value, 7);
        assert_eq!(empty_hits.load(Ordering::SeqCst), 3);
        assert_eq!(healthy_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_envelope_is_retried_then_reported() {
        let (empty, hits) = serve("{}").await;

        let err = api(vec![empty], 1).get::<u64>("status", &[]).await.unwrap_err();

        assert!(matches!(err, NodeApiError::EmptyResponse(ref endpoint) if endpoint == "status"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn node_error_is_not_retried() {
        let (host, hits) = serve(r#"{"error":{"code":404,"message":"Block not found"}}"#).await;
        let (fallback, fallback_hits) = serve(r#"{"result":7}"#).await;

        let err = api(vec![host, fallback], 3).get::<u64>("block", &[]).await.unwrap_err();

        assert!(err.is_node_error());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejects_empty_host_list() {
        let err = HttpNodeApi::new(HttpNodeApiConfig::default()).unwrap_err();
        assert!(matches!(err, NodeApiError::NoHosts));
    }

    #[test]
    fn hosts_keep_their_base_path() {
        let host = with_trailing_slash(Url::parse("http://node:8841/api/v1").unwrap());
        assert_eq!(host.join("block").unwrap().as_str(), "http://node:8841/api/v1/block");
    }

    #[test]
    fn node_error_wins_over_result() {
        let envelope: NodeResponse<u64> = NodeResponse {
            result: Some(1),
            error: Some(NodeErrorBody { code: 404, message: "Block not found".into(), data: None }),
        };
        let err = into_result("block", envelope).unwrap_err();
        assert!(err.is_node_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn empty_envelope_is_a_retryable_error() {
        let envelope: NodeResponse<u64> = NodeResponse { result: None, error: None };
        let err = into_result("status", envelope).unwrap_err();
        assert!(matches!(err, NodeApiError::EmptyResponse(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn address_list_reapplies_prefix() {
        let list = address_list(&["aa".to_string(), "NOAHxbb".to_string()]);
        assert_eq!(list, r#"["NOAHxaa","NOAHxbb"]"#);
    }
}
