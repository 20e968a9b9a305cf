//! Error types for the node API client.

use thiserror::Error;

/// Errors returned by a [`NodeApi`](crate::NodeApi).
#[derive(Debug, Error)]
pub enum NodeApiError {
    /// The node answered with an error object, e.g. for a block that is not produced yet.
    #[error("node error {code}: {message}")]
    Node {
        /// Node specific error code.
        code: i64,
        /// Message reported by the node.
        message: String,
    },
    /// The request could not be sent or the response could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The response was neither a result nor an error.
    #[error("empty response from {0}")]
    EmptyResponse(String),
    /// The response body did not match the expected shape.
    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        /// Endpoint that was called.
        endpoint: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// An HTTP error status without a decodable body.
    #[error("unexpected status {status} from {endpoint}")]
    Status {
        /// Endpoint that was called.
        endpoint: String,
        /// HTTP status.
        status: reqwest::StatusCode,
    },
    /// A host url could not be joined with an endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// No host was configured.
    #[error("no node hosts configured")]
    NoHosts,
}

impl NodeApiError {
    /// Whether the node itself rejected the request.
    ///
    /// The ingestion loop treats this as "not available yet" and retries the same height.
    pub const fn is_node_error(&self) -> bool {
        matches!(self, Self::Node { .. })
    }

    /// Whether the request may succeed when repeated against the same host.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. } | Self::EmptyResponse(_))
    }
}

/// Result alias for node API calls.
pub type NodeApiResult<T> = Result<T, NodeApiError>;
