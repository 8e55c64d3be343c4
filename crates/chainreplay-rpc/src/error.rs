//! Transport-level error types.

use chainreplay_core::IndexerError;
use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur while talking to a node or the admin endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failure, timeout, or non-success HTTP status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The response arrived but does not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Missing or invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl TransportError {
    /// Returns `true` if the failure is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::MalformedResponse(_) | Self::Deserialization(_)
        )
    }
}

impl From<TransportError> for IndexerError {
    fn from(e: TransportError) -> Self {
        if e.is_retryable() {
            IndexerError::TransientIo(e.to_string())
        } else {
            IndexerError::Other(e.to_string())
        }
    }
}
