//! The `RpcTransport` trait: one JSON-RPC request in, one response out.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// A single-attempt JSON-RPC transport.
///
/// Retrying is the caller's job (see [`RetryPolicy`](crate::policy::RetryPolicy)).
/// Object-safe; can be stored as `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Endpoint identifier for logs.
    fn url(&self) -> &str;
}
