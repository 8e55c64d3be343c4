//! chainreplay-rpc: chain access for the replay pipeline.
//!
//! ```text
//! RpcBlockProvider ──► RetryPolicy ──► RpcTransport (HttpTransport)
//! AdminClient      ──► RetryPolicy ──► POST admin endpoint
//! ```

pub mod admin;
pub mod error;
pub mod http;
pub mod policy;
pub mod provider;
pub mod request;
pub mod transport;

pub use admin::{AdminClient, AdminConfig, AdminMessage, StoredEntry};
pub use error::TransportError;
pub use http::{HttpClientConfig, HttpTransport};
pub use policy::{RetryConfig, RetryPolicy};
pub use provider::{
    block_identifier_from_block, block_identifier_from_parent_block, verify_parent,
    BlockProvider, ProviderBlock, RpcBlockProvider,
};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use transport::RpcTransport;
