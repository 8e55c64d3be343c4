//! Block provider: fetches block headers over JSON-RPC with bounded retry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainreplay_core::{BlockIdentifier, IndexerError};

use crate::error::TransportError;
use crate::policy::{RetryConfig, RetryPolicy};
use crate::request::JsonRpcRequest;
use crate::transport::RpcTransport;

/// The header fields ingestion needs from a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderBlock {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
}

/// Source of chain blocks.
#[async_trait]
pub trait BlockProvider: Send + Sync {
    /// Fails with `IndexerError::NotFound` when the node does not know `hash`.
    async fn get_block_by_hash(&self, hash: &str) -> Result<ProviderBlock, IndexerError>;

    /// `None` when the block does not exist yet.
    async fn get_block_by_number(&self, number: u64) -> Result<Option<ProviderBlock>, IndexerError>;

    async fn get_latest_block(&self) -> Result<ProviderBlock, IndexerError>;
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

pub fn block_identifier_from_block(block: &ProviderBlock) -> BlockIdentifier {
    BlockIdentifier::new(block.hash.clone(), block.number)
}

/// Identifier of `block`'s parent; `None` for the genesis block.
pub fn block_identifier_from_parent_block(block: &ProviderBlock) -> Option<BlockIdentifier> {
    let number = block.number.checked_sub(1)?;
    Some(BlockIdentifier::new(block.parent_hash.clone(), number))
}

/// Check that `parent` is the parent of `child`.
pub fn verify_parent(child: &ProviderBlock, parent: &BlockIdentifier) -> Result<(), IndexerError> {
    parent.ensure_parent_of(child.number, &child.parent_hash)
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_quantity(raw: &str) -> Result<u64, TransportError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| TransportError::MalformedResponse(format!("quantity '{raw}' lacks 0x")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| TransportError::MalformedResponse(format!("quantity '{raw}': {e}")))
}

pub fn to_hex_quantity(n: u64) -> String {
    format!("{n:#x}")
}

/// Decode a block object from an `eth_getBlockBy*` result.
pub fn block_from_json(v: &Value) -> Result<ProviderBlock, TransportError> {
    let field = |name: &str| {
        v.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::MalformedResponse(format!("block missing '{name}'")))
    };
    Ok(ProviderBlock {
        number: parse_hex_quantity(field("number")?)?,
        hash: field("hash")?.to_string(),
        parent_hash: field("parentHash")?.to_string(),
    })
}

// ─── RpcBlockProvider ─────────────────────────────────────────────────────────

/// [`BlockProvider`] over any [`RpcTransport`].
///
/// Every call runs under the retry policy; a `null` result is an answer, not
/// a failure, and is never retried.
pub struct RpcBlockProvider {
    transport: Arc<dyn RpcTransport>,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl RpcBlockProvider {
    pub fn new(transport: Arc<dyn RpcTransport>, retry: RetryConfig) -> Self {
        Self {
            transport,
            retry: RetryPolicy::new(retry),
            next_id: AtomicU64::new(1),
        }
    }

    /// Issue `method` and decode a nullable block result.
    async fn fetch_block(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Option<ProviderBlock>, IndexerError> {
        let block = self
            .retry
            .execute(method, || {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let req = JsonRpcRequest::new(id, method, params.clone());
                async move {
                    let result = self
                        .transport
                        .send(req)
                        .await?
                        .into_result()
                        .map_err(TransportError::Rpc)?;
                    match result {
                        Value::Null => Ok(None),
                        raw => block_from_json(&raw).map(Some),
                    }
                }
            })
            .await?;
        tracing::debug!(
            method,
            url = self.transport.url(),
            number = block.as_ref().map(|b| b.number),
            "fetched block"
        );
        Ok(block)
    }
}

#[async_trait]
impl BlockProvider for RpcBlockProvider {
    async fn get_block_by_hash(&self, hash: &str) -> Result<ProviderBlock, IndexerError> {
        self.fetch_block("eth_getBlockByHash", vec![json!(hash), json!(false)])
            .await?
            .ok_or_else(|| IndexerError::NotFound(format!("unknown block hash {hash}")))
    }

    async fn get_block_by_number(&self, number: u64) -> Result<Option<ProviderBlock>, IndexerError> {
        self.fetch_block(
            "eth_getBlockByNumber",
            vec![json!(to_hex_quantity(number)), json!(false)],
        )
        .await
    }

    async fn get_latest_block(&self) -> Result<ProviderBlock, IndexerError> {
        self.fetch_block("eth_getBlockByNumber", vec![json!("latest"), json!(false)])
            .await?
            .ok_or_else(|| IndexerError::TransientIo("node returned no latest block".into()))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
