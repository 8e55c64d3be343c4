//! HTTP JSON-RPC transport backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-attempt timeout.
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("chainreplay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Single-attempt HTTP transport; pair with `RpcBlockProvider` for retries.
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| TransportError::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, HttpClientConfig::default())
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        tracing::trace!(method = %req.method, id = req.id, url = %self.url, "rpc request");
        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {}: {body}", status.as_u16())));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| TransportError::MalformedResponse(e.to_string()))
    }

    fn url(&self) -> &str {
        &self.url
    }
}
