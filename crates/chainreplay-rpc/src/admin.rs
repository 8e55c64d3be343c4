//! Out-of-band admin channel: one JSON command per POST.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;
use crate::policy::{RetryConfig, RetryPolicy};

pub const ADMIN_API_KEY_HEADER: &str = "x-admin-api-key";
pub const INSTANCE_NAME_HEADER: &str = "x-durable-object-instance-name";

/// A raw storage entry, as listed by `GET_KEYS` and written by `WRITE_BATCH`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub key: String,
    pub value: Value,
}

/// Control commands understood by a running indexer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminMessage {
    /// Drop all state and restart ingestion from scratch.
    Reset,
    /// List storage keys, resuming after `cursor`.
    GetKeys {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor: Option<String>,
    },
    Start,
    Stop,
    /// Process one block, then pause.
    Step,
    /// Write raw entries; each inner batch is applied as a unit.
    WriteBatch { items: Vec<Vec<StoredEntry>> },
    ClearStorage,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub endpoint: String,
    pub api_key: String,
    pub instance_name: String,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl AdminConfig {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            instance_name: instance_name.into(),
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Read `ADMIN_ENDPOINT`, `ADMIN_API_KEY` and `DURABLE_OBJECT_INSTANCE_NAME`.
    pub fn from_env() -> Result<Self, TransportError> {
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| TransportError::Config(format!("environment variable {name} not set")))
        };
        Ok(Self::new(
            var("ADMIN_ENDPOINT")?,
            var("ADMIN_API_KEY")?,
            var("DURABLE_OBJECT_INSTANCE_NAME")?,
        ))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Sends [`AdminMessage`]s, retrying transient failures up to the policy ceiling.
pub struct AdminClient {
    config: AdminConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl AdminClient {
    pub fn new(config: AdminConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Config(format!("building HTTP client: {e}")))?;
        let retry = RetryPolicy::new(config.retry.clone());
        Ok(Self {
            config,
            http,
            retry,
        })
    }

    /// Send one command and return the response body.
    pub async fn send(&self, message: &AdminMessage) -> Result<String, TransportError> {
        let body = serde_json::to_string(message)?;
        self.retry
            .execute("admin", || self.post(body.clone()))
            .await
    }

    async fn post(&self, body: String) -> Result<String, TransportError> {
        let resp = self
            .http
            .post(&self.config.endpoint)
            .header(ADMIN_API_KEY_HEADER, &self.config.api_key)
            .header(INSTANCE_NAME_HEADER, &self.config.instance_name)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        if status != reqwest::StatusCode::OK {
            return Err(TransportError::Http(format!(
                "non-200 response {}: {text}",
                status.as_u16()
            )));
        }
        tracing::debug!(endpoint = %self.config.endpoint, bytes = text.len(), "admin command accepted");
        Ok(text)
    }
}
