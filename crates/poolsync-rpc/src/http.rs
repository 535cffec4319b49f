//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! One request per call. Retrying and endpoint switching are layered on top
//! by [`crate::fallback::FallbackTransport`] and the batch log fetcher.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

/// Plain HTTP JSON-RPC endpoint.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpRpcClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            request_timeout,
        })
    }

    /// Create with a 30 second request timeout.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, Duration::from_secs(30))
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        ms: self.request_timeout.as_millis() as u64,
                    }
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let resp = resp
            .json::<JsonRpcResponse>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        tracing::trace!(url = %self.url, method = %req.method, "rpc response received");
        Ok(resp)
    }

    fn url(&self) -> &str {
        &self.url
    }
}
