//! GraphQL transport.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use poolsync_core::error::SyncError;

/// Executes one GraphQL request against an endpoint.
#[async_trait]
pub trait GraphTransport: Send + Sync {
    /// POST `{query, variables}` and return the response's `data` object.
    ///
    /// A response carrying a non-empty `errors` array is an error even when
    /// partial `data` is present.
    async fn query(&self, url: &str, query: &str, variables: Value) -> Result<Value, SyncError>;
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphErrorItem>>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorItem {
    message: String,
}

/// Interpret a raw GraphQL response body.
pub fn into_data(body: Value) -> Result<Value, SyncError> {
    let resp: GraphResponse =
        serde_json::from_value(body).map_err(|e| SyncError::Graph(format!("malformed response: {e}")))?;

    if let Some(errors) = resp.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
        return Err(SyncError::Graph(messages.join("; ")));
    }
    match resp.data {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(SyncError::Graph("response has no data".into())),
    }
}

/// `reqwest`-backed GraphQL client.
pub struct HttpGraphClient {
    http: reqwest::Client,
}

impl HttpGraphClient {
    pub fn new(request_timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SyncError::Graph(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl GraphTransport for HttpGraphClient {
    async fn query(&self, url: &str, query: &str, variables: Value) -> Result<Value, SyncError> {
        let resp = self
            .http
            .post(url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| SyncError::Graph(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Graph(format!("HTTP {status}: {body}")));
        }

        let body = resp
            .json::<Value>()
            .await
            .map_err(|e| SyncError::Graph(e.to_string()))?;
        into_data(body)
    }
}
