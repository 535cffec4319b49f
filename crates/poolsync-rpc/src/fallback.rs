//! Primary endpoint with an ordered list of fallbacks.
//!
//! On a failed first attempt the transport pauses for a fixed delay, then
//! walks the fallback list in order. Each failure moves on to the next
//! endpoint; when the list is exhausted the last error is returned. With no
//! fallbacks configured the primary is retried once after the delay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::RpcTransport;

pub struct FallbackTransport {
    primary: Arc<dyn RpcTransport>,
    fallbacks: Vec<Arc<dyn RpcTransport>>,
    delay: Duration,
}

impl FallbackTransport {
    pub fn new(
        primary: Arc<dyn RpcTransport>,
        fallbacks: Vec<Arc<dyn RpcTransport>>,
        delay: Duration,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            delay,
        }
    }

    /// Number of endpoints, primary included.
    pub fn len(&self) -> usize {
        1 + self.fallbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Result of one endpoint, with node errors lifted into `Err`.
    async fn attempt(
        transport: &dyn RpcTransport,
        req: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, TransportError> {
        let resp = transport.send(req).await?;
        match resp.error {
            Some(err) => Err(TransportError::Rpc(err)),
            None => Ok(resp),
        }
    }
}

#[async_trait]
impl RpcTransport for FallbackTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let first_err = match Self::attempt(self.primary.as_ref(), req.clone()).await {
            Ok(resp) => return Ok(resp),
            Err(e) => e,
        };

        warn!(
            url = %self.primary.url(),
            method = %req.method,
            error = %first_err,
            delay_ms = self.delay.as_millis() as u64,
            "primary endpoint failed"
        );
        tokio::time::sleep(self.delay).await;

        if self.fallbacks.is_empty() {
            return Self::attempt(self.primary.as_ref(), req).await;
        }

        let mut last_err = first_err;
        for fallback in &self.fallbacks {
            match Self::attempt(fallback.as_ref(), req.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    warn!(url = %fallback.url(), method = %req.method, error = %e, "fallback endpoint failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    fn url(&self) -> &str {
        self.primary.url()
    }
}
