//! The `RpcTransport` trait: the seam every JSON-RPC endpoint plugs into.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// An async JSON-RPC endpoint.
///
/// Implementations must be `Send + Sync` and are stored as
/// `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the raw response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// The transport's identifier (URL or name).
    fn url(&self) -> &str;
}

/// Call a method and deserialize its result.
///
/// Node-side errors surface as [`TransportError::Rpc`].
pub async fn call<T: DeserializeOwned>(
    transport: &dyn RpcTransport,
    id: u64,
    method: &str,
    params: Vec<Value>,
) -> Result<T, TransportError> {
    let resp = transport.send(JsonRpcRequest::new(id, method, params)).await?;
    let result = resp.into_result().map_err(TransportError::Rpc)?;
    serde_json::from_value(result).map_err(TransportError::Deserialization)
}
