//! The provider calls the sync engine needs from an EVM node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use poolsync_core::error::SyncError;
use poolsync_rpc::{call, RpcTransport, TransportError};

use crate::log::{parse_hex_u64, LogFilter, RawLog};

/// Trait for fetching EVM data from a JSON-RPC provider.
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    /// Current block height.
    async fn block_number(&self) -> Result<u64, SyncError>;

    /// Logs matching `filter` in `[from, to]`.
    async fn get_logs(&self, filter: &LogFilter, from: u64, to: u64)
        -> Result<Vec<RawLog>, SyncError>;

    /// Read-only contract call at the latest block.
    async fn call(&self, to: &str, data: Vec<u8>) -> Result<Vec<u8>, SyncError>;
}

/// `EvmRpcClient` over any [`RpcTransport`].
pub struct JsonRpcEvmClient {
    transport: Arc<dyn RpcTransport>,
    next_id: AtomicU64,
}

impl JsonRpcEvmClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, SyncError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        call(self.transport.as_ref(), id, method, params)
            .await
            .map_err(rpc_error)
    }
}

fn rpc_error(e: TransportError) -> SyncError {
    if e.is_retryable() {
        SyncError::Rpc(e.to_string())
    } else {
        SyncError::Other(format!("unusable RPC response: {e}"))
    }
}

#[async_trait]
impl EvmRpcClient for JsonRpcEvmClient {
    async fn block_number(&self) -> Result<u64, SyncError> {
        let hex: String = self.request("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&hex).ok_or_else(|| SyncError::Rpc(format!("invalid block number '{hex}'")))
    }

    async fn get_logs(
        &self,
        filter: &LogFilter,
        from: u64,
        to: u64,
    ) -> Result<Vec<RawLog>, SyncError> {
        self.request("eth_getLogs", vec![filter.to_params(from, to)])
            .await
    }

    async fn call(&self, to: &str, data: Vec<u8>) -> Result<Vec<u8>, SyncError> {
        let params = vec![
            json!({ "to": to, "data": format!("0x{}", hex::encode(data)) }),
            json!("latest"),
        ];
        let out: String = self.request("eth_call", params).await?;
        hex::decode(out.strip_prefix("0x").unwrap_or(&out))
            .map_err(|e| SyncError::Rpc(format!("invalid eth_call output: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolsync_rpc::{JsonRpcRequest, JsonRpcResponse};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        seen: Mutex<Vec<JsonRpcRequest>>,
    }

    #[async_trait]
    impl RpcTransport for RecordingTransport {
        async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
            self.seen.lock().unwrap().push(req.clone());
            let result = match req.method.as_str() {
                "eth_blockNumber" => json!("0x10"),
                "eth_getLogs" => json!([{
                    "address": "0x01",
                    "topics": ["0x02"],
                    "data": "0x",
                    "blockNumber": "0xa",
                    "transactionHash": "0x03",
                    "logIndex": "0x0"
                }]),
                "eth_call" => json!("0x0102"),
                _ => {
                    return Ok(JsonRpcResponse::failure(
                        req.id,
                        -32000,
                        "requested to block after last accepted block 9",
                    ))
                }
            };
            Ok(JsonRpcResponse::success(req.id, result))
        }

        fn url(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn block_number_parses_hex() {
        let client = JsonRpcEvmClient::new(Arc::new(RecordingTransport::default()));
        assert_eq!(client.block_number().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn get_logs_sends_filter() {
        let transport = Arc::new(RecordingTransport::default());
        let client = JsonRpcEvmClient::new(transport.clone());
        let logs = client
            .get_logs(&LogFilter::new("0xpool", "0xtopic"), 1, 2)
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number_u64(), Some(10));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].params[0]["address"], "0xpool");
        assert_eq!(seen[0].params[0]["toBlock"], "0x2");
    }

    #[tokio::test]
    async fn call_roundtrips_hex() {
        let transport = Arc::new(RecordingTransport::default());
        let client = JsonRpcEvmClient::new(transport.clone());
        let out = client.call("0xagg", vec![0xde, 0xad]).await.unwrap();
        assert_eq!(out, vec![1, 2]);
        assert_eq!(transport.seen.lock().unwrap()[0].params[0]["data"], "0xdead");
    }

    #[tokio::test]
    async fn node_error_keeps_accepted_block_hint() {
        let client = JsonRpcEvmClient::new(Arc::new(RecordingTransport::default()));
        let err = client.request::<Value>("eth_unknown", vec![]).await.unwrap_err();
        assert_eq!(err.accepted_block_hint(), Some(9));
    }
}
