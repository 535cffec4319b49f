//! Scripted chain and indexer doubles shared by the sync tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_core::dyn_abi::DynSolValue;
use alloy_core::primitives::{hex, Address, B256, U256};
use async_trait::async_trait;
use serde_json::{json, Value};

use poolsync_core::chain::{ChainDescriptor, ContractAddresses};
use poolsync_core::config::BatchConfig;
use poolsync_core::error::SyncError;
use poolsync_core::events::StreamKind;
use poolsync_evm::abi::event_topic;
use poolsync_evm::client::EvmRpcClient;
use poolsync_evm::log::{LogFilter, RawLog};
use poolsync_graph::client::GraphTransport;

pub const POOL: &str = "0xD692Fd2D0b2Fbd2e52CFa5B5b9424bC981C30696";

pub fn devnet() -> ChainDescriptor {
    ChainDescriptor {
        chain_id: 31_337,
        name: "devnet".into(),
        rpc_url: "http://localhost:8545".into(),
        fallback_rpc_urls: Vec::new(),
        graph_url: Some("http://localhost:8000/subgraphs/name/pool".into()),
        deploy_block: 500,
        block_duration_ms: 1_000,
        ens_subdomain_key: "devnet".into(),
        contracts: ContractAddresses {
            pool: Some(POOL.into()),
            ..ContractAddresses::default()
        },
        registry_deploy_block: None,
        registry_graph_url: None,
    }
}

pub fn quick_batch() -> BatchConfig {
    BatchConfig {
        retry_interval_ms: 0,
        stagger_ms: 0,
        ..BatchConfig::default()
    }
}

fn raw_log(address: &str, stream: StreamKind, data: Vec<u8>, block: u64) -> RawLog {
    RawLog {
        address: address.into(),
        topics: vec![event_topic(stream)],
        data: format!("0x{}", hex::encode(data)),
        block_number: format!("0x{block:x}"),
        tx_hash: format!("0x{block:064x}"),
        log_index: "0x0".into(),
        removed: None,
    }
}

pub fn commitment_log(index: u64, block: u64) -> RawLog {
    let data = DynSolValue::Tuple(vec![
        DynSolValue::FixedBytes(B256::from(U256::from(index).to_be_bytes::<32>()), 32),
        DynSolValue::Uint(U256::from(index), 256),
        DynSolValue::Bytes(vec![0xab, 0xcd]),
    ])
    .abi_encode_params();
    raw_log(POOL, StreamKind::Commitments, data, block)
}

pub fn relayer_log(registry: &str, ens_name: &str, relayer: Address, block: u64) -> RawLog {
    let data = DynSolValue::Tuple(vec![
        DynSolValue::FixedBytes(B256::ZERO, 32),
        DynSolValue::String(ens_name.into()),
        DynSolValue::Address(relayer),
        DynSolValue::Uint(U256::ZERO, 256),
    ])
    .abi_encode_params();
    raw_log(registry, StreamKind::Relayers, data, block)
}

pub fn commitment_row(index: u64, block: u64) -> Value {
    json!({
        "id": format!("{index}"),
        "index": index.to_string(),
        "commitment": format!("0x{index:064x}"),
        "blockNumber": block.to_string(),
        "encryptedOutput": "0xabcd",
        "transactionHash": format!("0x{block:064x}")
    })
}

pub fn relayer_row(ens_name: &str, relayer: Address, block: u64) -> Value {
    json!({
        "address": relayer.to_string().to_lowercase(),
        "ensName": ens_name,
        "ensHash": "0x00",
        "blockRegistration": block.to_string()
    })
}

// ─── Chain ───────────────────────────────────────────────────────────────────

/// Serves `logs` by block range and topic, like a node would.
pub struct MockChain {
    head: u64,
    logs: Vec<RawLog>,
    /// Ranges spanning more than this many blocks fail.
    fail_over: Mutex<Option<u64>>,
    /// Ranges ending past this block are refused with the clamp signal.
    accepted: Mutex<Option<u64>>,
    call_output: Mutex<Vec<u8>>,
    log_calls: Mutex<Vec<(u64, u64)>>,
    eth_calls: Mutex<usize>,
}

impl MockChain {
    pub fn new(head: u64, logs: Vec<RawLog>) -> Arc<Self> {
        Arc::new(Self {
            head,
            logs,
            fail_over: Mutex::new(None),
            accepted: Mutex::new(None),
            call_output: Mutex::new(Vec::new()),
            log_calls: Mutex::new(Vec::new()),
            eth_calls: Mutex::new(0),
        })
    }

    pub fn failing_over(self: Arc<Self>, span: u64) -> Arc<Self> {
        *self.fail_over.lock().unwrap() = Some(span);
        self
    }

    pub fn accepting_up_to(self: Arc<Self>, block: u64) -> Arc<Self> {
        *self.accepted.lock().unwrap() = Some(block);
        self
    }

    pub fn answering_calls(self: Arc<Self>, output: Vec<u8>) -> Arc<Self> {
        *self.call_output.lock().unwrap() = output;
        self
    }

    pub fn log_calls(&self) -> Vec<(u64, u64)> {
        self.log_calls.lock().unwrap().clone()
    }

    pub fn eth_calls(&self) -> usize {
        *self.eth_calls.lock().unwrap()
    }
}

#[async_trait]
impl EvmRpcClient for MockChain {
    async fn block_number(&self) -> Result<u64, SyncError> {
        Ok(self.head)
    }

    async fn get_logs(&self, filter: &LogFilter, from: u64, to: u64) -> Result<Vec<RawLog>, SyncError> {
        self.log_calls.lock().unwrap().push((from, to));

        if let Some(accepted) = *self.accepted.lock().unwrap() {
            if to > accepted {
                return Err(SyncError::Rpc(format!(
                    "RPC error -32000: requested to block {to} after last accepted block {accepted}"
                )));
            }
        }
        if let Some(span) = *self.fail_over.lock().unwrap() {
            if to - from + 1 > span {
                return Err(SyncError::Rpc("RPC error -32005: query returned more than 10000 results".into()));
            }
        }

        Ok(self
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number_u64().unwrap_or(0);
                log.address.eq_ignore_ascii_case(&filter.address)
                    && log.topic0() == Some(filter.topic0.as_str())
                    && (from..=to).contains(&block)
            })
            .cloned()
            .collect())
    }

    async fn call(&self, _to: &str, _data: Vec<u8>) -> Result<Vec<u8>, SyncError> {
        *self.eth_calls.lock().unwrap() += 1;
        Ok(self.call_output.lock().unwrap().clone())
    }
}

// ─── Indexer ─────────────────────────────────────────────────────────────────

/// Answers page queries from fixed per-stream rows.
pub struct MockGraph {
    head: u64,
    fail: bool,
    rows: HashMap<StreamKind, Vec<Value>>,
}

impl MockGraph {
    pub fn new(head: u64) -> Arc<Self> {
        Arc::new(Self {
            head,
            fail: false,
            rows: HashMap::new(),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            head: 0,
            fail: true,
            rows: HashMap::new(),
        })
    }

    pub fn with_rows(self: Arc<Self>, stream: StreamKind, rows: Vec<Value>) -> Arc<Self> {
        let mut rows_by_stream = self.rows.clone();
        rows_by_stream.insert(stream, rows);
        Arc::new(Self {
            head: self.head,
            fail: self.fail,
            rows: rows_by_stream,
        })
    }
}

#[async_trait]
impl GraphTransport for MockGraph {
    async fn query(&self, _url: &str, query: &str, variables: Value) -> Result<Value, SyncError> {
        if self.fail {
            return Err(SyncError::Graph("HTTP 503: indexer unavailable".into()));
        }
        let stream = StreamKind::ALL
            .into_iter()
            .find(|s| query.contains(&format!("{}(first:", s.as_str())))
            .ok_or_else(|| SyncError::Graph("unknown query".into()))?;
        let from = variables["fromBlock"].as_u64().unwrap_or(0);
        let first = variables["first"].as_u64().unwrap_or(1_000) as usize;

        let page: Vec<Value> = self
            .rows
            .get(&stream)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        row[stream.block_field()]
                            .as_str()
                            .and_then(|b| b.parse::<u64>().ok())
                            .is_some_and(|b| b >= from)
                    })
                    .take(first)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut data = serde_json::Map::new();
        data.insert(stream.as_str().into(), Value::Array(page));
        data.insert("_meta".into(), json!({ "block": { "number": self.head } }));
        Ok(Value::Object(data))
    }
}
