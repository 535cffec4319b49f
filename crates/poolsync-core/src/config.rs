//! Runtime configuration for a sync run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::events::StreamKind;

/// Batch log fetcher tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Windows dispatched together in one concurrency group.
    pub concurrency: usize,
    /// Blocks per `eth_getLogs` window.
    pub blocks_per_request: u64,
    pub should_retry: bool,
    /// Attempts per window when retrying is enabled.
    pub retry_max: u32,
    /// Fixed sleep between attempts (milliseconds).
    pub retry_interval_ms: u64,
    /// Start offset between requests of a group (milliseconds × position).
    pub stagger_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            blocks_per_request: 2_000,
            should_retry: true,
            retry_max: 5,
            retry_interval_ms: 500,
            stagger_ms: 20,
        }
    }
}

/// Graph indexer pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub enabled: bool,
    /// Rows requested per page.
    pub page_size: u32,
    /// A page shorter than this is the final page.
    pub break_length: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_size: 1_000,
            break_length: 900,
        }
    }
}

/// JSON-RPC transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Pause before switching to fallback endpoints (milliseconds).
    pub fallback_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            fallback_delay_ms: 3_000,
            request_timeout_ms: 30_000,
        }
    }
}

/// Relayer validation thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayerConfig {
    /// Minimum stake in wei, decimal or `0x` hex (40 TORN by default).
    pub min_stake: String,
    /// Scheme prepended to relayer hostnames, e.g. `https:`.
    pub scheme: String,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            min_stake: "0x22B1C8C1227A00000".into(),
            scheme: "https:".into(),
        }
    }
}

/// Where cached sets live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file for the hot tier.
    pub sqlite_path: String,
    /// Directory of `{stream}_{chainId}.json.zip` snapshots for the cold tier.
    pub snapshot_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "./poolsync.db".into(),
            snapshot_dir: "./snapshots".into(),
        }
    }
}

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: crate name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Filter directives, e.g. `info,poolsync_evm=debug`.
    pub fn directives(&self) -> String {
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        let mut directives = self.level.clone();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Chains to sync, in order.
    pub chains: Vec<u64>,
    /// Streams to sync on each chain (skipped where not deployed).
    pub streams: Vec<StreamKind>,
    pub batch: BatchConfig,
    pub graph: GraphConfig,
    pub rpc: RpcConfig,
    pub relayer: RelayerConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chains: vec![crate::chain::MAINNET, crate::chain::BSC, crate::chain::XDAI],
            streams: StreamKind::POOL.to_vec(),
            batch: BatchConfig::default(),
            graph: GraphConfig::default(),
            rpc: RpcConfig::default(),
            relayer: RelayerConfig::default(),
            storage: StorageConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))
    }
}
