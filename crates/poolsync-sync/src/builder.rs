//! Fluent builder wiring registry, transports and store into a [`Syncer`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use poolsync_core::chain::XDAI;
//! use poolsync_core::events::StreamKind;
//! use poolsync_storage::SqliteEventStore;
//! use poolsync_sync::SyncerBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let syncer = SyncerBuilder::new()
//!     .chains([XDAI])
//!     .streams([StreamKind::Commitments, StreamKind::Nullifiers])
//!     .store(Arc::new(SqliteEventStore::open("./poolsync.db").await?))
//!     .build()?;
//!
//! for report in syncer.sync_chain(XDAI).await? {
//!     println!("{} up to block {}", report.stream, report.last_block);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use poolsync_core::cache::{EventStore, MemoryEventStore};
use poolsync_core::chain::{ChainDescriptor, ChainRegistry};
use poolsync_core::config::SyncConfig;
use poolsync_core::error::SyncError;
use poolsync_core::events::StreamKind;
use poolsync_evm::batch::BatchLogFetcher;
use poolsync_evm::client::{EvmRpcClient, JsonRpcEvmClient};
use poolsync_graph::{GraphFetcher, GraphTransport, HttpGraphClient};
use poolsync_rpc::{FallbackTransport, HttpRpcClient, RpcTransport};

use crate::reconciler::{EventReconciler, SyncReport};
use crate::relayer::RelayerResolver;

/// Fluent builder for [`Syncer`].
#[derive(Default)]
pub struct SyncerBuilder {
    config: SyncConfig,
    registry: Option<ChainRegistry>,
    store: Option<Arc<dyn EventStore>>,
    clients: HashMap<u64, Arc<dyn EvmRpcClient>>,
    graph: Option<Arc<dyn GraphTransport>>,
}

impl SyncerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom chain registry instead of the built-in one.
    pub fn registry(mut self, registry: ChainRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the chains `sync_all` walks, in order.
    pub fn chains(mut self, chains: impl IntoIterator<Item = u64>) -> Self {
        self.config.chains = chains.into_iter().collect();
        self
    }

    /// Set the streams synced on each chain.
    pub fn streams(mut self, streams: impl IntoIterator<Item = StreamKind>) -> Self {
        self.config.streams = streams.into_iter().collect();
        self
    }

    /// Enable or disable the graph indexer.
    pub fn graph_enabled(mut self, enabled: bool) -> Self {
        self.config.graph.enabled = enabled;
        self
    }

    /// Where cached sets are kept (in memory if unset).
    pub fn store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `client` for `chain_id` instead of the chain's RPC endpoints.
    pub fn evm_client(mut self, chain_id: u64, client: Arc<dyn EvmRpcClient>) -> Self {
        self.clients.insert(chain_id, client);
        self
    }

    /// Use `transport` for indexer queries instead of HTTP.
    pub fn graph_transport(mut self, transport: Arc<dyn GraphTransport>) -> Self {
        self.graph = Some(transport);
        self
    }

    pub fn build(self) -> Result<Syncer, SyncError> {
        let registry = self.registry.unwrap_or_else(ChainRegistry::builtin);
        for chain_id in &self.config.chains {
            registry.get(*chain_id)?;
        }

        let timeout = Duration::from_millis(self.config.rpc.request_timeout_ms);
        let mut clients = self.clients;
        for chain in registry.chains() {
            if !clients.contains_key(&chain.chain_id) {
                clients.insert(chain.chain_id, rpc_client(chain, &self.config)?);
            }
        }

        let graph = if self.config.graph.enabled {
            let transport: Arc<dyn GraphTransport> = match self.graph {
                Some(transport) => transport,
                None => Arc::new(HttpGraphClient::new(timeout)?),
            };
            Some(Arc::new(GraphFetcher::new(transport, self.config.graph.clone())))
        } else {
            None
        };

        Ok(Syncer {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryEventStore::new()) as Arc<dyn EventStore>),
            config: self.config,
            registry,
            clients,
            graph,
        })
    }
}

/// HTTP transport for the chain's primary endpoint, with its fallbacks.
fn rpc_client(chain: &ChainDescriptor, config: &SyncConfig) -> Result<Arc<dyn EvmRpcClient>, SyncError> {
    let timeout = Duration::from_millis(config.rpc.request_timeout_ms);
    let mut endpoints = chain.rpc_urls().map(|url| {
        HttpRpcClient::new(url, timeout)
            .map(|c| Arc::new(c) as Arc<dyn RpcTransport>)
            .map_err(|e| SyncError::Config(format!("RPC endpoint {url}: {e}")))
    });
    let primary = endpoints
        .next()
        .ok_or_else(|| SyncError::Config(format!("chain {} has no RPC endpoint", chain.chain_id)))??;
    let fallbacks = endpoints.collect::<Result<Vec<_>, _>>()?;

    debug!(chain_id = chain.chain_id, endpoints = 1 + fallbacks.len(), "RPC transport ready");
    let transport = FallbackTransport::new(
        primary,
        fallbacks,
        Duration::from_millis(config.rpc.fallback_delay_ms),
    );
    Ok(Arc::new(JsonRpcEvmClient::new(Arc::new(transport))))
}

/// Everything needed to sync the configured chains.
pub struct Syncer {
    config: SyncConfig,
    registry: ChainRegistry,
    store: Arc<dyn EventStore>,
    clients: HashMap<u64, Arc<dyn EvmRpcClient>>,
    graph: Option<Arc<GraphFetcher>>,
}

impl Syncer {
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    fn client(&self, chain_id: u64) -> Result<Arc<dyn EvmRpcClient>, SyncError> {
        self.clients
            .get(&chain_id)
            .cloned()
            .ok_or(SyncError::UnknownChain(chain_id))
    }

    pub fn reconciler(&self, chain_id: u64) -> Result<EventReconciler, SyncError> {
        let chain = self.registry.get(chain_id)?.clone();
        let batch = BatchLogFetcher::new(self.client(chain_id)?, self.config.batch.clone());
        Ok(EventReconciler::new(
            chain,
            self.store.clone(),
            self.graph.clone(),
            batch,
        ))
    }

    pub fn relayer_resolver(&self) -> Result<RelayerResolver, SyncError> {
        let chain_id = self.registry.registry_chain()?.chain_id;
        RelayerResolver::new(
            &self.registry,
            self.client(chain_id)?,
            self.store.clone(),
            self.graph.clone(),
            &self.config.relayer,
        )
    }

    /// Sync the configured streams of one chain.
    pub async fn sync_chain(&self, chain_id: u64) -> Result<Vec<SyncReport>, SyncError> {
        self.reconciler(chain_id)?
            .sync_streams(&self.config.streams)
            .await
    }

    /// Sync every configured chain in order, stopping at the first failure.
    pub async fn sync_all(&self) -> Result<Vec<SyncReport>, SyncError> {
        let mut reports = Vec::new();
        for chain_id in &self.config.chains {
            reports.extend(self.sync_chain(*chain_id).await?);
        }
        Ok(reports)
    }
}
