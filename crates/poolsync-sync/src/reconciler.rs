//! Event reconciler: merges cache, indexer and chain into one log.
//!
//! One `sync_stream` call:
//!
//! ```text
//! cached set ──► graph [from, ∞) ──► eth_getLogs [from', head] ──► validate ──► save
//! ```
//!
//! Nothing is written unless every step succeeds. An unavailable indexer
//! only widens the on-chain range.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use poolsync_core::cache::{CachedEventSet, EventStore, StreamKey};
use poolsync_core::chain::ChainDescriptor;
use poolsync_core::error::SyncError;
use poolsync_core::events::{EventRecord, StreamKind};
use poolsync_evm::abi::{decode_log, event_topic};
use poolsync_evm::batch::BatchLogFetcher;
use poolsync_evm::log::LogFilter;
use poolsync_graph::{GraphFetcher, GraphOutcome};

/// What one `sync_stream` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub stream: StreamKind,
    pub chain_id: u64,
    /// Events already cached before the call.
    pub cached: usize,
    pub from_graph: usize,
    pub from_chain: usize,
    /// Events in the persisted set.
    pub total: usize,
    pub last_block: u64,
    /// `false` when the indexer was configured but unusable.
    pub graph_available: bool,
}

/// Keeps the streams of one chain in sync.
pub struct EventReconciler {
    chain: ChainDescriptor,
    store: Arc<dyn EventStore>,
    graph: Option<Arc<GraphFetcher>>,
    batch: BatchLogFetcher,
}

impl EventReconciler {
    pub fn new(
        chain: ChainDescriptor,
        store: Arc<dyn EventStore>,
        graph: Option<Arc<GraphFetcher>>,
        batch: BatchLogFetcher,
    ) -> Self {
        Self {
            chain,
            store,
            graph,
            batch,
        }
    }

    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    /// Sync each stream of `streams` deployed on this chain, in order.
    ///
    /// Stops at the first failing stream; streams synced before it keep
    /// their saved sets.
    pub async fn sync_streams(&self, streams: &[StreamKind]) -> Result<Vec<SyncReport>, SyncError> {
        let mut reports = Vec::new();
        for stream in streams {
            if !self.chain.supports(*stream) {
                debug!(chain_id = self.chain.chain_id, %stream, "stream not deployed, skipped");
                continue;
            }
            reports.push(self.sync_stream(*stream).await?);
        }
        Ok(reports)
    }

    /// Bring one stream up to the provider's head and persist the merged set.
    pub async fn sync_stream(&self, stream: StreamKind) -> Result<SyncReport, SyncError> {
        let chain_id = self.chain.chain_id;
        let contract = self.chain.stream_contract(stream)?;
        let key = StreamKey::new(stream, chain_id);

        let cached = match self.store.load(&key).await? {
            Some(set) => set,
            None => CachedEventSet::empty(key, self.chain.start_block(stream)),
        };
        let cached_count = cached.len();
        let mut events = cached.events;
        let mut from = cached.last_block + 1;

        let mut from_graph = 0;
        let mut graph_available = true;
        if let (Some(graph), Some(url)) = (&self.graph, self.chain.graph_url_for(stream)) {
            match graph.fetch_all(url, stream, from).await {
                GraphOutcome::Synced {
                    events: indexed,
                    last_sync_block,
                } => {
                    from_graph = indexed.len();
                    events.extend(indexed);
                    from = from.max(last_sync_block);
                }
                GraphOutcome::Unavailable { reason } => {
                    warn!(chain_id, %stream, %reason, "falling back to on-chain fetch");
                    graph_available = false;
                }
            }
        }

        let head = self.batch.client().block_number().await?;
        let mut from_chain = 0;
        let mut synced_to = None;
        if from <= head {
            let filter = LogFilter::new(contract, event_topic(stream));
            let batch = self.batch.fetch_logs(&filter, from, Some(head)).await?;
            for log in batch.logs.iter().filter(|log| !log.is_removed()) {
                events.push(decode_log(stream, log)?);
                from_chain += 1;
            }
            synced_to = Some(batch.synced_to);
        }

        let last_block = cached
            .last_block
            .max(from - 1)
            .max(synced_to.unwrap_or(0));
        let set = CachedEventSet::new(key, events, last_block);
        set.validate()?;

        let report = SyncReport {
            stream,
            chain_id,
            cached: cached_count,
            from_graph,
            from_chain,
            total: set.len(),
            last_block,
            graph_available,
        };
        self.store.save(set).await?;

        info!(
            chain_id,
            %stream,
            cached = report.cached,
            from_graph,
            from_chain,
            total = report.total,
            last_block,
            "stream synced"
        );
        Ok(report)
    }

    /// The persisted set of a stream, if any.
    pub async fn cached_events(&self, stream: StreamKind) -> Result<Vec<EventRecord>, SyncError> {
        let key = StreamKey::new(stream, self.chain.chain_id);
        Ok(self
            .store
            .load(&key)
            .await?
            .map(|set| set.events)
            .unwrap_or_default())
    }
}
