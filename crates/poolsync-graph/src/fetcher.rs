//! Forward pagination over an indexer stream.
//!
//! Pages are requested ascending by block. A page of at least
//! `break_length` rows may be cut in the middle of a block, so every row of
//! its last block is dropped and the next page starts at that block again.
//! A shorter page is the last one.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use poolsync_core::config::GraphConfig;
use poolsync_core::error::SyncError;
use poolsync_core::events::{EventRecord, StreamKind};

use crate::client::GraphTransport;
use crate::queries::{root_field, stream_query};
use crate::rows::decode_row;

/// Result of an indexer sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphOutcome {
    /// The indexer answered. `events` may be empty.
    Synced {
        events: Vec<EventRecord>,
        /// First block the indexer has not covered yet.
        last_sync_block: u64,
    },
    /// The indexer could not be used; callers must not advance.
    Unavailable { reason: String },
}

impl GraphOutcome {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }
}

struct Page {
    rows: Vec<EventRecord>,
    head: u64,
}

pub struct GraphFetcher {
    transport: Arc<dyn GraphTransport>,
    config: GraphConfig,
}

impl GraphFetcher {
    pub fn new(transport: Arc<dyn GraphTransport>, config: GraphConfig) -> Self {
        Self { transport, config }
    }

    /// Fetch every `stream` row at or above `from_block`.
    ///
    /// Never fails: any error is reported as [`GraphOutcome::Unavailable`].
    pub async fn fetch_all(&self, url: &str, stream: StreamKind, from_block: u64) -> GraphOutcome {
        match self.try_fetch_all(url, stream, from_block).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%url, %stream, from_block, error = %e, "graph indexer unavailable");
                GraphOutcome::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_fetch_all(
        &self,
        url: &str,
        stream: StreamKind,
        from_block: u64,
    ) -> Result<GraphOutcome, SyncError> {
        let mut from = from_block;
        let mut events: Vec<EventRecord> = Vec::new();
        let mut pages = 0usize;

        let head = loop {
            let page = self.fetch_page(url, stream, from).await?;
            pages += 1;
            debug!(%stream, from, rows = page.rows.len(), head = page.head, "graph page");

            if page.rows.is_empty() {
                break page.head;
            }
            if page.rows.len() < self.config.break_length {
                events.extend(page.rows);
                break page.head;
            }

            let boundary = page.rows[page.rows.len() - 1].block_number();
            let before = page.rows.len();
            let kept: Vec<_> = page
                .rows
                .into_iter()
                .filter(|r| r.block_number() != boundary)
                .collect();
            if kept.is_empty() {
                return Err(SyncError::Graph(format!(
                    "{before} rows at block {boundary} fill a page; pagination cannot advance"
                )));
            }
            events.extend(kept);
            from = boundary;
        };

        let after_events = events.last().map_or(0, |e| e.block_number() + 1);
        let last_sync_block = (head + 1).max(after_events);

        info!(%stream, from_block, pages, events = events.len(), last_sync_block, "graph stream synced");
        Ok(GraphOutcome::Synced {
            events,
            last_sync_block,
        })
    }

    async fn fetch_page(&self, url: &str, stream: StreamKind, from: u64) -> Result<Page, SyncError> {
        let variables = json!({ "first": self.config.page_size, "fromBlock": from });
        let data = self
            .transport
            .query(url, stream_query(stream), variables)
            .await?;

        let head = data["_meta"]["block"]["number"]
            .as_u64()
            .ok_or_else(|| SyncError::Graph("response is missing _meta.block.number".into()))?;

        let rows = match data.get(root_field(stream)) {
            Some(Value::Array(rows)) => rows.clone(),
            _ => {
                return Err(SyncError::Graph(format!(
                    "response is missing '{}'",
                    root_field(stream)
                )))
            }
        };
        let mut rows = rows
            .into_iter()
            .map(|row| decode_row(stream, row))
            .collect::<Result<Vec<_>, _>>()?;
        // same-block rows arrive in the indexer's id order, not by leaf index
        rows.sort_by_key(|r| (r.block_number(), r.commitment_index()));

        Ok(Page { rows, head })
    }
}
