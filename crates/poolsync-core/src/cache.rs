//! Persistent cache contract: previously synchronized events per stream.
//!
//! A cached set is never mutated in place: the reconciler loads a copy,
//! appends to it and saves the superseding version, so a store only ever
//! holds fully merged sets.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cursor::SyncCursor;
use crate::error::SyncError;
use crate::events::{EventRecord, StreamKind};

/// Identifies one cached stream: `{stream}_{chainId}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamKey {
    pub stream: StreamKind,
    pub chain_id: u64,
}

impl StreamKey {
    pub fn new(stream: StreamKind, chain_id: u64) -> Self {
        Self { stream, chain_id }
    }

    /// Storage name, e.g. `commitments_100`.
    pub fn name(&self) -> String {
        format!("{}_{}", self.stream, self.chain_id)
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.stream, self.chain_id)
    }
}

/// The merged, ordered event log of one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEventSet {
    pub key: StreamKey,
    pub events: Vec<EventRecord>,
    /// Every event at or below this block is present in `events`.
    pub last_block: u64,
    pub updated_at: i64,
}

impl CachedEventSet {
    pub fn new(key: StreamKey, events: Vec<EventRecord>, last_block: u64) -> Self {
        Self {
            key,
            events,
            last_block,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// An empty set positioned at `start_block`.
    pub fn empty(key: StreamKey, start_block: u64) -> Self {
        Self::new(key, Vec::new(), start_block)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn cursor(&self) -> SyncCursor {
        SyncCursor {
            stream: self.key.stream,
            chain_id: self.key.chain_id,
            last_synced_block: self.last_block,
            updated_at: self.updated_at,
        }
    }

    /// Check the ordering invariants before a write.
    ///
    /// Blocks must be non-decreasing and commitment indices strictly
    /// increasing. A skipped commitment index is logged but allowed, since
    /// a gap can only be repaired by a resync from an earlier block.
    pub fn validate(&self) -> Result<(), SyncError> {
        let stream = self.key.stream;
        let mut prev_block = 0u64;
        let mut prev_index: Option<u64> = None;

        for event in &self.events {
            if event.stream() != stream {
                return Err(SyncError::decode(
                    stream,
                    format!("found a {} record", event.stream()),
                ));
            }

            let block = event.block_number();
            if block < prev_block {
                return Err(SyncError::OutOfOrder {
                    stream,
                    block_number: block,
                    reason: format!("block {block} follows block {prev_block}"),
                });
            }
            prev_block = block;

            if let Some(index) = event.commitment_index() {
                if let Some(prev) = prev_index {
                    if index <= prev {
                        return Err(SyncError::OutOfOrder {
                            stream,
                            block_number: block,
                            reason: format!("commitment index {index} follows index {prev}"),
                        });
                    }
                    if index != prev + 1 {
                        warn!(
                            key = %self.key,
                            expected = prev + 1,
                            found = index,
                            "commitment indices are not contiguous"
                        );
                    }
                }
                prev_index = Some(index);
            }
        }

        if prev_block > self.last_block {
            return Err(SyncError::OutOfOrder {
                stream,
                block_number: prev_block,
                reason: format!("event lies past the cursor at block {}", self.last_block),
            });
        }
        Ok(())
    }
}

/// Trait for loading and saving cached event sets.
///
/// Implementations include `MemoryEventStore`, `SqliteEventStore`,
/// `ZipSnapshotStore` and `TieredEventStore`.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Load the cached set for a stream (`None` if nothing was synced yet).
    async fn load(&self, key: &StreamKey) -> Result<Option<CachedEventSet>, SyncError>;

    /// Replace the cached set for `set.key`.
    async fn save(&self, set: CachedEventSet) -> Result<(), SyncError>;

    /// Load only the cursor of a stream.
    async fn cursor(&self, key: &StreamKey) -> Result<Option<SyncCursor>, SyncError> {
        Ok(self.load(key).await?.map(|set| set.cursor()))
    }

    /// Drop a stream (e.g. when forcing a full resync).
    async fn delete(&self, key: &StreamKey) -> Result<(), SyncError>;
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory event store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryEventStore {
    data: Mutex<HashMap<StreamKey, CachedEventSet>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<StreamKey, CachedEventSet>>, SyncError> {
        self.data
            .lock()
            .map_err(|e| SyncError::Storage(format!("memory store poisoned: {e}")))
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn load(&self, key: &StreamKey) -> Result<Option<CachedEventSet>, SyncError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn save(&self, set: CachedEventSet) -> Result<(), SyncError> {
        self.lock()?.insert(set.key, set);
        Ok(())
    }

    async fn delete(&self, key: &StreamKey) -> Result<(), SyncError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CommitmentEvent, NullifierEvent};

    fn commitment(index: u64, block: u64) -> EventRecord {
        EventRecord::Commitment(CommitmentEvent {
            index,
            commitment: format!("0x{index:064x}"),
            block_number: block,
            encrypted_output: "0x00".into(),
            transaction_hash: format!("0x{block:064x}"),
        })
    }

    fn key() -> StreamKey {
        StreamKey::new(StreamKind::Commitments, 100)
    }

    #[test]
    fn key_name() {
        assert_eq!(key().name(), "commitments_100");
        assert_eq!(StreamKey::new(StreamKind::Relayers, 1).to_string(), "relayers_1");
    }

    #[test]
    fn validate_accepts_ordered_set() {
        let set = CachedEventSet::new(key(), vec![commitment(0, 10), commitment(1, 10), commitment(2, 12)], 12);
        set.validate().unwrap();
    }

    #[test]
    fn validate_rejects_block_regression() {
        let set = CachedEventSet::new(key(), vec![commitment(0, 10), commitment(1, 9)], 20);
        let err = set.validate().unwrap_err();
        assert!(err.is_ordering_violation());
    }

    #[test]
    fn validate_rejects_duplicate_index() {
        let set = CachedEventSet::new(key(), vec![commitment(4, 10), commitment(4, 11)], 20);
        assert!(matches!(
            set.validate(),
            Err(SyncError::OutOfOrder { block_number: 11, .. })
        ));
    }

    #[test]
    fn validate_allows_index_gap() {
        let set = CachedEventSet::new(key(), vec![commitment(0, 10), commitment(2, 11)], 20);
        set.validate().unwrap();
    }

    #[test]
    fn validate_rejects_event_past_cursor() {
        let set = CachedEventSet::new(key(), vec![commitment(0, 30)], 20);
        assert!(set.validate().is_err());
    }

    #[test]
    fn validate_rejects_foreign_stream() {
        let foreign = EventRecord::Nullifier(NullifierEvent {
            nullifier: "0x01".into(),
            block_number: 5,
            transaction_hash: "0x02".into(),
        });
        let set = CachedEventSet::new(key(), vec![foreign], 20);
        assert!(matches!(set.validate(), Err(SyncError::Decode { .. })));
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryEventStore::new();
        assert!(store.load(&key()).await.unwrap().is_none());

        store
            .save(CachedEventSet::new(key(), vec![commitment(0, 10)], 15))
            .await
            .unwrap();

        let loaded = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.last_block, 15);

        let cursor = store.cursor(&key()).await.unwrap().unwrap();
        assert_eq!(cursor.last_synced_block, 15);
        assert_eq!(cursor.next_block(), 16);

        store.delete(&key()).await.unwrap();
        assert!(store.load(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_isolates_chains() {
        let store = MemoryEventStore::new();
        let other = StreamKey::new(StreamKind::Commitments, 56);
        store.save(CachedEventSet::empty(key(), 100)).await.unwrap();
        store.save(CachedEventSet::empty(other, 200)).await.unwrap();

        assert_eq!(store.load(&key()).await.unwrap().unwrap().last_block, 100);
        assert_eq!(store.load(&other).await.unwrap().unwrap().last_block, 200);
    }
}
