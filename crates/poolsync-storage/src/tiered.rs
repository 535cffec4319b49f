//! Hot store backed by a cold snapshot tier.
//!
//! Reads come from the hot store; the cold snapshot seeds a fresh hot store
//! and wins whenever it reaches further. Writes only touch the hot store,
//! and [`TieredEventStore::export`] copies a hot set down to the cold tier.
//!
//! The cold tier only changes through this store, so the block each cold
//! set reaches is remembered after the first read. Once the hot set is at
//! or past it, loads skip the cold tier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info};

use poolsync_core::cache::{CachedEventSet, EventStore, StreamKey};
use poolsync_core::error::SyncError;

pub struct TieredEventStore {
    hot: Arc<dyn EventStore>,
    cold: Arc<dyn EventStore>,
    /// `last_block` of each cold set read so far (`None`: no cold set).
    cold_reach: Mutex<HashMap<StreamKey, Option<u64>>>,
}

impl TieredEventStore {
    pub fn new(hot: Arc<dyn EventStore>, cold: Arc<dyn EventStore>) -> Self {
        Self {
            hot,
            cold,
            cold_reach: Mutex::new(HashMap::new()),
        }
    }

    fn reach(&self) -> Result<MutexGuard<'_, HashMap<StreamKey, Option<u64>>>, SyncError> {
        self.cold_reach
            .lock()
            .map_err(|e| SyncError::Storage(format!("tiered store poisoned: {e}")))
    }

    /// Write the current hot set of `key` to the cold tier.
    ///
    /// Returns the number of exported events, or `None` if nothing is cached.
    pub async fn export(&self, key: &StreamKey) -> Result<Option<usize>, SyncError> {
        let Some(set) = self.hot.load(key).await? else {
            return Ok(None);
        };
        let count = set.len();
        self.cold.save(set).await?;
        self.reach()?.remove(key);
        info!(%key, events = count, "exported to cold tier");
        Ok(Some(count))
    }
}

#[async_trait]
impl EventStore for TieredEventStore {
    async fn load(&self, key: &StreamKey) -> Result<Option<CachedEventSet>, SyncError> {
        let hot = self.hot.load(key).await?;

        let known = self.reach()?.get(key).copied();
        let cold_behind = match (&hot, known) {
            (Some(hot), Some(cold_block)) => cold_block.map_or(true, |b| b <= hot.last_block),
            _ => false,
        };
        if cold_behind {
            return Ok(hot);
        }

        let cold = self.cold.load(key).await?;
        self.reach()?.insert(*key, cold.as_ref().map(|c| c.last_block));

        let chosen = match (hot, cold) {
            (Some(hot), Some(cold)) if cold.last_block > hot.last_block => {
                debug!(%key, hot = hot.last_block, cold = cold.last_block, "cold tier is ahead");
                Some(cold)
            }
            (Some(hot), _) => Some(hot),
            (None, cold) => cold,
        };
        Ok(chosen)
    }

    async fn save(&self, set: CachedEventSet) -> Result<(), SyncError> {
        self.hot.save(set).await
    }

    async fn delete(&self, key: &StreamKey) -> Result<(), SyncError> {
        self.hot.delete(key).await?;
        self.cold.delete(key).await?;
        self.reach()?.remove(key);
        Ok(())
    }
}
