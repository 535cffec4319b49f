//! Sync cursor: the last block a stream is known to be complete up to.

use serde::{Deserialize, Serialize};

use crate::events::StreamKind;

/// Position of one (chain, stream) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub stream: StreamKind,
    pub chain_id: u64,
    /// Every event at or below this block is held locally.
    pub last_synced_block: u64,
    /// Unix timestamp of the merge that produced this position.
    pub updated_at: i64,
}

impl SyncCursor {
    pub fn new(stream: StreamKind, chain_id: u64, last_synced_block: u64) -> Self {
        Self {
            stream,
            chain_id,
            last_synced_block,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// The next block to fetch (cursor + 1).
    pub fn next_block(&self) -> u64 {
        self.last_synced_block.saturating_add(1)
    }

    /// Move forward; a lower block never moves the cursor back.
    pub fn advance(&mut self, block_number: u64) {
        if block_number > self.last_synced_block {
            self.last_synced_block = block_number;
            self.updated_at = chrono::Utc::now().timestamp();
        }
    }

    /// Blocks between the cursor and `head`.
    pub fn lag(&self, head: u64) -> u64 {
        head.saturating_sub(self.last_synced_block)
    }
}
