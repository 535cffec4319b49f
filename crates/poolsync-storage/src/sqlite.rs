//! SQLite storage backend for cached event sets.
//!
//! Each stream is kept as ordered rows in `stream_events` plus one row in
//! `sync_cursors`. A save appends new rows and moves the cursor inside a
//! single transaction, so a reader never sees events without the matching
//! cursor.
//!
//! # Usage
//! ```rust,no_run
//! use poolsync_storage::sqlite::SqliteEventStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteEventStore::open("./poolsync.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteEventStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use poolsync_core::cache::{CachedEventSet, EventStore, StreamKey};
use poolsync_core::cursor::SyncCursor;
use poolsync_core::error::SyncError;
use poolsync_core::events::StreamKind;

fn storage_err(e: impl std::fmt::Display) -> SyncError {
    SyncError::Storage(e.to_string())
}

/// SQLite-backed [`EventStore`].
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./poolsync.db"`) or a full
    /// SQLite URL (`"sqlite:./poolsync.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, SyncError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database. Data is lost when the store is dropped.
    pub async fn in_memory() -> Result<Self, SyncError> {
        // every pooled connection would get its own private memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), SyncError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS stream_events (
                chain_id     INTEGER NOT NULL,
                stream       TEXT    NOT NULL,
                seq          INTEGER NOT NULL,
                block_number INTEGER NOT NULL,
                payload      TEXT    NOT NULL,
                PRIMARY KEY (chain_id, stream, seq)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_cursors (
                chain_id   INTEGER NOT NULL,
                stream     TEXT    NOT NULL,
                last_block INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (chain_id, stream)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Every stream with a stored cursor, ordered by chain then stream name.
    pub async fn keys(&self) -> Result<Vec<StreamKey>, SyncError> {
        let rows = sqlx::query("SELECT chain_id, stream FROM sync_cursors ORDER BY chain_id, stream")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.into_iter()
            .map(|r| {
                let stream: String = r.get("stream");
                Ok(StreamKey::new(
                    stream.parse::<StreamKind>()?,
                    r.get::<i64, _>("chain_id") as u64,
                ))
            })
            .collect()
    }

    /// Number of stored events of a stream.
    pub async fn event_count(&self, key: &StreamKey) -> Result<u64, SyncError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM stream_events WHERE chain_id = ? AND stream = ?",
        )
        .bind(key.chain_id as i64)
        .bind(key.stream.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.get::<i64, _>("cnt") as u64)
    }
}

// ─── EventStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn load(&self, key: &StreamKey) -> Result<Option<CachedEventSet>, SyncError> {
        let Some(cursor) = self.cursor(key).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            "SELECT payload FROM stream_events
             WHERE chain_id = ? AND stream = ? ORDER BY seq",
        )
        .bind(key.chain_id as i64)
        .bind(key.stream.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row.get("payload");
            let value = serde_json::from_str(&payload).map_err(storage_err)?;
            events.push(key.stream.record_from_value(value)?);
        }

        Ok(Some(CachedEventSet {
            key: *key,
            events,
            last_block: cursor.last_synced_block,
            updated_at: cursor.updated_at,
        }))
    }

    /// Sets only grow, so a save whose event at the last stored `seq` matches
    /// the stored row appends the remaining events. Anything else rewrites
    /// the stream.
    async fn save(&self, set: CachedEventSet) -> Result<(), SyncError> {
        let chain_id = set.key.chain_id as i64;
        let stream = set.key.stream.as_str();
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let last_stored = sqlx::query(
            "SELECT seq, payload FROM stream_events
             WHERE chain_id = ? AND stream = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(chain_id)
        .bind(stream)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_err)?;

        let start = match last_stored {
            None => 0,
            Some(row) => {
                let seq = row.get::<i64, _>("seq") as usize;
                let payload: String = row.get("payload");
                let extends = match set.events.get(seq) {
                    Some(event) => serde_json::to_string(event).map_err(storage_err)? == payload,
                    None => false,
                };
                if extends {
                    seq + 1
                } else {
                    sqlx::query("DELETE FROM stream_events WHERE chain_id = ? AND stream = ?")
                        .bind(chain_id)
                        .bind(stream)
                        .execute(&mut *tx)
                        .await
                        .map_err(storage_err)?;
                    0
                }
            }
        };

        for (seq, event) in set.events.iter().enumerate().skip(start) {
            let payload = serde_json::to_string(event).map_err(storage_err)?;
            sqlx::query(
                "INSERT INTO stream_events (chain_id, stream, seq, block_number, payload)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(chain_id)
            .bind(stream)
            .bind(seq as i64)
            .bind(event.block_number() as i64)
            .bind(&payload)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        sqlx::query(
            "INSERT OR REPLACE INTO sync_cursors (chain_id, stream, last_block, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(chain_id)
        .bind(stream)
        .bind(set.last_block as i64)
        .bind(set.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;

        debug!(
            key = %set.key,
            events = set.events.len(),
            appended = set.events.len() - start,
            last_block = set.last_block,
            "event set saved"
        );
        Ok(())
    }

    async fn cursor(&self, key: &StreamKey) -> Result<Option<SyncCursor>, SyncError> {
        let row = sqlx::query(
            "SELECT last_block, updated_at FROM sync_cursors
             WHERE chain_id = ? AND stream = ?",
        )
        .bind(key.chain_id as i64)
        .bind(key.stream.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| SyncCursor {
            stream: key.stream,
            chain_id: key.chain_id,
            last_synced_block: r.get::<i64, _>("last_block") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn delete(&self, key: &StreamKey) -> Result<(), SyncError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for table in ["stream_events", "sync_cursors"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE chain_id = ? AND stream = ?"))
                .bind(key.chain_id as i64)
                .bind(key.stream.as_str())
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use poolsync_core::events::{AccountEvent, CommitmentEvent, EventRecord};

    fn commitment(index: u64, block: u64) -> EventRecord {
        EventRecord::Commitment(CommitmentEvent {
            index,
            commitment: format!("0x{index:064x}"),
            block_number: block,
            encrypted_output: "0xdeadbeef".into(),
            transaction_hash: format!("0x{block:064x}"),
        })
    }

    fn key() -> StreamKey {
        StreamKey::new(StreamKind::Commitments, 100)
    }

    #[tokio::test]
    async fn save_and_load_preserves_order() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        assert!(store.load(&key()).await.unwrap().is_none());

        let events = vec![commitment(0, 10), commitment(1, 10), commitment(2, 14)];
        store
            .save(CachedEventSet::new(key(), events.clone(), 20))
            .await
            .unwrap();

        let loaded = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(loaded.events, events);
        assert_eq!(loaded.last_block, 20);
        assert_eq!(store.event_count(&key()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn save_replaces_previous_set() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        store
            .save(CachedEventSet::new(key(), vec![commitment(0, 10), commitment(1, 11)], 11))
            .await
            .unwrap();
        store
            .save(CachedEventSet::new(key(), vec![commitment(0, 10)], 30))
            .await
            .unwrap();

        let loaded = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(store.cursor(&key()).await.unwrap().unwrap().last_synced_block, 30);
    }

    #[tokio::test]
    async fn extending_save_only_appends_new_rows() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let first = vec![commitment(0, 10), commitment(1, 11)];
        store.save(CachedEventSet::new(key(), first.clone(), 11)).await.unwrap();

        // mark the stored head row so a rewrite would be visible
        let marked = EventRecord::Commitment(CommitmentEvent {
            index: 0,
            commitment: format!("0x{:064x}", 0),
            block_number: 10,
            encrypted_output: "0x01".into(),
            transaction_hash: format!("0x{:064x}", 10),
        });
        sqlx::query("UPDATE stream_events SET payload = ? WHERE seq = 0")
            .bind(serde_json::to_string(&marked).unwrap())
            .execute(&store.pool)
            .await
            .unwrap();

        let mut grown = first.clone();
        grown.extend([commitment(2, 15), commitment(3, 15)]);
        store.save(CachedEventSet::new(key(), grown, 40)).await.unwrap();

        let loaded = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.events[0], marked);
        assert_eq!(loaded.events[3], commitment(3, 15));
        assert_eq!(loaded.last_block, 40);
    }

    #[tokio::test]
    async fn diverging_save_rewrites_stream() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        store
            .save(CachedEventSet::new(key(), vec![commitment(0, 10), commitment(1, 11)], 11))
            .await
            .unwrap();

        let other = vec![commitment(0, 10), commitment(1, 12), commitment(2, 13)];
        store.save(CachedEventSet::new(key(), other.clone(), 13)).await.unwrap();

        assert_eq!(store.load(&key()).await.unwrap().unwrap().events, other);
        assert_eq!(store.event_count(&key()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn empty_set_keeps_cursor() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        store.save(CachedEventSet::empty(key(), 19_097_755)).await.unwrap();

        let loaded = store.load(&key()).await.unwrap().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.last_block, 19_097_755);
    }

    #[tokio::test]
    async fn streams_and_chains_are_isolated() {
        let store = SqliteEventStore::in_memory().await.unwrap();
        let accounts = StreamKey::new(StreamKind::Accounts, 1);
        store
            .save(CachedEventSet::new(key(), vec![commitment(0, 10)], 10))
            .await
            .unwrap();
        store
            .save(CachedEventSet::new(
                accounts,
                vec![EventRecord::Account(AccountEvent {
                    key: "0xabcd".into(),
                    owner: "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".into(),
                    block_number: 13_500_000,
                })],
                13_500_010,
            ))
            .await
            .unwrap();

        let loaded = store.load(&accounts).await.unwrap().unwrap();
        assert_eq!(loaded.events[0].stream(), StreamKind::Accounts);
        assert_eq!(store.keys().await.unwrap(), vec![accounts, key()]);

        store.delete(&key()).await.unwrap();
        assert!(store.load(&key()).await.unwrap().is_none());
        assert_eq!(store.event_count(&key()).await.unwrap(), 0);
        assert!(store.load(&accounts).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteEventStore::open(path).await.unwrap();
            store
                .save(CachedEventSet::new(key(), vec![commitment(0, 10)], 12))
                .await
                .unwrap();
        }

        let store = SqliteEventStore::open(path).await.unwrap();
        let loaded = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(loaded.last_block, 12);
    }
}
