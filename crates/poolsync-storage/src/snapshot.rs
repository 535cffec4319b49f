//! Zip snapshot backend.
//!
//! A snapshot of `commitments_100` is the archive `commitments_100.json.zip`
//! holding one entry, `commitments_100.json`: the stream's events as a
//! pretty-printed JSON array in ascending order. Archives carry no cursor, so
//! a loaded set is synced up to the block of its last event.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use poolsync_core::cache::{CachedEventSet, EventStore, StreamKey};
use poolsync_core::error::SyncError;
use poolsync_core::events::EventRecord;

fn storage_err(e: impl std::fmt::Display) -> SyncError {
    SyncError::Storage(e.to_string())
}

/// Directory of `{stream}_{chainId}.json.zip` archives.
#[derive(Debug, Clone)]
pub struct ZipSnapshotStore {
    dir: PathBuf,
}

impl ZipSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive path for a stream.
    pub fn archive_path(&self, key: &StreamKey) -> PathBuf {
        self.dir.join(format!("{}.json.zip", key.name()))
    }

    async fn blocking<T, F>(f: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, SyncError> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| SyncError::Storage(format!("snapshot task failed: {e}")))?
    }
}

fn read_entry(path: &Path, entry: &str) -> Result<Option<String>, SyncError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(storage_err(e)),
    };
    let mut archive = ZipArchive::new(file).map_err(storage_err)?;
    let mut content = String::new();
    archive
        .by_name(entry)
        .map_err(storage_err)?
        .read_to_string(&mut content)
        .map_err(storage_err)?;
    Ok(Some(content))
}

fn write_entry(path: &Path, entry: String, content: &[u8]) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(storage_err)?;
    }
    let partial = path.with_extension("zip.partial");
    let mut zip = ZipWriter::new(File::create(&partial).map_err(storage_err)?);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    zip.start_file(entry, options).map_err(storage_err)?;
    zip.write_all(content).map_err(storage_err)?;
    zip.finish().map_err(storage_err)?;
    std::fs::rename(&partial, path).map_err(storage_err)
}

fn parse_events(key: &StreamKey, content: &str) -> Result<Vec<EventRecord>, SyncError> {
    let values: Vec<Value> = serde_json::from_str(content).map_err(storage_err)?;
    values
        .into_iter()
        .map(|v| key.stream.record_from_value(v))
        .collect()
}

#[async_trait]
impl EventStore for ZipSnapshotStore {
    /// Missing, unreadable and empty archives all load as `None`.
    async fn load(&self, key: &StreamKey) -> Result<Option<CachedEventSet>, SyncError> {
        let path = self.archive_path(key);
        let entry = format!("{}.json", key.name());
        let read_path = path.clone();
        let content = match Self::blocking(move || read_entry(&read_path, &entry)).await {
            Ok(Some(content)) => content,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable snapshot ignored");
                return Ok(None);
            }
        };

        let events = match parse_events(key, &content) {
            Ok(events) => events,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed snapshot ignored");
                return Ok(None);
            }
        };
        let Some(last_block) = events.last().map(EventRecord::block_number) else {
            return Ok(None);
        };

        debug!(key = %key, events = events.len(), last_block, "snapshot loaded");
        Ok(Some(CachedEventSet::new(*key, events, last_block)))
    }

    async fn save(&self, set: CachedEventSet) -> Result<(), SyncError> {
        let path = self.archive_path(&set.key);
        let entry = format!("{}.json", set.key.name());
        let mut content = serde_json::to_vec_pretty(&set.events).map_err(storage_err)?;
        content.push(b'\n');

        let write_path = path.clone();
        Self::blocking(move || write_entry(&write_path, entry, &content)).await?;

        debug!(key = %set.key, events = set.events.len(), path = %path.display(), "snapshot written");
        Ok(())
    }

    async fn delete(&self, key: &StreamKey) -> Result<(), SyncError> {
        match tokio::fs::remove_file(self.archive_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(e)),
        }
    }
}
