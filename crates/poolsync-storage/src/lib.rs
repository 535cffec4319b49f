//! poolsync-storage: storage backends for cached event sets.
//!
//! Backends:
//! - [`MemoryEventStore`]: in-memory (tests, no persistence)
//! - [`sqlite`]: SQLite via `sqlx`, the hot tier
//! - [`snapshot`]: zip-compressed JSON archives, the cold tier
//! - [`tiered`]: hot store seeded from and exported to the cold tier

pub mod snapshot;
pub mod tiered;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use poolsync_core::cache::MemoryEventStore;
pub use snapshot::ZipSnapshotStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEventStore;
pub use tiered::TieredEventStore;
