//! poolsync-core: foundation for the shielded-pool event sync engine.
//!
//! # Architecture
//!
//! ```text
//! ChainRegistry ─┬─ EventStore      (cached sets + cursors per stream)
//!                ├─ GraphFetcher    (paginated indexer queries)
//!                └─ BatchLogFetcher (windowed eth_getLogs)
//!                        │
//!                  EventReconciler ── RelayerResolver
//! ```

pub mod cache;
pub mod chain;
pub mod config;
pub mod cursor;
pub mod error;
pub mod events;
pub mod window;

pub use cache::{CachedEventSet, EventStore, MemoryEventStore, StreamKey};
pub use chain::{ChainDescriptor, ChainRegistry, ContractAddresses};
pub use config::{BatchConfig, GraphConfig, LogConfig, RelayerConfig, RpcConfig, StorageConfig, SyncConfig};
pub use cursor::SyncCursor;
pub use error::SyncError;
pub use events::{
    normalize_address, AccountEvent, CommitmentEvent, EventRecord, NullifierEvent, RelayerEvent,
    StreamKind,
};
pub use window::{split_range, FetchWindow};
