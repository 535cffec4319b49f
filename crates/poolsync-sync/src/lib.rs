//! poolsync-sync: keeps cached event streams in step with the chain.
//!
//! - [`reconciler::EventReconciler`] merges cache, indexer and `eth_getLogs`
//!   results for one chain
//! - [`relayer::RelayerResolver`] maintains the relayer registry and
//!   validates relayers against the aggregator
//! - [`builder::SyncerBuilder`] wires both from a [`poolsync_core::SyncConfig`]

pub mod builder;
pub mod reconciler;
pub mod relayer;

#[cfg(test)]
mod testing;

pub use builder::{Syncer, SyncerBuilder};
pub use reconciler::{EventReconciler, SyncReport};
pub use relayer::{RelayerResolver, ValidRelayer};
