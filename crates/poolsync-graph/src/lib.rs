//! poolsync-graph: indexer side of the sync engine.
//!
//! Streams are read forward from a subgraph in block order. The fetcher
//! never fails outright: an unusable indexer is reported as
//! [`GraphOutcome::Unavailable`] and the caller falls back to the chain.

pub mod client;
pub mod fetcher;
pub mod queries;
pub mod rows;

pub use client::{GraphTransport, HttpGraphClient};
pub use fetcher::{GraphFetcher, GraphOutcome};
pub use rows::decode_row;
