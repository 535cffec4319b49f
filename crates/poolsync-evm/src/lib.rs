//! poolsync-evm: on-chain side of the sync engine.
//!
//! - [`client`]: `EvmRpcClient` trait and its JSON-RPC implementation
//! - [`batch`]: windowed, retrying `eth_getLogs` fetcher
//! - [`abi`]: event signatures and per-stream log decoding
//! - [`aggregator`]: relayer aggregator calls
//! - [`ens`]: namehash

pub mod abi;
pub mod aggregator;
pub mod batch;
pub mod client;
pub mod ens;
pub mod log;

pub use abi::{decode_log, event_topic};
pub use aggregator::{AggregatorClient, AggregatorRelayer};
pub use batch::{BatchLogFetcher, LogBatch};
pub use client::{EvmRpcClient, JsonRpcEvmClient};
pub use ens::namehash;
pub use log::{parse_hex_u64, LogFilter, RawLog};
