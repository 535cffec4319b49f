//! poolsync-rpc: JSON-RPC plumbing for the sync engine.
//!
//! - [`transport::RpcTransport`]: the async endpoint trait
//! - [`http::HttpRpcClient`]: `reqwest` endpoint
//! - [`fallback::FallbackTransport`]: primary + ordered fallbacks
//! - [`retry::RetryPolicy`]: fixed-interval retry used by batched fetches

pub mod error;
pub mod fallback;
pub mod http;
pub mod request;
pub mod retry;
pub mod transport;

pub use error::TransportError;
pub use fallback::FallbackTransport;
pub use http::HttpRpcClient;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use retry::RetryPolicy;
pub use transport::{call, RpcTransport};
