//! Error types for the poolsync pipeline.

use thiserror::Error;

use crate::events::StreamKind;

/// Marker a provider embeds in its error message when the requested range
/// runs past the newest block it has accepted.
const ACCEPTED_BLOCK_MARKER: &str = "after last accepted block ";

/// Errors that can occur while synchronizing event streams.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Decode error in '{stream}': {reason}")]
    Decode { stream: StreamKind, reason: String },

    #[error("Out-of-order event in '{stream}' at block {block_number}: {reason}")]
    OutOfOrder {
        stream: StreamKind,
        block_number: u64,
        reason: String,
    },

    #[error("Unknown chain id {0}")]
    UnknownChain(u64),

    #[error("Stream '{stream}' is not configured on chain {chain_id}")]
    StreamNotConfigured { chain_id: u64, stream: StreamKind },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    pub fn decode(stream: StreamKind, reason: impl Into<String>) -> Self {
        Self::Decode {
            stream,
            reason: reason.into(),
        }
    }

    /// If the provider refused a range because it extends past its last
    /// accepted block, returns that block number.
    pub fn accepted_block_hint(&self) -> Option<u64> {
        let Self::Rpc(message) = self else {
            return None;
        };
        let (_, tail) = message.split_once(ACCEPTED_BLOCK_MARKER)?;
        let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    /// Returns `true` if the failure came from a remote source and a later
    /// attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Graph(_))
    }

    /// Returns `true` for failures of the ordering checks run before a save.
    pub fn is_ordering_violation(&self) -> bool {
        matches!(self, Self::OutOfOrder { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_block_hint_parses_number() {
        let err = SyncError::Rpc(
            "RPC error -32000: requested to block 12400 after last accepted block 12345".into(),
        );
        assert_eq!(err.accepted_block_hint(), Some(12345));
    }

    #[test]
    fn accepted_block_hint_ignores_trailing_text() {
        let err = SyncError::Rpc("after last accepted block 77, try again".into());
        assert_eq!(err.accepted_block_hint(), Some(77));
    }

    #[test]
    fn remote_failures_are_retryable() {
        assert!(SyncError::Rpc("timeout".into()).is_retryable());
        assert!(SyncError::Graph("HTTP 503".into()).is_retryable());
        assert!(!SyncError::decode(StreamKind::Nullifiers, "bad data").is_retryable());
        assert!(!SyncError::UnknownChain(5).is_retryable());
    }

    #[test]
    fn accepted_block_hint_absent() {
        assert!(SyncError::Rpc("connection reset".into()).accepted_block_hint().is_none());
        assert!(SyncError::Storage("after last accepted block 5".into())
            .accepted_block_hint()
            .is_none());
        assert!(SyncError::Rpc("after last accepted block ".into())
            .accepted_block_hint()
            .is_none());
    }
}
