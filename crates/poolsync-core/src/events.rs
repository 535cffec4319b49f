//! Event records produced by every source, one shape per stream.
//!
//! Records serialize with camelCase keys so cached sets, snapshot archives
//! and indexer rows share a single JSON layout.

use std::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// A logical event stream kept in sync per chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Commitments,
    Nullifiers,
    Accounts,
    Relayers,
}

impl StreamKind {
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Commitments,
        StreamKind::Nullifiers,
        StreamKind::Accounts,
        StreamKind::Relayers,
    ];

    /// Streams synchronized per chain by the reconciler.
    pub const POOL: [StreamKind; 3] = [
        StreamKind::Commitments,
        StreamKind::Nullifiers,
        StreamKind::Accounts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commitments => "commitments",
            Self::Nullifiers => "nullifiers",
            Self::Accounts => "accounts",
            Self::Relayers => "relayers",
        }
    }

    /// Name of the block-number field this stream is ordered by.
    pub fn block_field(&self) -> &'static str {
        match self {
            Self::Relayers => "blockRegistration",
            _ => "blockNumber",
        }
    }

    /// Decode one JSON object into this stream's record shape.
    pub fn record_from_value(&self, value: Value) -> Result<EventRecord, SyncError> {
        let decoded = match self {
            Self::Commitments => serde_json::from_value(value).map(EventRecord::Commitment),
            Self::Nullifiers => serde_json::from_value(value).map(EventRecord::Nullifier),
            Self::Accounts => serde_json::from_value(value).map(EventRecord::Account),
            Self::Relayers => serde_json::from_value(value).map(EventRecord::Relayer),
        };
        decoded.map_err(|e| SyncError::decode(*self, e.to_string()))
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SyncError::Config(format!("unknown stream '{s}'")))
    }
}

/// A shielded output appended to the pool's commitment tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentEvent {
    /// Leaf position in the tree; the authoritative ordering key.
    pub index: u64,
    pub commitment: String,
    pub block_number: u64,
    pub encrypted_output: String,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NullifierEvent {
    pub nullifier: String,
    pub block_number: u64,
    pub transaction_hash: String,
}

/// A registered shielded-account public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEvent {
    pub key: String,
    /// Checksummed owner address.
    pub owner: String,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerEvent {
    pub ens_name: String,
    /// Checksummed relayer address.
    pub relayer_address: String,
    pub block_registration: u64,
}

/// One event from any stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventRecord {
    Commitment(CommitmentEvent),
    Nullifier(NullifierEvent),
    Account(AccountEvent),
    Relayer(RelayerEvent),
}

impl EventRecord {
    pub fn stream(&self) -> StreamKind {
        match self {
            Self::Commitment(_) => StreamKind::Commitments,
            Self::Nullifier(_) => StreamKind::Nullifiers,
            Self::Account(_) => StreamKind::Accounts,
            Self::Relayer(_) => StreamKind::Relayers,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            Self::Commitment(e) => e.block_number,
            Self::Nullifier(e) => e.block_number,
            Self::Account(e) => e.block_number,
            Self::Relayer(e) => e.block_registration,
        }
    }

    /// Tree index for commitment records.
    pub fn commitment_index(&self) -> Option<u64> {
        match self {
            Self::Commitment(e) => Some(e.index),
            _ => None,
        }
    }

    pub fn as_relayer(&self) -> Option<&RelayerEvent> {
        match self {
            Self::Relayer(e) => Some(e),
            _ => None,
        }
    }
}

/// Normalize any-case hex address to its EIP-55 checksummed form.
pub fn normalize_address(raw: &str) -> Result<String, SyncError> {
    let address = Address::from_str(raw.trim())
        .map_err(|e| SyncError::Other(format!("invalid address '{raw}': {e}")))?;
    Ok(address.to_checksum(None))
}
