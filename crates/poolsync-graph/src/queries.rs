//! GraphQL documents, one per stream.
//!
//! Every page query orders ascending by the stream's block field, filters
//! with `<field>_gte: $fromBlock` and asks for the indexer head in the same
//! request so a page and its `_meta` block are consistent.

use poolsync_core::events::StreamKind;

pub const GET_COMMITMENTS: &str = r#"
  query getCommitments($first: Int, $fromBlock: Int) {
    commitments(first: $first, orderBy: blockNumber, orderDirection: asc, where: {
      blockNumber_gte: $fromBlock
    }) {
      id
      index
      commitment
      blockNumber
      encryptedOutput
      transactionHash
    }
    _meta {
      block {
        number
      }
    }
  }
"#;

pub const GET_NULLIFIERS: &str = r#"
  query getNullifiers($first: Int, $fromBlock: Int) {
    nullifiers(first: $first, orderBy: blockNumber, orderDirection: asc, where: {
      blockNumber_gte: $fromBlock
    }) {
      id
      nullifier
      blockNumber
      transactionHash
    }
    _meta {
      block {
        number
      }
    }
  }
"#;

pub const GET_ACCOUNTS: &str = r#"
  query getAccounts($first: Int, $fromBlock: Int) {
    accounts(first: $first, orderBy: blockNumber, orderDirection: asc, where: {
      blockNumber_gte: $fromBlock
    }) {
      id
      key
      owner
      blockNumber
    }
    _meta {
      block {
        number
      }
    }
  }
"#;

pub const GET_REGISTERED: &str = r#"
  query getRegistered($first: Int, $fromBlock: Int) {
    relayers(first: $first, orderBy: blockRegistration, orderDirection: asc, where: {
      blockRegistration_gte: $fromBlock
    }) {
      address
      ensName
      ensHash
      blockRegistration
    }
    _meta {
      block {
        number
      }
    }
  }
"#;

pub fn stream_query(stream: StreamKind) -> &'static str {
    match stream {
        StreamKind::Commitments => GET_COMMITMENTS,
        StreamKind::Nullifiers => GET_NULLIFIERS,
        StreamKind::Accounts => GET_ACCOUNTS,
        StreamKind::Relayers => GET_REGISTERED,
    }
}

/// Top-level field holding the rows of `stream`.
pub fn root_field(stream: StreamKind) -> &'static str {
    stream.as_str()
}
