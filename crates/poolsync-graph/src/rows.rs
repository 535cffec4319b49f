//! Indexer rows and their decode step into [`EventRecord`].
//!
//! Subgraphs serialize `BigInt` as strings; block numbers and indices are
//! accepted as JSON numbers, decimal strings or `0x` hex strings.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use poolsync_core::error::SyncError;
use poolsync_core::events::{
    normalize_address, AccountEvent, CommitmentEvent, EventRecord, NullifierEvent, RelayerEvent,
    StreamKind,
};

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(d)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16),
                None => s.parse(),
            };
            parsed.map_err(|e| serde::de::Error::custom(format!("invalid number '{s}': {e}")))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitmentRow {
    #[serde(deserialize_with = "lenient_u64")]
    index: u64,
    commitment: String,
    #[serde(deserialize_with = "lenient_u64")]
    block_number: u64,
    encrypted_output: String,
    transaction_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NullifierRow {
    nullifier: String,
    #[serde(deserialize_with = "lenient_u64")]
    block_number: u64,
    transaction_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountRow {
    key: String,
    owner: String,
    #[serde(deserialize_with = "lenient_u64")]
    block_number: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayerRow {
    address: String,
    ens_name: String,
    #[serde(deserialize_with = "lenient_u64")]
    block_registration: u64,
}

fn parse<T: serde::de::DeserializeOwned>(stream: StreamKind, row: Value) -> Result<T, SyncError> {
    serde_json::from_value(row).map_err(|e| SyncError::decode(stream, format!("graph row: {e}")))
}

/// Decode one indexer row of `stream`.
pub fn decode_row(stream: StreamKind, row: Value) -> Result<EventRecord, SyncError> {
    let record = match stream {
        StreamKind::Commitments => {
            let r: CommitmentRow = parse(stream, row)?;
            EventRecord::Commitment(CommitmentEvent {
                index: r.index,
                commitment: r.commitment,
                block_number: r.block_number,
                encrypted_output: r.encrypted_output,
                transaction_hash: r.transaction_hash,
            })
        }
        StreamKind::Nullifiers => {
            let r: NullifierRow = parse(stream, row)?;
            EventRecord::Nullifier(NullifierEvent {
                nullifier: r.nullifier,
                block_number: r.block_number,
                transaction_hash: r.transaction_hash,
            })
        }
        StreamKind::Accounts => {
            let r: AccountRow = parse(stream, row)?;
            EventRecord::Account(AccountEvent {
                key: r.key,
                owner: normalize_address(&r.owner)
                    .map_err(|e| SyncError::decode(stream, e.to_string()))?,
                block_number: r.block_number,
            })
        }
        StreamKind::Relayers => {
            let r: RelayerRow = parse(stream, row)?;
            EventRecord::Relayer(RelayerEvent {
                ens_name: r.ens_name,
                relayer_address: normalize_address(&r.address)
                    .map_err(|e| SyncError::decode(stream, e.to_string()))?,
                block_registration: r.block_registration,
            })
        }
    };
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commitment_row_with_string_numbers() {
        let record = decode_row(
            StreamKind::Commitments,
            json!({
                "id": "0xabc-1",
                "index": "17",
                "commitment": "0x01",
                "blockNumber": "19100000",
                "encryptedOutput": "0x02",
                "transactionHash": "0x03"
            }),
        )
        .unwrap();
        assert_eq!(record.commitment_index(), Some(17));
        assert_eq!(record.block_number(), 19_100_000);
    }

    #[test]
    fn account_owner_is_checksummed() {
        let record = decode_row(
            StreamKind::Accounts,
            json!({
                "id": "1",
                "key": "0xkey",
                "owner": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
                "blockNumber": 13500000
            }),
        )
        .unwrap();
        let EventRecord::Account(account) = record else {
            panic!("expected account");
        };
        assert_eq!(account.owner, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
    }

    #[test]
    fn relayer_row_maps_address() {
        let record = decode_row(
            StreamKind::Relayers,
            json!({
                "address": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
                "ensName": "relayer.eth",
                "ensHash": "0x00",
                "blockRegistration": "0xd8433a"
            }),
        )
        .unwrap();
        let relayer = record.as_relayer().unwrap();
        assert_eq!(relayer.ens_name, "relayer.eth");
        assert_eq!(relayer.block_registration, 0xd8433a);
    }

    #[test]
    fn malformed_row_is_decode_error() {
        let err = decode_row(StreamKind::Nullifiers, json!({ "nullifier": "0x1", "blockNumber": "x1" }))
            .unwrap_err();
        assert!(matches!(err, SyncError::Decode { stream: StreamKind::Nullifiers, .. }));
    }
}
