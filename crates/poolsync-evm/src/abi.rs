//! Event signatures and the on-chain decode step for every stream.
//!
//! topic0 of an EVM log is the keccak256 hash of the canonical event
//! signature. Non-indexed parameters are ABI-encoded in `data`; the only
//! indexed parameter used here is the account owner.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_core::primitives::{Address, U256};
use tiny_keccak::{Hasher, Keccak};

use poolsync_core::error::SyncError;
use poolsync_core::events::{
    AccountEvent, CommitmentEvent, EventRecord, NullifierEvent, RelayerEvent, StreamKind,
};

use crate::log::RawLog;

pub const NEW_COMMITMENT: &str = "NewCommitment(bytes32,uint256,bytes)";
pub const NEW_NULLIFIER: &str = "NewNullifier(bytes32)";
pub const PUBLIC_KEY: &str = "PublicKey(address,bytes)";
pub const RELAYER_REGISTERED: &str = "RelayerRegistered(bytes32,string,address,uint256)";

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// `0x`-prefixed keccak256 of a signature string.
pub fn signature_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

/// First four bytes of keccak256 of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn event_signature(stream: StreamKind) -> &'static str {
    match stream {
        StreamKind::Commitments => NEW_COMMITMENT,
        StreamKind::Nullifiers => NEW_NULLIFIER,
        StreamKind::Accounts => PUBLIC_KEY,
        StreamKind::Relayers => RELAYER_REGISTERED,
    }
}

pub fn event_topic(stream: StreamKind) -> String {
    signature_topic(event_signature(stream))
}

/// Types of the non-indexed parameters, in declaration order.
fn data_types(stream: StreamKind) -> Vec<DynSolType> {
    match stream {
        StreamKind::Commitments => vec![
            DynSolType::FixedBytes(32),
            DynSolType::Uint(256),
            DynSolType::Bytes,
        ],
        StreamKind::Nullifiers => vec![DynSolType::FixedBytes(32)],
        StreamKind::Accounts => vec![DynSolType::Bytes],
        StreamKind::Relayers => vec![
            DynSolType::FixedBytes(32),
            DynSolType::String,
            DynSolType::Address,
            DynSolType::Uint(256),
        ],
    }
}

/// Decode one log into the stream's record shape.
pub fn decode_log(stream: StreamKind, log: &RawLog) -> Result<EventRecord, SyncError> {
    let fail = |reason: String| SyncError::decode(stream, reason);

    let block_number = log
        .block_number_u64()
        .ok_or_else(|| fail(format!("invalid block number '{}'", log.block_number)))?;

    let expected = event_topic(stream);
    match log.topic0() {
        Some(topic) if topic.eq_ignore_ascii_case(&expected) => {}
        other => return Err(fail(format!("unexpected topic0 {other:?}"))),
    }

    let data = decode_hex(&log.data).map_err(|e| fail(format!("invalid data hex: {e}")))?;
    let values = match DynSolType::Tuple(data_types(stream))
        .abi_decode_params(&data)
        .map_err(|e| fail(e.to_string()))?
    {
        DynSolValue::Tuple(values) => values,
        other => vec![other],
    };
    let mut fields = values.into_iter();
    let mut next = || fields.next().ok_or_else(|| fail("missing event field".into()));

    let record = match stream {
        StreamKind::Commitments => EventRecord::Commitment(CommitmentEvent {
            commitment: as_word(next()?).map_err(&fail)?,
            index: as_u64(next()?).map_err(&fail)?,
            encrypted_output: as_bytes(next()?).map_err(&fail)?,
            block_number,
            transaction_hash: log.tx_hash.clone(),
        }),
        StreamKind::Nullifiers => EventRecord::Nullifier(NullifierEvent {
            nullifier: as_word(next()?).map_err(&fail)?,
            block_number,
            transaction_hash: log.tx_hash.clone(),
        }),
        StreamKind::Accounts => {
            let owner_topic = log
                .topics
                .get(1)
                .ok_or_else(|| fail("missing indexed owner".into()))?;
            EventRecord::Account(AccountEvent {
                owner: topic_address(owner_topic).map_err(&fail)?,
                key: as_bytes(next()?).map_err(&fail)?,
                block_number,
            })
        }
        StreamKind::Relayers => {
            let _relayer_hash = next()?;
            EventRecord::Relayer(RelayerEvent {
                ens_name: as_string(next()?).map_err(&fail)?,
                relayer_address: as_address(next()?).map_err(&fail)?,
                block_registration: block_number,
            })
        }
    };
    Ok(record)
}

pub(crate) fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
}

fn as_word(value: DynSolValue) -> Result<String, String> {
    match value {
        DynSolValue::FixedBytes(word, _) => Ok(format!("0x{}", hex::encode(word.as_slice()))),
        other => Err(format!("expected bytes32, got {other:?}")),
    }
}

fn as_bytes(value: DynSolValue) -> Result<String, String> {
    match value {
        DynSolValue::Bytes(bytes) => Ok(format!("0x{}", hex::encode(bytes))),
        other => Err(format!("expected bytes, got {other:?}")),
    }
}

pub(crate) fn as_string(value: DynSolValue) -> Result<String, String> {
    match value {
        DynSolValue::String(s) => Ok(s),
        other => Err(format!("expected string, got {other:?}")),
    }
}

pub(crate) fn as_address(value: DynSolValue) -> Result<String, String> {
    match value {
        DynSolValue::Address(address) => Ok(address.to_checksum(None)),
        other => Err(format!("expected address, got {other:?}")),
    }
}

pub(crate) fn as_uint(value: DynSolValue) -> Result<U256, String> {
    match value {
        DynSolValue::Uint(v, _) => Ok(v),
        other => Err(format!("expected uint, got {other:?}")),
    }
}

fn as_u64(value: DynSolValue) -> Result<u64, String> {
    let v = as_uint(value)?;
    if v.bit_len() > 64 {
        return Err(format!("{v} does not fit in u64"));
    }
    Ok(v.as_limbs()[0])
}

/// Checksummed address held in the low 20 bytes of an indexed topic.
fn topic_address(topic: &str) -> Result<String, String> {
    let bytes = decode_hex(topic).map_err(|e| format!("invalid topic hex: {e}"))?;
    if bytes.len() != 32 {
        return Err(format!("topic is {} bytes", bytes.len()));
    }
    Ok(Address::from_slice(&bytes[12..]).to_checksum(None))
}
