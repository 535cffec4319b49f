//! Relayer aggregator: live registration state for a batch of ENS names.
//!
//! `relayersData(bytes32[] relayers, string[] subdomains)` returns, per
//! name hash, the registrant, its stake, whether it is registered, and the
//! text record stored under each requested subdomain (up to 20).

use std::sync::Arc;

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_core::primitives::{B256, U256};

use poolsync_core::error::SyncError;
use poolsync_core::events::StreamKind;

use crate::abi::{as_address, as_string, as_uint, selector};
use crate::client::EvmRpcClient;
use crate::ens::namehash;

pub const RELAYERS_DATA: &str = "relayersData(bytes32[],string[])";

/// Fixed length of the `records` array in each result.
pub const RECORD_SLOTS: usize = 20;

/// On-chain state of one relayer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorRelayer {
    /// Checksummed registrant address.
    pub owner: String,
    pub balance: U256,
    pub is_registered: bool,
    /// Text records, indexed like the subdomain list of the request.
    pub records: Vec<String>,
}

impl AggregatorRelayer {
    pub fn record(&self, index: usize) -> &str {
        self.records.get(index).map(String::as_str).unwrap_or("")
    }
}

pub fn encode_relayers_data(ens_names: &[String], subdomains: &[String]) -> Vec<u8> {
    let hashes = ens_names
        .iter()
        .map(|name| DynSolValue::FixedBytes(B256::from(namehash(name)), 32))
        .collect();
    let keys = subdomains
        .iter()
        .map(|s| DynSolValue::String(s.clone()))
        .collect();

    let mut calldata = selector(RELAYERS_DATA).to_vec();
    calldata.extend(
        DynSolValue::Tuple(vec![DynSolValue::Array(hashes), DynSolValue::Array(keys)])
            .abi_encode_params(),
    );
    calldata
}

fn output_type() -> DynSolType {
    DynSolType::Tuple(vec![DynSolType::Array(Box::new(DynSolType::Tuple(vec![
        DynSolType::Address,
        DynSolType::Uint(256),
        DynSolType::Bool,
        DynSolType::FixedArray(Box::new(DynSolType::String), RECORD_SLOTS),
    ])))])
}

pub fn decode_relayers_data(output: &[u8]) -> Result<Vec<AggregatorRelayer>, SyncError> {
    let fail = |reason: String| SyncError::decode(StreamKind::Relayers, format!("relayersData: {reason}"));

    let decoded = output_type()
        .abi_decode_params(output)
        .map_err(|e| fail(e.to_string()))?;

    let items = match decoded {
        DynSolValue::Tuple(mut outer) if outer.len() == 1 => match outer.remove(0) {
            DynSolValue::Array(items) => items,
            other => return Err(fail(format!("expected array, got {other:?}"))),
        },
        other => return Err(fail(format!("unexpected output {other:?}"))),
    };

    items
        .into_iter()
        .map(|item| {
            let DynSolValue::Tuple(fields) = item else {
                return Err(fail("expected relayer tuple".into()));
            };
            let [owner, balance, registered, records]: [DynSolValue; 4] = fields
                .try_into()
                .map_err(|_| fail("relayer tuple has wrong arity".into()))?;

            let is_registered = match registered {
                DynSolValue::Bool(b) => b,
                other => return Err(fail(format!("expected bool, got {other:?}"))),
            };
            let records = match records {
                DynSolValue::FixedArray(values) => values
                    .into_iter()
                    .map(as_string)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(&fail)?,
                other => return Err(fail(format!("expected string[20], got {other:?}"))),
            };

            Ok(AggregatorRelayer {
                owner: as_address(owner).map_err(&fail)?,
                balance: as_uint(balance).map_err(&fail)?,
                is_registered,
                records,
            })
        })
        .collect()
}

/// Calls the aggregator contract through an [`EvmRpcClient`].
pub struct AggregatorClient {
    client: Arc<dyn EvmRpcClient>,
    address: String,
}

impl AggregatorClient {
    pub fn new(client: Arc<dyn EvmRpcClient>, address: impl Into<String>) -> Self {
        Self {
            client,
            address: address.into(),
        }
    }

    /// One result per name, in request order.
    pub async fn relayers_data(
        &self,
        ens_names: &[String],
        subdomains: &[String],
    ) -> Result<Vec<AggregatorRelayer>, SyncError> {
        if ens_names.is_empty() {
            return Ok(Vec::new());
        }
        let output = self
            .client
            .call(&self.address, encode_relayers_data(ens_names, subdomains))
            .await?;
        let relayers = decode_relayers_data(&output)?;
        if relayers.len() != ens_names.len() {
            return Err(SyncError::decode(
                StreamKind::Relayers,
                format!("asked for {} relayers, got {}", ens_names.len(), relayers.len()),
            ));
        }
        Ok(relayers)
    }
}
