//! Raw `eth_getLogs` records and the filter that selects them.

use serde::{Deserialize, Serialize};

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "transactionHash", default)]
    pub tx_hash: String,
    #[serde(rename = "logIndex", default)]
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    /// Block number as u64 (`None` when the node sent a malformed value).
    pub fn block_number_u64(&self) -> Option<u64> {
        parse_hex_u64(&self.block_number)
    }

    /// Returns `true` if this log was dropped by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }
}

/// Selects one event of one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub address: String,
    /// keccak256 of the event signature, `0x`-prefixed.
    pub topic0: String,
}

impl LogFilter {
    pub fn new(address: impl Into<String>, topic0: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            topic0: topic0.into(),
        }
    }

    /// `eth_getLogs` parameter object for `[from, to]`.
    pub fn to_params(&self, from: u64, to: u64) -> serde_json::Value {
        serde_json::json!({
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
            "address": self.address,
            "topics": [self.topic0],
        })
    }
}

/// Parse a hex-encoded string (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_u64_basic() {
        assert_eq!(parse_hex_u64("0x1"), Some(1));
        assert_eq!(parse_hex_u64("0xff"), Some(255));
        assert_eq!(parse_hex_u64("1234"), Some(0x1234));
        assert_eq!(parse_hex_u64("0xzz"), None);
    }

    #[test]
    fn raw_log_from_node_json() {
        let log: RawLog = serde_json::from_value(serde_json::json!({
            "address": "0xd692fd2d0b2fbd2e52cfa5b5b9424bc981c30696",
            "topics": ["0xabc"],
            "data": "0x",
            "blockNumber": "0x12a05f200",
            "blockHash": "0x0",
            "transactionHash": "0x01",
            "logIndex": "0x5",
            "removed": false
        }))
        .unwrap();
        assert_eq!(log.block_number_u64(), Some(5_000_000_000));
        assert_eq!(log.topic0(), Some("0xabc"));
        assert!(!log.is_removed());
    }

    #[test]
    fn filter_params_hex_encode_range() {
        let filter = LogFilter::new("0xpool", "0xtopic");
        let params = filter.to_params(255, 4096);
        assert_eq!(params["fromBlock"], "0xff");
        assert_eq!(params["toBlock"], "0x1000");
        assert_eq!(params["topics"][0], "0xtopic");
    }
}
