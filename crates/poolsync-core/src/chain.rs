//! Chain registry: static descriptors for every supported network.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::events::StreamKind;

pub const MAINNET: u64 = 1;
pub const BSC: u64 = 56;
pub const XDAI: u64 = 100;

/// Registry indexer shared by every chain (relayers register on mainnet).
pub const REGISTRY_GRAPH_URL: &str =
    "https://api.thegraph.com/subgraphs/name/tornadocash/tornado-relayer-registry";

/// Contract addresses deployed on a chain. Absent contracts are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAddresses {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_helper: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relayer_registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<String>,
}

/// Everything needed to sync one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    #[serde(default)]
    pub fallback_rpc_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_url: Option<String>,
    /// Lower bound for every query on this chain.
    pub deploy_block: u64,
    pub block_duration_ms: u64,
    pub ens_subdomain_key: String,
    #[serde(default)]
    pub contracts: ContractAddresses,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_deploy_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_graph_url: Option<String>,
}

impl ChainDescriptor {
    /// Contract emitting the given stream's events on this chain.
    ///
    /// Accounts come from the bridge helper when one is deployed, otherwise
    /// from the pool itself.
    pub fn stream_contract(&self, stream: StreamKind) -> Result<&str, SyncError> {
        let address = match stream {
            StreamKind::Commitments | StreamKind::Nullifiers => self.contracts.pool.as_deref(),
            StreamKind::Accounts => self
                .contracts
                .bridge_helper
                .as_deref()
                .or(self.contracts.pool.as_deref()),
            StreamKind::Relayers => self.contracts.relayer_registry.as_deref(),
        };
        address.ok_or(SyncError::StreamNotConfigured {
            chain_id: self.chain_id,
            stream,
        })
    }

    /// Returns `true` if the stream has a source contract on this chain.
    pub fn supports(&self, stream: StreamKind) -> bool {
        self.stream_contract(stream).is_ok()
    }

    /// Streams of [`StreamKind::POOL`] available on this chain.
    pub fn pool_streams(&self) -> Vec<StreamKind> {
        StreamKind::POOL
            .into_iter()
            .filter(|s| self.supports(*s))
            .collect()
    }

    /// First block any sync of `stream` may cover.
    pub fn start_block(&self, stream: StreamKind) -> u64 {
        match (stream, self.registry_deploy_block) {
            (StreamKind::Relayers, Some(block)) => block,
            _ => self.deploy_block,
        }
    }

    /// Indexer endpoint serving `stream`, if any.
    pub fn graph_url_for(&self, stream: StreamKind) -> Option<&str> {
        match stream {
            StreamKind::Relayers => self.registry_graph_url.as_deref(),
            _ => self.graph_url.as_deref(),
        }
    }

    /// RPC endpoints in the order they should be tried.
    pub fn rpc_urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.rpc_url.as_str()).chain(self.fallback_rpc_urls.iter().map(String::as_str))
    }
}

/// Static map of supported chains, keyed by chain id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRegistry {
    chains: BTreeMap<u64, ChainDescriptor>,
}

impl ChainRegistry {
    pub fn new(chains: impl IntoIterator<Item = ChainDescriptor>) -> Self {
        Self {
            chains: chains.into_iter().map(|c| (c.chain_id, c)).collect(),
        }
    }

    /// The networks the pool is deployed to.
    pub fn builtin() -> Self {
        Self::new([
            ChainDescriptor {
                chain_id: MAINNET,
                name: "Ethereum Mainnet".into(),
                rpc_url: "https://tornadocash-rpc.com/mainnet".into(),
                fallback_rpc_urls: vec!["https://rpc.mevblocker.io".into()],
                graph_url: Some(
                    "https://tornadocash-rpc.com/subgraphs/name/tornadocash/mainnet-tornado-pool-subgraph"
                        .into(),
                ),
                deploy_block: 13_494_216,
                block_duration_ms: 15_000,
                ens_subdomain_key: "mainnet-tornado".into(),
                contracts: ContractAddresses {
                    pool: None,
                    bridge_helper: Some("0xCa0840578f57fE71599D29375e16783424023357".into()),
                    relayer_registry: Some("0x58E8dCC13BE9780fC42E8723D8EaD4CF46943dF2".into()),
                    aggregator: Some("0xE8F47A78A6D52D317D0D2FFFac56739fE14D1b49".into()),
                },
                registry_deploy_block: Some(14_173_129),
                registry_graph_url: Some(REGISTRY_GRAPH_URL.into()),
            },
            ChainDescriptor {
                chain_id: BSC,
                name: "Binance Smart Chain".into(),
                rpc_url: "https://tornadocash-rpc.com/bsc".into(),
                fallback_rpc_urls: vec!["https://binance.nodereal.io".into()],
                graph_url: Some(
                    "https://api.thegraph.com/subgraphs/name/dan1kov/bsc-tornado-pool-subgraph".into(),
                ),
                deploy_block: 14_931_075,
                block_duration_ms: 3_000,
                ens_subdomain_key: "bsc-tornado".into(),
                contracts: ContractAddresses {
                    bridge_helper: Some("0x8845F740F8B01bC7D9A4C82a6fD4A60320c07AF1".into()),
                    ..ContractAddresses::default()
                },
                registry_deploy_block: None,
                registry_graph_url: None,
            },
            ChainDescriptor {
                chain_id: XDAI,
                name: "Gnosis Chain".into(),
                rpc_url: "https://tornadocash-rpc.com/gnosis".into(),
                fallback_rpc_urls: vec!["https://tornadocash-rpc.com/gnosis".into()],
                graph_url: Some(
                    "https://tornadocash-rpc.com/subgraphs/name/tornadocash/gnosis-tornado-nova-subgraph"
                        .into(),
                ),
                deploy_block: 19_097_755,
                block_duration_ms: 3_000,
                ens_subdomain_key: "gnosis-nova".into(),
                contracts: ContractAddresses {
                    pool: Some("0xD692Fd2D0b2Fbd2e52CFa5B5b9424bC981C30696".into()),
                    ..ContractAddresses::default()
                },
                registry_deploy_block: None,
                registry_graph_url: None,
            },
        ])
    }

    /// Parse a registry from a JSON array of descriptors.
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        let chains: Vec<ChainDescriptor> =
            serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))?;
        Ok(Self::new(chains))
    }

    pub fn get(&self, chain_id: u64) -> Result<&ChainDescriptor, SyncError> {
        self.chains
            .get(&chain_id)
            .ok_or(SyncError::UnknownChain(chain_id))
    }

    /// Descriptors in ascending chain-id order.
    pub fn chains(&self) -> impl Iterator<Item = &ChainDescriptor> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// ENS subdomain keys in ascending chain-id order; the position of a key
    /// is its record index in aggregator responses.
    pub fn subdomains(&self) -> Vec<String> {
        self.chains
            .values()
            .map(|c| c.ens_subdomain_key.clone())
            .collect()
    }

    pub fn subdomain_index(&self, key: &str) -> Option<usize> {
        self.chains
            .values()
            .position(|c| c.ens_subdomain_key == key)
    }

    /// The chain hosting the relayer registry and aggregator.
    pub fn registry_chain(&self) -> Result<&ChainDescriptor, SyncError> {
        self.chains
            .values()
            .find(|c| c.contracts.relayer_registry.is_some() && c.contracts.aggregator.is_some())
            .ok_or_else(|| SyncError::Config("no chain hosts the relayer registry".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_three_chains() {
        let registry = ChainRegistry::builtin();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(XDAI).unwrap().deploy_block, 19_097_755);
        assert!(matches!(registry.get(5), Err(SyncError::UnknownChain(5))));
    }

    #[test]
    fn subdomains_sorted_by_chain_id() {
        let registry = ChainRegistry::builtin();
        assert_eq!(
            registry.subdomains(),
            vec!["mainnet-tornado", "bsc-tornado", "gnosis-nova"]
        );
        assert_eq!(registry.subdomain_index("mainnet-tornado"), Some(0));
        assert_eq!(registry.subdomain_index("gnosis-nova"), Some(2));
        assert_eq!(registry.subdomain_index("polygon"), None);
    }

    #[test]
    fn stream_contracts_per_chain() {
        let registry = ChainRegistry::builtin();
        let xdai = registry.get(XDAI).unwrap();
        assert_eq!(xdai.pool_streams(), StreamKind::POOL.to_vec());
        assert!(!xdai.supports(StreamKind::Relayers));

        let mainnet = registry.get(MAINNET).unwrap();
        assert_eq!(mainnet.pool_streams(), vec![StreamKind::Accounts]);
        assert_eq!(
            mainnet.stream_contract(StreamKind::Accounts).unwrap(),
            "0xCa0840578f57fE71599D29375e16783424023357"
        );
        assert!(matches!(
            mainnet.stream_contract(StreamKind::Commitments),
            Err(SyncError::StreamNotConfigured { chain_id: 1, .. })
        ));
    }

    #[test]
    fn relayer_stream_uses_registry_bounds() {
        let registry = ChainRegistry::builtin();
        let mainnet = registry.registry_chain().unwrap();
        assert_eq!(mainnet.chain_id, MAINNET);
        assert_eq!(mainnet.start_block(StreamKind::Relayers), 14_173_129);
        assert_eq!(mainnet.start_block(StreamKind::Accounts), 13_494_216);
        assert_eq!(mainnet.graph_url_for(StreamKind::Relayers), Some(REGISTRY_GRAPH_URL));
    }

    #[test]
    fn registry_from_json() {
        let json = r#"[{
            "chainId": 31337,
            "name": "devnet",
            "rpcUrl": "http://localhost:8545",
            "deployBlock": 10,
            "blockDurationMs": 1000,
            "ensSubdomainKey": "devnet",
            "contracts": { "pool": "0x0000000000000000000000000000000000000001" }
        }]"#;
        let registry = ChainRegistry::from_json(json).unwrap();
        let devnet = registry.get(31337).unwrap();
        assert!(devnet.fallback_rpc_urls.is_empty());
        assert!(devnet.graph_url_for(StreamKind::Commitments).is_none());
        assert_eq!(devnet.rpc_urls().collect::<Vec<_>>(), vec!["http://localhost:8545"]);

        assert!(ChainRegistry::from_json("{not json").is_err());
    }
}
