//! Relayer registry resolver.
//!
//! Registrations are cached like any other stream (`relayers_{chainId}`),
//! topped up from the registry indexer and, when the indexer is missing or
//! behind, from `RelayerRegistered` logs. Every cached relayer is then
//! checked against live aggregator state before it is offered.

use std::str::FromStr;
use std::sync::Arc;

use alloy_core::primitives::U256;
use serde::Serialize;
use tracing::{debug, info, warn};

use poolsync_core::cache::{CachedEventSet, EventStore, StreamKey};
use poolsync_core::chain::ChainRegistry;
use poolsync_core::config::RelayerConfig;
use poolsync_core::error::SyncError;
use poolsync_core::events::{EventRecord, RelayerEvent, StreamKind};
use poolsync_evm::abi::{decode_log, event_topic};
use poolsync_evm::aggregator::{AggregatorClient, AggregatorRelayer};
use poolsync_evm::client::EvmRpcClient;
use poolsync_evm::log::LogFilter;
use poolsync_graph::{GraphFetcher, GraphOutcome};

/// A relayer that passed validation for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidRelayer {
    pub relayer_address: String,
    /// `{subdomainKey}.{ensName}`
    pub ens_name: String,
    /// `{scheme}//{record}`
    pub hostname: String,
}

pub struct RelayerResolver {
    chain_id: u64,
    registry_address: String,
    start_block: u64,
    graph_url: Option<String>,
    subdomains: Vec<String>,
    client: Arc<dyn EvmRpcClient>,
    aggregator: AggregatorClient,
    store: Arc<dyn EventStore>,
    graph: Option<Arc<GraphFetcher>>,
    min_stake: U256,
    scheme: String,
}

impl RelayerResolver {
    /// `client` must talk to the chain hosting the registry.
    pub fn new(
        registry: &ChainRegistry,
        client: Arc<dyn EvmRpcClient>,
        store: Arc<dyn EventStore>,
        graph: Option<Arc<GraphFetcher>>,
        config: &RelayerConfig,
    ) -> Result<Self, SyncError> {
        let chain = registry.registry_chain()?;
        let registry_address = chain.stream_contract(StreamKind::Relayers)?.to_string();
        let aggregator_address = chain
            .contracts
            .aggregator
            .clone()
            .ok_or_else(|| SyncError::Config(format!("chain {} has no aggregator", chain.chain_id)))?;
        let min_stake = U256::from_str(&config.min_stake)
            .map_err(|e| SyncError::Config(format!("invalid min_stake '{}': {e}", config.min_stake)))?;

        Ok(Self {
            chain_id: chain.chain_id,
            registry_address,
            start_block: chain.start_block(StreamKind::Relayers),
            graph_url: chain.graph_url_for(StreamKind::Relayers).map(str::to_string),
            subdomains: registry.subdomains(),
            aggregator: AggregatorClient::new(client.clone(), aggregator_address),
            client,
            store,
            graph,
            min_stake,
            scheme: config.scheme.clone(),
        })
    }

    /// Relayers currently serving the chain behind `subdomain_key`.
    pub async fn get_relayers(&self, subdomain_key: &str) -> Result<Vec<ValidRelayer>, SyncError> {
        let subdomain_index = self
            .subdomains
            .iter()
            .position(|s| s == subdomain_key)
            .ok_or_else(|| SyncError::Config(format!("unknown ENS subdomain '{subdomain_key}'")))?;

        let relayers = self.fetch_relayers().await?;
        let valid = self.validate(&relayers, subdomain_key, subdomain_index).await?;

        info!(subdomain = subdomain_key, registered = relayers.len(), valid = valid.len(), "relayers resolved");
        Ok(valid)
    }

    /// All cached registrations, topped up to the current head.
    pub async fn fetch_relayers(&self) -> Result<Vec<RelayerEvent>, SyncError> {
        let key = StreamKey::new(StreamKind::Relayers, self.chain_id);
        let block_to = self.client.block_number().await?;
        let cached = self.store.load(&key).await?;

        let mut block_from = match &cached {
            Some(set) if block_to > set.last_block => set.last_block + 1,
            Some(_) => block_to,
            None => self.start_block,
        };
        let (mut events, prev_last) = match cached {
            Some(set) => (set.events, Some(set.last_block)),
            None => (Vec::new(), None),
        };

        if block_from == block_to {
            debug!(block_to, "relayer cache is current");
            return Ok(relayer_events(&events));
        }

        let outcome = match (&self.graph, &self.graph_url) {
            (Some(graph), Some(url)) => graph.fetch_all(url, StreamKind::Relayers, block_from).await,
            _ => GraphOutcome::Unavailable {
                reason: "no registry indexer configured".into(),
            },
        };

        let cursor = match outcome {
            GraphOutcome::Synced {
                events: indexed,
                last_sync_block,
            } => {
                let late = block_to >= last_sync_block;
                if late {
                    // an indexer behind the cache must not pull cached blocks back in
                    block_from = block_from.max(last_sync_block);
                }
                let indexed_empty = indexed.is_empty();
                events.extend(indexed);
                if indexed_empty || late {
                    events.extend(self.fetch_registered(block_from, block_to).await?);
                    block_to
                } else {
                    last_sync_block - 1
                }
            }
            GraphOutcome::Unavailable { reason } => {
                warn!(%reason, block_from, block_to, "registry indexer unavailable");
                events.extend(self.fetch_registered(block_from, block_to).await?);
                block_to
            }
        };

        let set = CachedEventSet::new(key, events, cursor.max(prev_last.unwrap_or(0)));
        set.validate()?;
        let relayers = relayer_events(&set.events);
        self.store.save(set).await?;
        Ok(relayers)
    }

    /// `RelayerRegistered` logs in `[from, to]`.
    ///
    /// A failed range is split at its midpoint and both halves are queued;
    /// a range too small to split fails the whole fetch.
    async fn fetch_registered(&self, from: u64, to: u64) -> Result<Vec<EventRecord>, SyncError> {
        let filter = LogFilter::new(&self.registry_address, event_topic(StreamKind::Relayers));
        let mut pending = vec![(from, to)];
        let mut events = Vec::new();

        while let Some((from, to)) = pending.pop() {
            if from > to {
                continue;
            }
            match self.client.get_logs(&filter, from, to).await {
                Ok(logs) => {
                    for log in logs.iter().filter(|log| !log.is_removed()) {
                        events.push(decode_log(StreamKind::Relayers, log)?);
                    }
                }
                Err(e) => {
                    let mid = from + (to - from) / 2;
                    if mid - from < 2 {
                        return Err(SyncError::Rpc(format!(
                            "error fetching registrations in [{from}, {to}]: {e}"
                        )));
                    }
                    debug!(from, to, mid, error = %e, "splitting registration range");
                    // left half is popped first
                    pending.push((mid + 1, to));
                    pending.push((from, mid));
                }
            }
        }
        Ok(events)
    }

    async fn validate(
        &self,
        relayers: &[RelayerEvent],
        subdomain_key: &str,
        subdomain_index: usize,
    ) -> Result<Vec<ValidRelayer>, SyncError> {
        let names: Vec<String> = relayers.iter().map(|r| r.ens_name.clone()).collect();
        let states = self.aggregator.relayers_data(&names, &self.subdomains).await?;

        Ok(relayers
            .iter()
            .zip(states)
            .filter_map(|(relayer, state)| {
                let hostname = self.accepted_hostname(relayer, &state, subdomain_index)?;
                Some(ValidRelayer {
                    relayer_address: relayer.relayer_address.clone(),
                    ens_name: format!("{subdomain_key}.{}", relayer.ens_name),
                    hostname: format!("{}//{hostname}", self.scheme),
                })
            })
            .collect())
    }

    /// The relayer's hostname record if every check passes.
    fn accepted_hostname<'a>(
        &self,
        relayer: &RelayerEvent,
        state: &'a AggregatorRelayer,
        subdomain_index: usize,
    ) -> Option<&'a str> {
        let hostname = state.record(subdomain_index);
        let accepted = state.owner.eq_ignore_ascii_case(&relayer.relayer_address)
            && state.balance >= self.min_stake
            && state.is_registered
            && !hostname.is_empty()
            && !hostname.contains("http")
            && !state.record(0).is_empty();

        if !accepted {
            debug!(
                ens_name = %relayer.ens_name,
                owner_matches = state.owner.eq_ignore_ascii_case(&relayer.relayer_address),
                has_min_stake = state.balance >= self.min_stake,
                registered = state.is_registered,
                hostname,
                "relayer rejected"
            );
            return None;
        }
        Some(hostname)
    }
}

fn relayer_events(events: &[EventRecord]) -> Vec<RelayerEvent> {
    events
        .iter()
        .filter_map(EventRecord::as_relayer)
        .cloned()
        .collect()
}
