//! poolsync CLI
//!
//! Commands:
//!   poolsync sync [--chain <id>]              Sync pool event caches
//!   poolsync relayers --subdomain <key>       List validated relayers for a chain
//!   poolsync snapshot export [--chain <id>]   Copy cached sets to zip snapshots
//!   poolsync info                             Show chains, contracts and cache state

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use poolsync_core::cache::{EventStore, StreamKey};
use poolsync_core::chain::ChainRegistry;
use poolsync_core::config::SyncConfig;
use poolsync_core::events::StreamKind;
use poolsync_storage::{SqliteEventStore, TieredEventStore, ZipSnapshotStore};
use poolsync_sync::{Syncer, SyncerBuilder};

// ─── CLI definition ───────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "poolsync",
    about = "Shielded pool event sync: indexer + chain reconciliation",
    version
)]
struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON chain registry replacing the built-in chains
    #[arg(short, long, global = true)]
    registry: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Disable the graph indexer and read logs from chain only
    #[arg(long, global = true)]
    no_graph: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the cached event sets up to date
    Sync {
        /// Only this chain (defaults to every configured chain)
        #[arg(long)]
        chain: Option<u64>,
    },

    /// List relayers that pass registry and aggregator validation
    Relayers {
        /// ENS subdomain key of the chain, e.g. "mainnet-tornado"
        #[arg(long)]
        subdomain: String,
    },

    /// Manage zip snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Show configured chains, contracts and cursors
    Info,
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Copy the hot cache of each stream into the snapshot directory
    Export {
        #[arg(long)]
        chain: Option<u64>,
        /// commitments | nullifiers | accounts | relayers
        #[arg(long)]
        stream: Option<StreamKind>,
    },
}

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.verbose {
        config.log.level = "debug".into();
    }
    if cli.json_logs {
        config.log.json = true;
    }
    if cli.no_graph {
        config.graph.enabled = false;
    }
    logging::init_tracing(&config.log);

    let registry = load_registry(cli.registry.as_deref())?;
    let store = Arc::new(open_store(&config).await?);
    let syncer = SyncerBuilder::new()
        .config(config)
        .registry(registry)
        .store(store.clone())
        .build()
        .context("failed to build syncer")?;

    match cli.command {
        Commands::Sync { chain } => cmd_sync(&syncer, chain).await,
        Commands::Relayers { subdomain } => cmd_relayers(&syncer, &subdomain).await,
        Commands::Snapshot {
            action: SnapshotAction::Export { chain, stream },
        } => cmd_snapshot_export(&syncer, &store, chain, stream).await,
        Commands::Info => cmd_info(&syncer).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    let Some(path) = path else {
        return Ok(SyncConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    SyncConfig::from_json(&raw).with_context(|| format!("invalid config {}", path.display()))
}

fn load_registry(path: Option<&Path>) -> Result<ChainRegistry> {
    let Some(path) = path else {
        return Ok(ChainRegistry::builtin());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read registry {}", path.display()))?;
    ChainRegistry::from_json(&raw).with_context(|| format!("invalid registry {}", path.display()))
}

/// SQLite hot tier over the zip snapshot directory.
async fn open_store(config: &SyncConfig) -> Result<TieredEventStore> {
    let hot = SqliteEventStore::open(&config.storage.sqlite_path)
        .await
        .with_context(|| format!("cannot open {}", config.storage.sqlite_path))?;
    let cold = ZipSnapshotStore::new(&config.storage.snapshot_dir);
    Ok(TieredEventStore::new(Arc::new(hot), Arc::new(cold)))
}

fn selected_chains(syncer: &Syncer, chain: Option<u64>) -> Result<Vec<u64>> {
    match chain {
        Some(id) => {
            syncer.registry().get(id)?;
            Ok(vec![id])
        }
        None => Ok(syncer.config().chains.clone()),
    }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn cmd_sync(syncer: &Syncer, chain: Option<u64>) -> Result<()> {
    let mut reports = Vec::new();
    for chain_id in selected_chains(syncer, chain)? {
        let chain_reports = syncer
            .sync_chain(chain_id)
            .await
            .with_context(|| format!("sync failed on chain {chain_id}"))?;
        reports.extend(chain_reports);
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

async fn cmd_relayers(syncer: &Syncer, subdomain: &str) -> Result<()> {
    let relayers = syncer
        .relayer_resolver()?
        .get_relayers(subdomain)
        .await
        .with_context(|| format!("cannot resolve relayers for '{subdomain}'"))?;
    info!(subdomain, count = relayers.len(), "relayers resolved");
    println!("{}", serde_json::to_string_pretty(&relayers)?);
    Ok(())
}

async fn cmd_snapshot_export(
    syncer: &Syncer,
    store: &TieredEventStore,
    chain: Option<u64>,
    stream: Option<StreamKind>,
) -> Result<()> {
    let mut exported = Vec::new();
    for chain_id in selected_chains(syncer, chain)? {
        let descriptor = syncer.registry().get(chain_id)?;
        let streams: Vec<StreamKind> = match stream {
            Some(stream) if descriptor.supports(stream) => vec![stream],
            Some(stream) => return Err(anyhow!("{stream} is not deployed on chain {chain_id}")),
            None => StreamKind::ALL
                .into_iter()
                .filter(|s| descriptor.supports(*s))
                .collect(),
        };
        for stream in streams {
            let key = StreamKey::new(stream, chain_id);
            if let Some(events) = store.export(&key).await? {
                exported.push(json!({ "archive": format!("{}.json.zip", key.name()), "events": events }));
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&exported)?);
    Ok(())
}

async fn cmd_info(syncer: &Syncer) -> Result<()> {
    let mut chains = Vec::new();
    for chain in syncer.registry().chains() {
        let mut cursors = serde_json::Map::new();
        for stream in StreamKind::ALL.into_iter().filter(|s| chain.supports(*s)) {
            let cursor = syncer
                .store()
                .cursor(&StreamKey::new(stream, chain.chain_id))
                .await?;
            cursors.insert(
                stream.as_str().into(),
                json!(cursor.map(|c| c.last_synced_block)),
            );
        }
        chains.push(json!({
            "chainId": chain.chain_id,
            "name": chain.name,
            "deployBlock": chain.deploy_block,
            "subdomain": chain.ens_subdomain_key,
            "graph": chain.graph_url,
            "contracts": chain.contracts,
            "lastBlock": cursors,
        }));
    }
    println!("{}", serde_json::to_string_pretty(&chains)?);
    Ok(())
}
