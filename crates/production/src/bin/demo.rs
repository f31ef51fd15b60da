//! Ledger Sync Demo
//!
//! Runs a small cluster of sync runners in one process, connected by
//! in-memory channels, and waits until every node has caught up with the
//! most advanced one.
//!
//! # Usage
//!
//! ```bash
//! # Four nodes starting at versions 10, 2, 20 and 15
//! ledger-sync-demo --versions 10,2,20,15
//!
//! # Tuned timeouts
//! ledger-sync-demo --config ledger-sync.toml --log-level debug
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use ledger_sync_node::{
    ConsensusProofVerifier, InMemoryLedger, LedgerExtensionVerifier, LedgerSyncProtocol,
    MaliciousResponse, SharedPeerDirectory, SyncRelayConfig, SyncResponder,
};
use ledger_sync_production::{
    init_tracing, NetworkError, PeerControl, PeerMessage, RunnerError, ShutdownHandle,
    SyncNetwork, SyncRelayConfigToml, SyncRunner, SyncRunnerHandle, DEFAULT_CHANNEL_CAPACITY,
};
use ledger_sync_types::{LedgerHeader, PeerId, StateVersion};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "ledger-sync-demo")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML sync configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Starting state version of each node
    #[arg(long, value_delimiter = ',', default_value = "10,2,20,15")]
    versions: Vec<u64>,

    /// Give up if the cluster has not converged after this many seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// The demo has no consensus layer; every header is taken as signed.
struct TrustingProofs;

impl ConsensusProofVerifier for TrustingProofs {
    fn has_quorum(&self, _header: &LedgerHeader) -> bool {
        true
    }

    fn signatures_match(&self, _header: &LedgerHeader) -> bool {
        true
    }
}

type Routes = Arc<RwLock<HashMap<PeerId, SyncRunnerHandle>>>;

/// Delivers straight into the destination runner's event channel.
struct ChannelNetwork {
    local: PeerId,
    routes: Routes,
}

impl SyncNetwork for ChannelNetwork {
    fn send(&self, peer: PeerId, message: PeerMessage) -> Result<(), NetworkError> {
        let routes = self
            .routes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let handle = routes.get(&peer).ok_or(NetworkError::NotConnected(peer))?;
        handle
            .try_deliver(self.local, message)
            .map_err(|error| match error {
                RunnerError::ChannelFull => NetworkError::QueueFull(peer),
                RunnerError::ChannelClosed => NetworkError::NotConnected(peer),
            })
    }
}

/// Bans by dropping the peer from the directory until the ban expires.
struct DirectoryControl {
    local: PeerId,
    directory: SharedPeerDirectory,
}

impl PeerControl for DirectoryControl {
    fn ban(&self, peer: PeerId, reason: &MaliciousResponse, duration: Duration) {
        warn!(node = %self.local, %peer, %reason, ?duration, "Banning peer");
        if !self.directory.remove(&peer) {
            return;
        }
        let directory = self.directory.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            directory.add(peer);
        });
    }

    fn prioritize(&self, peer: PeerId) {
        debug!(node = %self.local, %peer, "Prioritizing peer");
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SyncRelayConfig> {
    let Some(path) = path else {
        return Ok(SyncRelayConfig::default());
    };
    SyncRelayConfigToml::load(path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))?
        .into_config()
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    if cli.versions.len() < 2 {
        bail!("A cluster needs at least two nodes");
    }
    let config = load_config(cli.config.as_ref())?;
    info!(?config, nodes = cli.versions.len(), "Starting ledger sync demo");

    let ids: Vec<PeerId> = (0..cli.versions.len() as u64).map(PeerId).collect();
    let routes: Routes = Arc::default();
    let mut shutdowns: Vec<ShutdownHandle> = Vec::new();
    let mut tasks = Vec::new();

    for (&id, &version) in ids.iter().zip(&cli.versions) {
        let ledger = InMemoryLedger::with_generated_transactions(version);
        let directory = SharedPeerDirectory::new(ids.iter().copied().filter(|peer| *peer != id));
        let protocol = LedgerSyncProtocol::new(
            config.clone(),
            ledger.header(),
            directory.clone(),
            LedgerExtensionVerifier::new(TrustingProofs, ledger.clone()),
        );
        let responder =
            SyncResponder::new(&config, ledger.clone(), directory.clone(), Instant::now());
        let (runner, handle, shutdown) = SyncRunner::new(
            id,
            &config,
            protocol,
            responder,
            ChannelNetwork {
                local: id,
                routes: routes.clone(),
            },
            DirectoryControl {
                local: id,
                directory,
            },
            ledger,
            DEFAULT_CHANNEL_CAPACITY,
        );
        routes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, handle);
        shutdowns.push(shutdown);
        tasks.push(tokio::spawn(runner.run()));
    }

    let target = StateVersion(cli.versions.iter().copied().max().unwrap_or_default());
    let handles: Vec<SyncRunnerHandle> = routes
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .values()
        .cloned()
        .collect();

    let started = Instant::now();
    let converged = tokio::time::timeout(Duration::from_secs(cli.timeout_secs), async {
        for handle in &handles {
            let mut status = handle.subscribe();
            status
                .wait_for(|status| status.current_version >= target)
                .await?;
        }
        Ok::<_, tokio::sync::watch::error::RecvError>(())
    })
    .await;

    drop(shutdowns);
    for task in tasks {
        task.await.context("Runner task panicked")??;
    }

    match converged {
        Ok(result) => {
            result.context("Runner stopped before converging")?;
            info!(%target, elapsed = ?started.elapsed(), "Cluster converged");
            Ok(())
        }
        Err(_) => bail!("Cluster did not reach {target} within {}s", cli.timeout_secs),
    }
}
