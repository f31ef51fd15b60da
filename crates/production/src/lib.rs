//! Async runtime for ledger sync.
//!
//! Wraps the pure state machines from `ledger_sync_node` with real I/O:
//!
//! - Peer messages and local events via a tokio mpsc channel
//! - Protocol timeouts via spawned tokio sleep tasks
//! - The periodic sync check via a tokio interval
//! - Status published on a watch channel
//!
//! One task owns the protocol and responder and processes events one at a
//! time, so the state machines need no locking.
//!
//! ```no_run
//! use ledger_sync_production::{init_tracing, SyncRelayConfigToml};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! init_tracing("info")?;
//! let config = SyncRelayConfigToml::load(Path::new("ledger-sync.toml"))?.into_config()?;
//! # let _ = config;
//! # Ok(())
//! # }
//! ```

mod config;
mod runner;
mod telemetry;
mod timers;

pub use config::{ConfigError, SyncRelayConfigToml};
pub use runner::{
    CommitFeed, NetworkError, PeerControl, PeerMessage, RunnerError, RunnerEvent,
    ShutdownHandle, SyncNetwork, SyncRunner, SyncRunnerHandle, DEFAULT_CHANNEL_CAPACITY,
};
pub use telemetry::{env_filter, init_tracing, TelemetryError};
pub use timers::TimerManager;
