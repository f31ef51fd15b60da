//! Async runner for the ledger sync state machines.
//!
//! A single task owns the [`LedgerSyncProtocol`] and [`SyncResponder`] and
//! receives everything else over an mpsc channel: peer messages, timer
//! fires, local ledger updates and local sync requests. The periodic sync
//! check runs off a tokio interval in the same loop.
//!
//! ```text
//!   peers ──► SyncRunnerHandle ──┐
//!   TimerManager ────────────────┼──► event_rx ──► SyncRunner ──► SyncNetwork
//!   local ledger / consensus ────┘                     │      └─► PeerControl
//!                                                      └──► watch<SyncStatus>
//! ```

use crate::timers::TimerManager;
use ledger_sync_node::{
    InMemoryLedger, LedgerSyncProtocol, MaliciousResponse, ResponderInput, ResponderOutput,
    SyncInput, SyncOutput, SyncRelayConfig, SyncResponder, SyncStatus, SyncTimeout,
};
use ledger_sync_types::{
    LedgerHeader, LedgerStatusUpdate, PeerId, StatusRequest, StatusResponse, SyncRequest,
    SyncResponse,
};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default capacity of the runner's event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

// ═══════════════════════════════════════════════════════════════════════════
// Events and messages
// ═══════════════════════════════════════════════════════════════════════════

/// Wire messages exchanged between ledger sync peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    StatusRequest(StatusRequest),
    StatusResponse(StatusResponse),
    SyncRequest(SyncRequest),
    SyncResponse(SyncResponse),
    StatusUpdate(LedgerStatusUpdate),
}

impl PeerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::StatusRequest(_) => "status_request",
            PeerMessage::StatusResponse(_) => "status_response",
            PeerMessage::SyncRequest(_) => "sync_request",
            PeerMessage::SyncResponse(_) => "sync_response",
            PeerMessage::StatusUpdate(_) => "status_update",
        }
    }
}

/// Everything the runner reacts to.
#[derive(Debug)]
pub enum RunnerEvent {
    /// A message arrived from `peer`.
    Message { peer: PeerId, message: PeerMessage },
    /// A protocol timer expired.
    Timeout(SyncTimeout),
    /// The ledger committed up to `header` outside of sync.
    LedgerUpdate(LedgerHeader),
    /// Sync toward `target` from `peers` without a sync check.
    LocalSyncRequest {
        target: LedgerHeader,
        peers: Vec<PeerId>,
    },
}

// ═══════════════════════════════════════════════════════════════════════════
// Collaborators
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("peer {0} is not connected")]
    NotConnected(PeerId),
    #[error("outbound queue to {0} is full")]
    QueueFull(PeerId),
}

/// Outbound side of the peer-to-peer transport.
///
/// Delivery is best effort: the protocol's timeouts cover lost messages.
pub trait SyncNetwork: Send + 'static {
    fn send(&self, peer: PeerId, message: PeerMessage) -> Result<(), NetworkError>;
}

/// Peer management actions requested by the protocol.
pub trait PeerControl: Send + 'static {
    fn ban(&self, peer: PeerId, reason: &MaliciousResponse, duration: Duration);
    fn prioritize(&self, peer: PeerId);
}

/// Headers committed by the sync verifier that the runner has not yet
/// reported to the protocol.
pub trait CommitFeed: Send + 'static {
    fn take_committed(&mut self) -> Vec<LedgerHeader>;
}

impl CommitFeed for InMemoryLedger {
    fn take_committed(&mut self) -> Vec<LedgerHeader> {
        self.take_committed_headers()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RunnerError
// ═══════════════════════════════════════════════════════════════════════════

/// Errors from the sync runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Event channel closed")]
    ChannelClosed,
    #[error("Event channel full")]
    ChannelFull,
}

// ═══════════════════════════════════════════════════════════════════════════
// SyncRunnerHandle
// ═══════════════════════════════════════════════════════════════════════════

/// Cloneable handle for feeding a running [`SyncRunner`].
#[derive(Debug, Clone)]
pub struct SyncRunnerHandle {
    event_tx: mpsc::Sender<RunnerEvent>,
    status_rx: watch::Receiver<SyncStatus>,
}

impl SyncRunnerHandle {
    pub async fn deliver(&self, peer: PeerId, message: PeerMessage) -> Result<(), RunnerError> {
        self.send(RunnerEvent::Message { peer, message }).await
    }

    /// Report a locally produced commit.
    pub async fn ledger_update(&self, header: LedgerHeader) -> Result<(), RunnerError> {
        self.send(RunnerEvent::LedgerUpdate(header)).await
    }

    pub async fn local_sync_request(
        &self,
        target: LedgerHeader,
        peers: Vec<PeerId>,
    ) -> Result<(), RunnerError> {
        self.send(RunnerEvent::LocalSyncRequest { target, peers })
            .await
    }

    /// Non-blocking delivery for transports that must not await.
    pub fn try_deliver(&self, peer: PeerId, message: PeerMessage) -> Result<(), RunnerError> {
        self.event_tx
            .try_send(RunnerEvent::Message { peer, message })
            .map_err(|error| match error {
                mpsc::error::TrySendError::Full(_) => RunnerError::ChannelFull,
                mpsc::error::TrySendError::Closed(_) => RunnerError::ChannelClosed,
            })
    }

    /// The latest published status.
    pub fn status(&self) -> SyncStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_rx.clone()
    }

    async fn send(&self, event: RunnerEvent) -> Result<(), RunnerError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| RunnerError::ChannelClosed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ShutdownHandle
// ═══════════════════════════════════════════════════════════════════════════

/// Handle for shutting down a running [`SyncRunner`].
///
/// When dropped, signals the runner to exit gracefully.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    /// Trigger shutdown (consumes the handle).
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SyncRunner
// ═══════════════════════════════════════════════════════════════════════════

/// Drives one node's ledger sync.
pub struct SyncRunner {
    event_rx: mpsc::Receiver<RunnerEvent>,
    shutdown_rx: oneshot::Receiver<()>,
    core: RunnerCore,
}

/// The state the event loop mutates, split from the receivers so the loop
/// can borrow both.
struct RunnerCore {
    local: PeerId,
    check_interval: Duration,
    protocol: LedgerSyncProtocol,
    responder: SyncResponder,
    timers: TimerManager,
    network: Box<dyn SyncNetwork>,
    peer_control: Box<dyn PeerControl>,
    commits: Box<dyn CommitFeed>,
    status_tx: watch::Sender<SyncStatus>,
}

impl SyncRunner {
    /// Build a runner and the handles used to drive and stop it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local: PeerId,
        config: &SyncRelayConfig,
        protocol: LedgerSyncProtocol,
        responder: SyncResponder,
        network: impl SyncNetwork,
        peer_control: impl PeerControl,
        commits: impl CommitFeed,
        channel_capacity: usize,
    ) -> (Self, SyncRunnerHandle, ShutdownHandle) {
        let (event_tx, event_rx) = mpsc::channel(channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (status_tx, status_rx) = watch::channel(protocol.status());

        let runner = Self {
            event_rx,
            shutdown_rx,
            core: RunnerCore {
                local,
                check_interval: config.sync_check_interval,
                protocol,
                responder,
                timers: TimerManager::new(event_tx.clone()),
                network: Box::new(network),
                peer_control: Box::new(peer_control),
                commits: Box::new(commits),
                status_tx,
            },
        };
        let handle = SyncRunnerHandle {
            event_tx,
            status_rx,
        };
        let shutdown = ShutdownHandle {
            tx: Some(shutdown_tx),
        };
        (runner, handle, shutdown)
    }

    /// Run until shutdown is signalled.
    ///
    /// The first sync check fires one interval after start.
    pub async fn run(self) -> Result<(), RunnerError> {
        let SyncRunner {
            mut event_rx,
            mut shutdown_rx,
            mut core,
        } = self;

        let start = tokio::time::Instant::now() + core.check_interval;
        let mut check_tick = tokio::time::interval_at(start, core.check_interval);
        check_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            peer = %core.local,
            version = %core.protocol.current_header().state_version,
            "Sync runner started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    info!(peer = %core.local, "Shutdown signal received");
                    break;
                }
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        return Err(RunnerError::ChannelClosed);
                    };
                    core.on_event(event);
                }
                _ = check_tick.tick() => {
                    core.step(SyncInput::CheckTrigger);
                }
            }
        }

        core.timers.cancel_all();
        info!(peer = %core.local, "Sync runner stopped");
        Ok(())
    }
}

impl RunnerCore {
    fn on_event(&mut self, event: RunnerEvent) {
        match event {
            RunnerEvent::Message { peer, message } => self.on_message(peer, message),
            RunnerEvent::Timeout(timeout) => {
                self.timers.fired(&timeout);
                self.step(timeout.into_input());
            }
            RunnerEvent::LedgerUpdate(header) => self.on_ledger_update(header),
            RunnerEvent::LocalSyncRequest { target, peers } => {
                self.step(SyncInput::LocalSyncRequest { target, peers })
            }
        }
    }

    fn on_message(&mut self, peer: PeerId, message: PeerMessage) {
        debug!(from = %peer, kind = message.kind(), "Received peer message");
        match message {
            PeerMessage::StatusRequest(_) => self.serve(ResponderInput::StatusRequest { peer }),
            PeerMessage::SyncRequest(request) => {
                self.serve(ResponderInput::SyncRequest { peer, request })
            }
            PeerMessage::StatusResponse(response) => self.step(SyncInput::StatusResponse {
                peer,
                header: response.header,
            }),
            PeerMessage::SyncResponse(response) => {
                self.step(SyncInput::SyncResponse { peer, response })
            }
            PeerMessage::StatusUpdate(update) => self.step(SyncInput::StatusAdvertisement {
                peer,
                header: update.header,
            }),
        }
    }

    /// Feed the protocol one input, execute its outputs, then report any
    /// commits the input produced.
    fn step(&mut self, input: SyncInput) {
        let outputs = self.protocol.handle(input);
        for output in outputs {
            self.execute(output);
        }

        for header in self.commits.take_committed() {
            self.on_ledger_update(header);
        }

        self.status_tx.send_replace(self.protocol.status());
    }

    fn on_ledger_update(&mut self, header: LedgerHeader) {
        self.step(SyncInput::LedgerUpdate {
            header: header.clone(),
        });
        let sync_state = self.protocol.state().kind();
        self.serve(ResponderInput::LedgerUpdate {
            header,
            sync_state,
            now: Instant::now(),
        });
    }

    fn serve(&mut self, input: ResponderInput) {
        for output in self.responder.handle(input) {
            let (peer, message) = match output {
                ResponderOutput::SendStatusResponse { peer, response } => {
                    (peer, PeerMessage::StatusResponse(response))
                }
                ResponderOutput::SendSyncResponse { peer, response } => {
                    (peer, PeerMessage::SyncResponse(response))
                }
                ResponderOutput::SendStatusUpdate { peer, update } => {
                    (peer, PeerMessage::StatusUpdate(update))
                }
            };
            self.send(peer, message);
        }
    }

    fn execute(&mut self, output: SyncOutput) {
        match output {
            SyncOutput::SendStatusRequest { peer } => {
                self.send(peer, PeerMessage::StatusRequest(StatusRequest))
            }
            SyncOutput::SendSyncRequest { peer, request } => {
                self.send(peer, PeerMessage::SyncRequest(request))
            }
            SyncOutput::ScheduleTimeout { timeout, delay } => {
                self.timers.schedule(timeout, delay)
            }
            SyncOutput::BanPeer {
                peer,
                reason,
                duration,
            } => self.peer_control.ban(peer, &reason, duration),
            SyncOutput::PrioritizePeer { peer } => self.peer_control.prioritize(peer),
        }
    }

    fn send(&self, peer: PeerId, message: PeerMessage) {
        let kind = message.kind();
        if let Err(error) = self.network.send(peer, message) {
            warn!(to = %peer, kind, %error, "Failed to send peer message");
        }
    }
}
