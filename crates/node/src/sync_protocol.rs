//! Ledger sync protocol state machine.
//!
//! Pure synchronous state machine that detects when the local ledger lags
//! its peers and pulls ledger extensions until it catches up. Does NOT
//! perform I/O, schedule timers, or ban peers itself: every effect is
//! returned as a [`SyncOutput`] for the runner to execute.
//!
//! # Usage
//!
//! ```text
//! Runner ──► LedgerSyncProtocol::handle(SyncInput) ──► Vec<SyncOutput>
//! ```
//!
//! Production: `SyncRunner` feeds network messages and timer expiries in
//! and maps outputs to network sends, tokio timers and peer control.
//! Tests: feed inputs directly and assert on the returned outputs.
//!
//! # Phases
//!
//! ```text
//! Idle ──CheckTrigger──► CheckingStatus ──peer ahead──► Syncing
//!  ▲                          │                            │
//!  └────── nobody ahead ──────┘                            │
//!  └───────────────────── reached target ◄─────────────────┘
//! ```

use crate::config::SyncRelayConfig;
use crate::peers::PeerDirectory;
use crate::state::{PendingRequest, SyncCheckState, SyncState, SyncStateKind, SyncingState};
use crate::verification::{MaliciousResponse, SyncResponseVerifier, VerificationOutcome};
use ledger_sync_metrics as metrics;
use ledger_sync_types::{LedgerHeader, PeerId, RequestId, StateVersion, SyncRequest, SyncResponse};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Sync status snapshot for external APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Current protocol phase.
    pub state: SyncStateKind,
    /// Latest locally committed state version.
    pub current_version: StateVersion,
    /// Version being synced toward (if syncing).
    pub target_version: Option<StateVersion>,
    /// Number of versions behind target.
    pub versions_behind: u64,
    /// Number of queued sync candidates.
    pub candidate_count: usize,
    /// The outstanding sync request, if any.
    pub pending_request: Option<PendingRequest>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncStateKind::Idle,
            current_version: StateVersion::PRE_GENESIS,
            target_version: None,
            versions_behind: 0,
            candidate_count: 0,
            pending_request: None,
        }
    }
}

/// Timers the protocol asks the runner to schedule.
///
/// Each variant carries the token its handler re-checks on expiry, so timers
/// never need cancelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTimeout {
    /// Close the window of sync check number `check`.
    ReceiveStatus { check: u64 },
    /// Give up on an outstanding sync request.
    SyncRequest { peer: PeerId, request_id: RequestId },
    /// Resume syncing if the commit of an accepted extension stalls.
    LedgerUpdate { state_version: StateVersion },
}

impl SyncTimeout {
    /// The input to feed back once this timer fires.
    pub fn into_input(self) -> SyncInput {
        match self {
            SyncTimeout::ReceiveStatus { check } => SyncInput::ReceiveStatusTimeout { check },
            SyncTimeout::SyncRequest { peer, request_id } => {
                SyncInput::RequestTimeout { peer, request_id }
            }
            SyncTimeout::LedgerUpdate { state_version } => {
                SyncInput::LedgerUpdateTimeout { state_version }
            }
        }
    }
}

/// Inputs to the sync protocol state machine.
#[derive(Debug, Clone)]
pub enum SyncInput {
    /// Periodic trigger to check whether peers are ahead.
    CheckTrigger,
    /// A peer answered a status request.
    StatusResponse { peer: PeerId, header: LedgerHeader },
    /// The window of sync check number `check` closed.
    ReceiveStatusTimeout { check: u64 },
    /// A sync request went unanswered.
    RequestTimeout { peer: PeerId, request_id: RequestId },
    /// A peer answered a sync request.
    SyncResponse { peer: PeerId, response: SyncResponse },
    /// The local ledger committed up to `header`.
    LedgerUpdate { header: LedgerHeader },
    /// Commit of an accepted extension did not complete in time.
    LedgerUpdateTimeout { state_version: StateVersion },
    /// A peer pushed its latest ledger header unprompted.
    StatusAdvertisement { peer: PeerId, header: LedgerHeader },
    /// A local component (e.g. consensus) knows of a verified header ahead
    /// of the ledger and which peers hold it.
    LocalSyncRequest {
        target: LedgerHeader,
        peers: Vec<PeerId>,
    },
}

/// Outputs from the sync protocol state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutput {
    /// Ask `peer` for its latest ledger header.
    SendStatusRequest { peer: PeerId },
    /// Ask `peer` for the ledger extension after `request.from`.
    SendSyncRequest { peer: PeerId, request: SyncRequest },
    /// Feed `timeout.into_input()` back after `delay`.
    ScheduleTimeout {
        timeout: SyncTimeout,
        delay: Duration,
    },
    /// `peer` sent a response no honest node could produce.
    BanPeer {
        peer: PeerId,
        reason: MaliciousResponse,
        duration: Duration,
    },
    /// `peer` served a valid extension; prefer it for future requests.
    PrioritizePeer { peer: PeerId },
}

/// Ledger sync protocol state machine.
///
/// Owns the only [`SyncState`]. The runner drives it by calling
/// [`handle`](Self::handle) with inputs and executing the returned outputs.
pub struct LedgerSyncProtocol {
    config: SyncRelayConfig,
    state: SyncState,
    next_request_id: RequestId,
    /// Number of the last sync check started.
    last_check: u64,
    /// Where the next bounded sync check starts in the peer list.
    check_offset: usize,
    peers: Box<dyn PeerDirectory>,
    verifier: Box<dyn SyncResponseVerifier>,
}

impl LedgerSyncProtocol {
    /// Create a protocol that starts idle at `current_header`.
    pub fn new(
        config: SyncRelayConfig,
        current_header: LedgerHeader,
        peers: impl PeerDirectory + 'static,
        verifier: impl SyncResponseVerifier + 'static,
    ) -> Self {
        Self {
            config,
            state: SyncState::idle(current_header),
            next_request_id: RequestId(1),
            last_check: 0,
            check_offset: 0,
            peers: Box::new(peers),
            verifier: Box::new(verifier),
        }
    }

    /// Process an input and return outputs.
    pub fn handle(&mut self, input: SyncInput) -> Vec<SyncOutput> {
        let outputs = match input {
            SyncInput::CheckTrigger => self.on_check_trigger(),
            SyncInput::StatusResponse { peer, header } => self.on_status_response(peer, header),
            SyncInput::ReceiveStatusTimeout { check } => self.on_receive_status_timeout(check),
            SyncInput::RequestTimeout { peer, request_id } => {
                self.on_request_timeout(peer, request_id)
            }
            SyncInput::SyncResponse { peer, response } => self.on_sync_response(peer, &response),
            SyncInput::LedgerUpdate { header } => self.on_ledger_update(header),
            SyncInput::LedgerUpdateTimeout { state_version } => {
                self.on_ledger_update_timeout(state_version)
            }
            SyncInput::StatusAdvertisement { peer, header } => {
                self.on_status_advertisement(peer, header)
            }
            SyncInput::LocalSyncRequest { target, peers } => {
                self.on_local_sync_request(target, peers)
            }
        };
        self.record_versions();
        outputs
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn config(&self) -> &SyncRelayConfig {
        &self.config
    }

    /// Latest locally committed header.
    pub fn current_header(&self) -> &LedgerHeader {
        self.state.current_header()
    }

    /// Check if currently syncing.
    pub fn is_syncing(&self) -> bool {
        matches!(self.state, SyncState::Syncing(_))
    }

    /// Get current sync status.
    pub fn status(&self) -> SyncStatus {
        let current_version = self.state.current_version();
        match &self.state {
            SyncState::Syncing(syncing) => SyncStatus {
                state: SyncStateKind::Syncing,
                current_version,
                target_version: Some(syncing.target_header.state_version),
                versions_behind: syncing
                    .target_header
                    .state_version
                    .distance_from(current_version),
                candidate_count: syncing.candidates.len(),
                pending_request: syncing.pending_request().copied(),
            },
            other => SyncStatus {
                state: other.kind(),
                current_version,
                ..SyncStatus::default()
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Input Handlers
    // ═══════════════════════════════════════════════════════════════════════

    fn on_check_trigger(&mut self) -> Vec<SyncOutput> {
        if !matches!(self.state, SyncState::Idle(_)) {
            trace!(state = self.state.kind().as_str(), "Sync check skipped");
            return vec![];
        }

        let mut peers = self.peers.peers();
        if let Some(max) = self.config.sync_check_max_peers.filter(|max| *max < peers.len()) {
            // Successive checks walk the peer list so every peer gets asked.
            let offset = self.check_offset % peers.len();
            peers.rotate_left(offset);
            peers.truncate(max);
            self.check_offset = offset + max;
        }
        if peers.is_empty() {
            debug!("No ledger sync peers to check");
            return vec![];
        }

        debug!(
            peers = peers.len(),
            current = %self.state.current_version(),
            "Starting sync check"
        );
        metrics::record_status_requests_sent(peers.len());
        self.last_check += 1;

        let mut outputs: Vec<SyncOutput> = peers
            .iter()
            .map(|&peer| SyncOutput::SendStatusRequest { peer })
            .collect();
        outputs.push(SyncOutput::ScheduleTimeout {
            timeout: SyncTimeout::ReceiveStatus {
                check: self.last_check,
            },
            delay: self.config.sync_check_receive_status_timeout,
        });

        let current = self.state.current_header().clone();
        self.state =
            SyncState::CheckingStatus(SyncCheckState::new(self.last_check, current, peers));
        outputs
    }

    fn on_status_response(&mut self, peer: PeerId, header: LedgerHeader) -> Vec<SyncOutput> {
        let Some(check) = self.state.as_sync_check() else {
            trace!(%peer, "Status response outside a sync check");
            return vec![];
        };
        if !check.is_waiting_for(&peer) {
            debug!(
                %peer,
                responded = check.has_responded(&peer),
                "Ignoring unexpected status response"
            );
            return vec![];
        }

        let Some(check) = self.take_sync_check() else {
            return vec![];
        };
        trace!(%peer, version = %header.state_version, "Status response");
        let check = check.with_status_response(peer, header);
        let complete = check.got_all_responses();
        self.state = SyncState::CheckingStatus(check);

        if complete {
            self.finish_sync_check()
        } else {
            vec![]
        }
    }

    fn on_receive_status_timeout(&mut self, check_number: u64) -> Vec<SyncOutput> {
        let Some(check) = self
            .state
            .as_sync_check()
            .filter(|check| check.check() == check_number)
        else {
            trace!(check = check_number, "Stale receive status timeout");
            return vec![];
        };
        debug!(
            responses = check.responses().len(),
            missing = check.waiting_for().len(),
            "Sync check window closed"
        );
        self.finish_sync_check()
    }

    fn on_request_timeout(&mut self, peer: PeerId, request_id: RequestId) -> Vec<SyncOutput> {
        let live = self
            .state
            .as_syncing()
            .and_then(SyncingState::pending_request)
            .is_some_and(|pending| pending.matches(&peer, request_id));
        if !live {
            trace!(%peer, %request_id, "Stale sync request timeout");
            return vec![];
        }

        let Some(mut syncing) = self.take_syncing() else {
            return vec![];
        };
        warn!(%peer, %request_id, "Sync request timed out");
        metrics::record_sync_request_timeout();

        syncing.candidates.rotate_past(&peer);
        self.state = SyncState::Syncing(syncing.clear_pending_request());
        self.process_sync()
    }

    fn on_sync_response(&mut self, peer: PeerId, response: &SyncResponse) -> Vec<SyncOutput> {
        let Some(syncing) = self.state.as_syncing() else {
            trace!(%peer, state = self.state.kind().as_str(), "Sync response while not syncing");
            return vec![];
        };

        match self.verifier.verify_and_apply(syncing, peer, response) {
            VerificationOutcome::Unsolicited(reason) => {
                debug!(%peer, %reason, "Ignoring unsolicited sync response");
                metrics::record_sync_response_unsolicited(reason.metric_label());
                vec![]
            }
            VerificationOutcome::Malicious(reason) => {
                warn!(
                    %peer,
                    %reason,
                    label = reason.metric_label(),
                    "Banning peer for malicious sync response"
                );
                metrics::record_sync_peer_banned(reason.metric_label());
                vec![SyncOutput::BanPeer {
                    peer,
                    reason,
                    duration: self.config.ban_duration,
                }]
            }
            VerificationOutcome::Accepted => {
                let Some(syncing) = self.take_syncing() else {
                    return vec![];
                };
                let state_version = syncing.current_header.state_version;
                debug!(
                    %peer,
                    from = %state_version,
                    to = %response.extension.end.state_version,
                    "Sync response accepted"
                );
                metrics::record_sync_response_accepted();

                self.state = SyncState::Syncing(if syncing.waiting_for_response() {
                    syncing.clear_pending_request()
                } else {
                    syncing
                });
                vec![
                    SyncOutput::PrioritizePeer { peer },
                    SyncOutput::ScheduleTimeout {
                        timeout: SyncTimeout::LedgerUpdate { state_version },
                        delay: self.config.ledger_update_timeout,
                    },
                ]
            }
        }
    }

    fn on_ledger_update(&mut self, header: LedgerHeader) -> Vec<SyncOutput> {
        if !header.is_ahead_of(self.state.current_header()) {
            trace!(version = %header.state_version, "Ledger update not ahead of current header");
            return vec![];
        }

        trace!(version = %header.state_version, "Ledger updated");
        let state = self.take_state();
        self.state = state.with_current_header(header);
        self.process_sync()
    }

    fn on_ledger_update_timeout(&mut self, expected: StateVersion) -> Vec<SyncOutput> {
        let Some(syncing) = self.state.as_syncing() else {
            trace!(%expected, "Ledger update timeout while not syncing");
            return vec![];
        };
        if expected < syncing.current_header.state_version {
            trace!(%expected, "Obsolete ledger update timeout");
            return vec![];
        }

        warn!(
            %expected,
            pending = syncing.waiting_for_response(),
            "Ledger update timed out, resuming sync"
        );
        metrics::record_ledger_update_timeout();
        self.process_sync()
    }

    fn on_status_advertisement(&mut self, peer: PeerId, header: LedgerHeader) -> Vec<SyncOutput> {
        if !self.peers.has_peer(&peer) {
            trace!(%peer, "Advertisement from a peer outside the ledger sync set");
            return vec![];
        }
        match self.state.kind() {
            SyncStateKind::Idle => {
                if !header.is_ahead_of(self.state.current_header()) {
                    trace!(%peer, version = %header.state_version, "Advertisement not ahead");
                    return vec![];
                }
                info!(
                    %peer,
                    current = %self.state.current_version(),
                    target = %header.state_version,
                    "Peer advertised a newer ledger, starting sync"
                );
                let current = self.state.current_header().clone();
                self.state = SyncState::Syncing(SyncingState::new(current, [peer], header));
                self.process_sync()
            }
            SyncStateKind::Syncing => {
                let Some(syncing) = self.take_syncing() else {
                    return vec![];
                };
                if !header.is_ahead_of(&syncing.target_header) {
                    trace!(
                        %peer,
                        version = %header.state_version,
                        target = %syncing.target_header.state_version,
                        "Advertisement not ahead of sync target"
                    );
                    self.state = SyncState::Syncing(syncing);
                    return vec![];
                }
                debug!(
                    %peer,
                    old_target = %syncing.target_header.state_version,
                    new_target = %header.state_version,
                    "Raising sync target"
                );
                self.state =
                    SyncState::Syncing(syncing.with_target_header(header).with_candidate(peer));
                self.process_sync()
            }
            SyncStateKind::CheckingStatus => {
                trace!(%peer, "Advertisement during sync check ignored");
                vec![]
            }
        }
    }

    fn on_local_sync_request(
        &mut self,
        target: LedgerHeader,
        peers: Vec<PeerId>,
    ) -> Vec<SyncOutput> {
        let state = self.take_state();
        if !target.is_ahead_of(state.current_header()) {
            debug!(
                target = %target.state_version,
                current = %state.current_version(),
                "Local sync request already satisfied"
            );
            self.state = state.into_idle();
            return vec![];
        }

        info!(
            target = %target.state_version,
            current = %state.current_version(),
            peers = peers.len(),
            "Local sync request"
        );
        let current = state.current_header().clone();
        self.state = SyncState::Syncing(SyncingState::new(current, peers, target));
        self.process_sync()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Transitions
    // ═══════════════════════════════════════════════════════════════════════

    /// Decide on the responses gathered so far and leave `CheckingStatus`.
    fn finish_sync_check(&mut self) -> Vec<SyncOutput> {
        let Some(check) = self.take_sync_check() else {
            return vec![];
        };
        metrics::record_sync_check_completed(check.responses().len());

        let Some((chosen, best)) = check.best_response() else {
            debug!("Sync check got no responses");
            self.state = SyncState::idle(check.current_header);
            return vec![];
        };
        if !best.is_ahead_of(&check.current_header) {
            debug!(
                current = %check.current_header.state_version,
                best = %best.state_version,
                "No peer is ahead"
            );
            self.state = SyncState::idle(check.current_header);
            return vec![];
        }

        let target = best.clone();
        let mut candidates = vec![chosen];
        candidates.extend(
            check
                .peers_at_version(target.state_version)
                .into_iter()
                .filter(|peer| *peer != chosen),
        );
        info!(
            peer = %chosen,
            candidates = candidates.len(),
            current = %check.current_header.state_version,
            target = %target.state_version,
            "Peers are ahead, starting sync"
        );

        self.state = SyncState::Syncing(SyncingState::new(
            check.current_header,
            candidates,
            target,
        ));
        self.process_sync()
    }

    /// Advance the sync pipeline: finish if the target is reached, otherwise
    /// send a request to the next candidate unless one is in flight.
    fn process_sync(&mut self) -> Vec<SyncOutput> {
        let Some(mut syncing) = self.take_syncing() else {
            return vec![];
        };

        if syncing.is_fully_synced() {
            info!(version = %syncing.current_header.state_version, "Ledger sync complete");
            self.state = SyncState::idle(syncing.current_header);
            return vec![];
        }

        if syncing.waiting_for_response() {
            self.state = SyncState::Syncing(syncing);
            return vec![];
        }

        let peers = &self.peers;
        let dropped = syncing.candidates.retain(|peer| peers.has_peer(peer));
        if dropped > 0 {
            debug!(dropped, "Dropped sync candidates no longer in the peer directory");
        }

        let Some(peer) = syncing.candidates.fetch_next() else {
            warn!(
                target = %syncing.target_header.state_version,
                "No sync candidates left, waiting for an advertisement"
            );
            self.state = SyncState::Syncing(syncing);
            return vec![];
        };

        let request_id = self.allocate_request_id();
        let request = SyncRequest {
            from: syncing.current_header.clone(),
            request_id,
        };
        debug!(
            %peer,
            %request_id,
            from = %request.from.state_version,
            target = %syncing.target_header.state_version,
            "Sending sync request"
        );
        metrics::record_sync_request_sent();

        self.state = SyncState::Syncing(syncing.with_pending_request(peer, request_id));
        vec![
            SyncOutput::SendSyncRequest { peer, request },
            SyncOutput::ScheduleTimeout {
                timeout: SyncTimeout::SyncRequest { peer, request_id },
                delay: self.config.sync_request_timeout,
            },
        ]
    }

    // ═══════════════════════════════════════════════════════════════════════
    // State Helpers
    // ═══════════════════════════════════════════════════════════════════════

    fn take_state(&mut self) -> SyncState {
        let placeholder = SyncState::idle(self.state.current_header().clone());
        std::mem::replace(&mut self.state, placeholder)
    }

    fn take_syncing(&mut self) -> Option<SyncingState> {
        match self.take_state() {
            SyncState::Syncing(syncing) => Some(syncing),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn take_sync_check(&mut self) -> Option<SyncCheckState> {
        match self.take_state() {
            SyncState::CheckingStatus(check) => Some(check),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn allocate_request_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id = id.next();
        id
    }

    fn record_versions(&self) {
        let current = self.state.current_version();
        let (target, in_progress) = match &self.state {
            SyncState::Syncing(syncing) => (syncing.target_header.state_version, true),
            _ => (current, false),
        };
        metrics::set_sync_versions(current.0, target.0, in_progress);
    }
}
