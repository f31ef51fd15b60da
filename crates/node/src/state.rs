//! Sync state values.
//!
//! [`SyncState`] is the single phase value owned by
//! [`LedgerSyncProtocol`](crate::LedgerSyncProtocol). Every helper here takes
//! the value and returns the next one; none of them performs I/O.

use crate::candidates::CandidateQueue;
use ledger_sync_types::{LedgerHeader, PeerId, RequestId, StateVersion};
use serde::Serialize;
use std::collections::HashSet;

/// Phase of the sync protocol, for status reporting and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStateKind {
    /// Not syncing; waiting for the next check or advertisement.
    Idle,
    /// Asking peers for their ledger status.
    CheckingStatus,
    /// Pulling ledger extensions from candidate peers.
    Syncing,
}

impl SyncStateKind {
    /// Returns a string representation for metrics/logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStateKind::Idle => "idle",
            SyncStateKind::CheckingStatus => "checking_status",
            SyncStateKind::Syncing => "syncing",
        }
    }
}

/// The outstanding sync request, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingRequest {
    pub peer: PeerId,
    pub request_id: RequestId,
}

impl PendingRequest {
    pub fn matches(&self, peer: &PeerId, request_id: RequestId) -> bool {
        self.peer == *peer && self.request_id == request_id
    }
}

/// The protocol's current phase plus phase-specific data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle(IdleState),
    CheckingStatus(SyncCheckState),
    Syncing(SyncingState),
}

impl SyncState {
    /// The state every node starts in.
    pub fn idle(current_header: LedgerHeader) -> Self {
        SyncState::Idle(IdleState { current_header })
    }

    pub fn kind(&self) -> SyncStateKind {
        match self {
            SyncState::Idle(_) => SyncStateKind::Idle,
            SyncState::CheckingStatus(_) => SyncStateKind::CheckingStatus,
            SyncState::Syncing(_) => SyncStateKind::Syncing,
        }
    }

    pub fn current_header(&self) -> &LedgerHeader {
        match self {
            SyncState::Idle(state) => &state.current_header,
            SyncState::CheckingStatus(state) => &state.current_header,
            SyncState::Syncing(state) => &state.current_header,
        }
    }

    pub fn current_version(&self) -> StateVersion {
        self.current_header().state_version
    }

    /// Replace the local header, keeping the phase.
    pub fn with_current_header(self, header: LedgerHeader) -> Self {
        match self {
            SyncState::Idle(_) => SyncState::idle(header),
            SyncState::CheckingStatus(state) => {
                SyncState::CheckingStatus(SyncCheckState {
                    current_header: header,
                    ..state
                })
            }
            SyncState::Syncing(state) => SyncState::Syncing(state.with_current_header(header)),
        }
    }

    /// Drop whatever phase data exists and return to idle.
    pub fn into_idle(self) -> Self {
        match self {
            SyncState::Idle(_) => self,
            SyncState::CheckingStatus(state) => SyncState::idle(state.current_header),
            SyncState::Syncing(state) => SyncState::idle(state.current_header),
        }
    }

    pub fn as_syncing(&self) -> Option<&SyncingState> {
        match self {
            SyncState::Syncing(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_sync_check(&self) -> Option<&SyncCheckState> {
        match self {
            SyncState::CheckingStatus(state) => Some(state),
            _ => None,
        }
    }
}

/// Not syncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleState {
    pub current_header: LedgerHeader,
}

/// Waiting for status responses from the peers asked during a sync check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCheckState {
    pub current_header: LedgerHeader,
    /// Distinguishes this check's receive status timeout from earlier ones.
    check: u64,
    /// Peers asked that have not answered yet.
    waiting_for: HashSet<PeerId>,
    /// Answers in arrival order.
    responses: Vec<(PeerId, LedgerHeader)>,
}

impl SyncCheckState {
    pub fn new(
        check: u64,
        current_header: LedgerHeader,
        peers: impl IntoIterator<Item = PeerId>,
    ) -> Self {
        Self {
            current_header,
            check,
            waiting_for: peers.into_iter().collect(),
            responses: Vec::new(),
        }
    }

    pub fn check(&self) -> u64 {
        self.check
    }

    pub fn is_waiting_for(&self, peer: &PeerId) -> bool {
        self.waiting_for.contains(peer)
    }

    pub fn has_responded(&self, peer: &PeerId) -> bool {
        self.responses.iter().any(|(p, _)| p == peer)
    }

    pub fn waiting_for(&self) -> &HashSet<PeerId> {
        &self.waiting_for
    }

    pub fn responses(&self) -> &[(PeerId, LedgerHeader)] {
        &self.responses
    }

    /// True once every asked peer has answered.
    pub fn got_all_responses(&self) -> bool {
        self.waiting_for.is_empty()
    }

    /// Record `peer`'s answer.
    ///
    /// No-op if `peer` was not asked or has already answered.
    pub fn with_status_response(mut self, peer: PeerId, header: LedgerHeader) -> Self {
        if self.waiting_for.remove(&peer) {
            self.responses.push((peer, header));
        }
        self
    }

    /// The highest response seen so far; ties go to the earliest arrival.
    pub fn best_response(&self) -> Option<(PeerId, &LedgerHeader)> {
        let mut best: Option<(PeerId, &LedgerHeader)> = None;
        for (peer, header) in &self.responses {
            match best {
                Some((_, best_header)) if header.state_version <= best_header.state_version => {}
                _ => best = Some((*peer, header)),
            }
        }
        best
    }

    /// Peers that reported exactly `version`, in arrival order.
    pub fn peers_at_version(&self, version: StateVersion) -> Vec<PeerId> {
        self.responses
            .iter()
            .filter(|(_, header)| header.state_version == version)
            .map(|(peer, _)| *peer)
            .collect()
    }
}

/// Pulling ledger extensions toward `target_header`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncingState {
    pub current_header: LedgerHeader,
    pub target_header: LedgerHeader,
    pub candidates: CandidateQueue,
    pending_request: Option<PendingRequest>,
}

impl SyncingState {
    pub fn new(
        current_header: LedgerHeader,
        candidates: impl IntoIterator<Item = PeerId>,
        target_header: LedgerHeader,
    ) -> Self {
        Self {
            current_header,
            target_header,
            candidates: CandidateQueue::new(candidates),
            pending_request: None,
        }
    }

    pub fn pending_request(&self) -> Option<&PendingRequest> {
        self.pending_request.as_ref()
    }

    pub fn waiting_for_response(&self) -> bool {
        self.pending_request.is_some()
    }

    pub fn waiting_for_response_from(&self, peer: &PeerId) -> bool {
        self.pending_request.is_some_and(|pending| pending.peer == *peer)
    }

    pub fn is_fully_synced(&self) -> bool {
        self.current_header.state_version >= self.target_header.state_version
    }

    pub fn with_pending_request(mut self, peer: PeerId, request_id: RequestId) -> Self {
        debug_assert!(
            self.pending_request.is_none(),
            "a sync request is already pending"
        );
        self.pending_request = Some(PendingRequest { peer, request_id });
        self
    }

    pub fn clear_pending_request(mut self) -> Self {
        debug_assert!(
            self.pending_request.is_some(),
            "no sync request pending to clear"
        );
        self.pending_request = None;
        self
    }

    pub fn with_current_header(mut self, header: LedgerHeader) -> Self {
        self.current_header = header;
        self
    }

    /// Raise the target. Lower or equal targets are ignored.
    pub fn with_target_header(mut self, header: LedgerHeader) -> Self {
        if header.is_ahead_of(&self.target_header) {
            self.target_header = header;
        }
        self
    }

    pub fn with_candidate(mut self, peer: PeerId) -> Self {
        self.candidates.insert(peer);
        self
    }
}
