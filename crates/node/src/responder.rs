//! Serving side of ledger sync.
//!
//! Answers status and sync requests from peers and, while the local node is
//! not syncing itself, pushes ledger status updates so lagging peers learn
//! about new commits without waiting for their next sync check.

use crate::config::SyncRelayConfig;
use crate::peers::PeerDirectory;
use crate::rate_limiter::TokenBucket;
use crate::state::SyncStateKind;
use ledger_sync_metrics as metrics;
use ledger_sync_types::{
    LedgerExtension, LedgerHeader, LedgerStatusUpdate, PeerId, StatusResponse, SyncRequest,
    SyncResponse,
};
use std::time::Instant;
use tracing::{debug, trace};

/// Read access to the committed ledger.
pub trait CommittedReader: Send + Sync {
    /// The latest committed header.
    fn latest_header(&self) -> LedgerHeader;

    /// Committed transactions following `from`, with the proof they reach.
    ///
    /// `None` when nothing follows `from` or `from` is not on our history.
    fn extension_from(&self, from: &LedgerHeader) -> Option<LedgerExtension>;
}

/// Inputs to the responder.
#[derive(Debug, Clone)]
pub enum ResponderInput {
    StatusRequest {
        peer: PeerId,
    },
    SyncRequest {
        peer: PeerId,
        request: SyncRequest,
    },
    /// The local ledger committed up to `header`. `sync_state` is the local
    /// sync protocol's phase at that moment.
    LedgerUpdate {
        header: LedgerHeader,
        sync_state: SyncStateKind,
        now: Instant,
    },
}

/// Messages the responder wants sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderOutput {
    SendStatusResponse {
        peer: PeerId,
        response: StatusResponse,
    },
    SendSyncResponse {
        peer: PeerId,
        response: SyncResponse,
    },
    SendStatusUpdate {
        peer: PeerId,
        update: LedgerStatusUpdate,
    },
}

/// Serves remote sync traffic from the committed ledger.
pub struct SyncResponder {
    current_header: LedgerHeader,
    reader: Box<dyn CommittedReader>,
    peers: Box<dyn PeerDirectory>,
    max_peers_to_notify: usize,
    send_limiter: TokenBucket,
    /// Rotates which peers hear about each update.
    notify_offset: usize,
}

impl SyncResponder {
    pub fn new(
        config: &SyncRelayConfig,
        reader: impl CommittedReader + 'static,
        peers: impl PeerDirectory + 'static,
        now: Instant,
    ) -> Self {
        Self {
            current_header: reader.latest_header(),
            reader: Box::new(reader),
            peers: Box::new(peers),
            max_peers_to_notify: config.ledger_status_update_max_peers_to_notify,
            send_limiter: TokenBucket::new(config.max_ledger_updates_rate, now),
            notify_offset: 0,
        }
    }

    /// The header reported to peers asking for our status.
    pub fn current_header(&self) -> &LedgerHeader {
        &self.current_header
    }

    pub fn handle(&mut self, input: ResponderInput) -> Vec<ResponderOutput> {
        match input {
            ResponderInput::StatusRequest { peer } => self.on_status_request(peer),
            ResponderInput::SyncRequest { peer, request } => self.on_sync_request(peer, request),
            ResponderInput::LedgerUpdate {
                header,
                sync_state,
                now,
            } => self.on_ledger_update(header, sync_state, now),
        }
    }

    fn on_status_request(&mut self, peer: PeerId) -> Vec<ResponderOutput> {
        trace!(%peer, version = %self.current_header.state_version, "Answering status request");
        vec![ResponderOutput::SendStatusResponse {
            peer,
            response: StatusResponse {
                header: self.current_header.clone(),
            },
        }]
    }

    fn on_sync_request(&mut self, peer: PeerId, request: SyncRequest) -> Vec<ResponderOutput> {
        let Some(extension) = self.reader.extension_from(&request.from) else {
            trace!(
                %peer,
                request_id = %request.request_id,
                from = %request.from.state_version,
                "Unable to serve sync request"
            );
            metrics::record_remote_sync_request_unserved();
            return vec![];
        };

        trace!(
            %peer,
            request_id = %request.request_id,
            from = %request.from.state_version,
            to = %extension.end.state_version,
            transactions = extension.transactions.len(),
            "Serving sync request"
        );
        metrics::record_remote_sync_request_served();
        vec![ResponderOutput::SendSyncResponse {
            peer,
            response: SyncResponse { extension },
        }]
    }

    fn on_ledger_update(
        &mut self,
        header: LedgerHeader,
        sync_state: SyncStateKind,
        now: Instant,
    ) -> Vec<ResponderOutput> {
        if !header.is_ahead_of(&self.current_header) {
            return vec![];
        }
        self.current_header = header;

        // A node that is catching up has nothing useful to advertise.
        if sync_state != SyncStateKind::Idle {
            return vec![];
        }

        let peers = self.peers.peers();
        if peers.is_empty() {
            return vec![];
        }
        let offset = self.notify_offset % peers.len();
        self.notify_offset = self.notify_offset.wrapping_add(1);

        let update = LedgerStatusUpdate {
            header: self.current_header.clone(),
        };
        let mut outputs = Vec::new();
        for peer in peers
            .iter()
            .cycle()
            .skip(offset)
            .take(peers.len().min(self.max_peers_to_notify))
        {
            if !self.send_limiter.try_consume(now) {
                metrics::record_status_update_rate_limited();
                continue;
            }
            outputs.push(ResponderOutput::SendStatusUpdate {
                peer: *peer,
                update: update.clone(),
            });
        }

        debug!(
            version = %update.header.state_version,
            notified = outputs.len(),
            "Sent ledger status updates"
        );
        metrics::record_status_updates_sent(outputs.len());
        outputs
    }
}
