//! Simulated cluster for ledger sync integration tests.
//!
//! Every node runs a real [`LedgerSyncProtocol`] and [`SyncResponder`] over
//! an [`InMemoryLedger`]. Messages and timers are delivered on a virtual
//! clock in a fixed order, so runs are deterministic.

#![allow(dead_code)]

use ledger_sync_node::{
    generated_transaction, ConsensusProofVerifier, InMemoryLedger, LedgerExtensionVerifier,
    LedgerSyncProtocol, MaliciousResponse, PeerDirectory, ResponderInput, ResponderOutput,
    SharedPeerDirectory, SyncInput, SyncOutput, SyncRelayConfig, SyncResponder,
};
use ledger_sync_types::{
    LedgerHeader, LedgerStatusUpdate, PeerId, RawTransaction, RequestId, StatusRequest,
    StatusResponse, SyncRequest, SyncResponse,
};
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

/// One-way delivery latency between any two nodes.
pub const LATENCY: Duration = Duration::from_millis(10);

/// Delay between an extension being accepted and the ledger reporting it.
pub const COMMIT_DELAY: Duration = Duration::from_millis(1);

/// Accepts every proof; the in-memory ledger still checks the accumulator.
pub struct TrustingProofs;

impl ConsensusProofVerifier for TrustingProofs {
    fn has_quorum(&self, _header: &LedgerHeader) -> bool {
        true
    }

    fn signatures_match(&self, _header: &LedgerHeader) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    StatusRequest(StatusRequest),
    StatusResponse(StatusResponse),
    SyncRequest(SyncRequest),
    SyncResponse(SyncResponse),
    StatusUpdate(LedgerStatusUpdate),
}

enum Scheduled {
    Deliver {
        from: PeerId,
        to: PeerId,
        message: Message,
    },
    Input {
        node: PeerId,
        input: SyncInput,
    },
    LedgerUpdate {
        node: PeerId,
        header: LedgerHeader,
    },
}

pub struct SimNode {
    pub ledger: InMemoryLedger,
    pub protocol: LedgerSyncProtocol,
    pub responder: SyncResponder,
    pub directory: SharedPeerDirectory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSyncRequest {
    pub from: PeerId,
    pub to: PeerId,
    pub request_id: RequestId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ban {
    pub by: PeerId,
    pub peer: PeerId,
    pub reason: MaliciousResponse,
}

pub struct SimCluster {
    nodes: BTreeMap<PeerId, SimNode>,
    queue: BTreeMap<(Duration, u64), Scheduled>,
    seq: u64,
    now: Duration,
    start: Instant,
    /// Nodes that never answer sync requests.
    silent: HashSet<PeerId>,
    /// Nodes that tamper with every sync response they send.
    malicious: HashSet<PeerId>,
    pub sync_requests: Vec<SentSyncRequest>,
    pub bans: Vec<Ban>,
    pub prioritized: Vec<(PeerId, PeerId)>,
}

impl SimCluster {
    /// A fully connected cluster; node `i` starts with `versions[i]`
    /// transactions of the shared generated history.
    pub fn new(versions: &[u64]) -> Self {
        Self::with_config(versions, SyncRelayConfig::default())
    }

    pub fn with_config(versions: &[u64], config: SyncRelayConfig) -> Self {
        let start = Instant::now();
        let ids: Vec<PeerId> = (0..versions.len() as u64).map(PeerId).collect();

        let nodes = ids
            .iter()
            .zip(versions)
            .map(|(&id, &version)| {
                let ledger = InMemoryLedger::with_generated_transactions(version);
                let directory =
                    SharedPeerDirectory::new(ids.iter().copied().filter(|peer| *peer != id));
                let protocol = LedgerSyncProtocol::new(
                    config.clone(),
                    ledger.header(),
                    directory.clone(),
                    LedgerExtensionVerifier::new(TrustingProofs, ledger.clone()),
                );
                let responder =
                    SyncResponder::new(&config, ledger.clone(), directory.clone(), start);
                (
                    id,
                    SimNode {
                        ledger,
                        protocol,
                        responder,
                        directory,
                    },
                )
            })
            .collect();

        Self {
            nodes,
            queue: BTreeMap::new(),
            seq: 0,
            now: Duration::ZERO,
            start,
            silent: HashSet::new(),
            malicious: HashSet::new(),
            sync_requests: Vec::new(),
            bans: Vec::new(),
            prioritized: Vec::new(),
        }
    }

    pub fn node(&self, id: u64) -> &SimNode {
        &self.nodes[&PeerId(id)]
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn silence_sync_requests(&mut self, id: u64) {
        self.silent.insert(PeerId(id));
    }

    pub fn make_malicious(&mut self, id: u64) {
        self.malicious.insert(PeerId(id));
    }

    /// Sync requests sent by node `id`, in order.
    pub fn sync_requests_from(&self, id: u64) -> Vec<PeerId> {
        self.sync_requests
            .iter()
            .filter(|sent| sent.from == PeerId(id))
            .map(|sent| sent.to)
            .collect()
    }

    /// Feed `input` to node `id` at the current time.
    pub fn input(&mut self, id: u64, input: SyncInput) {
        self.schedule(
            Duration::ZERO,
            Scheduled::Input {
                node: PeerId(id),
                input,
            },
        );
    }

    /// Commit `count` new transactions on node `id` as if produced locally.
    pub fn commit_local(&mut self, id: u64, count: u64) -> LedgerHeader {
        let node = PeerId(id);
        let ledger = &self.nodes[&node].ledger;
        let first = ledger.state_version().0;
        let transactions: Vec<RawTransaction> =
            (first..first + count).map(generated_transaction).collect();
        let header = ledger.append(transactions);
        self.schedule(
            Duration::ZERO,
            Scheduled::LedgerUpdate {
                node,
                header: header.clone(),
            },
        );
        header
    }

    /// Process everything scheduled up to `now + duration`.
    pub fn run_for(&mut self, duration: Duration) {
        let deadline = self.now + duration;
        while let Some(entry) = self.queue.first_entry() {
            let (at, _) = *entry.key();
            if at > deadline {
                break;
            }
            let event = entry.remove();
            self.now = at;
            self.process(event);
        }
        self.now = deadline;
    }

    fn schedule(&mut self, delay: Duration, event: Scheduled) {
        self.seq += 1;
        self.queue.insert((self.now + delay, self.seq), event);
    }

    fn send(&mut self, from: PeerId, to: PeerId, message: Message) {
        self.schedule(LATENCY, Scheduled::Deliver { from, to, message });
    }

    fn process(&mut self, event: Scheduled) {
        match event {
            Scheduled::Deliver { from, to, message } => self.deliver(from, to, message),
            Scheduled::Input { node, input } => self.apply_input(node, input),
            Scheduled::LedgerUpdate { node, header } => {
                self.apply_input(
                    node,
                    SyncInput::LedgerUpdate {
                        header: header.clone(),
                    },
                );
                let Some(sim) = self.nodes.get(&node) else {
                    return;
                };
                let sync_state = sim.protocol.state().kind();
                let now = self.start + self.now;
                self.apply_responder(
                    node,
                    ResponderInput::LedgerUpdate {
                        header,
                        sync_state,
                        now,
                    },
                );
            }
        }
    }

    fn deliver(&mut self, from: PeerId, to: PeerId, message: Message) {
        match message {
            Message::StatusRequest(_) => {
                self.apply_responder(to, ResponderInput::StatusRequest { peer: from })
            }
            Message::StatusResponse(response) => self.apply_input(
                to,
                SyncInput::StatusResponse {
                    peer: from,
                    header: response.header,
                },
            ),
            Message::SyncRequest(request) => {
                if !self.silent.contains(&to) {
                    self.apply_responder(to, ResponderInput::SyncRequest { peer: from, request })
                }
            }
            Message::SyncResponse(response) => self.apply_input(
                to,
                SyncInput::SyncResponse {
                    peer: from,
                    response,
                },
            ),
            Message::StatusUpdate(update) => self.apply_input(
                to,
                SyncInput::StatusAdvertisement {
                    peer: from,
                    header: update.header,
                },
            ),
        }
    }

    fn apply_input(&mut self, id: PeerId, input: SyncInput) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let outputs = node.protocol.handle(input);
        let committed = node.ledger.take_committed_headers();

        for output in outputs {
            match output {
                SyncOutput::SendStatusRequest { peer } => {
                    self.send(id, peer, Message::StatusRequest(StatusRequest))
                }
                SyncOutput::SendSyncRequest { peer, request } => {
                    self.sync_requests.push(SentSyncRequest {
                        from: id,
                        to: peer,
                        request_id: request.request_id,
                    });
                    self.send(id, peer, Message::SyncRequest(request));
                }
                SyncOutput::ScheduleTimeout { timeout, delay } => self.schedule(
                    delay,
                    Scheduled::Input {
                        node: id,
                        input: timeout.into_input(),
                    },
                ),
                SyncOutput::BanPeer { peer, reason, .. } => {
                    if let Some(node) = self.nodes.get(&id) {
                        node.directory.remove(&peer);
                    }
                    self.bans.push(Ban {
                        by: id,
                        peer,
                        reason,
                    });
                }
                SyncOutput::PrioritizePeer { peer } => self.prioritized.push((id, peer)),
            }
        }

        for header in committed {
            self.schedule(COMMIT_DELAY, Scheduled::LedgerUpdate { node: id, header });
        }
    }

    fn apply_responder(&mut self, id: PeerId, input: ResponderInput) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let outputs = node.responder.handle(input);

        for output in outputs {
            match output {
                ResponderOutput::SendStatusResponse { peer, response } => {
                    self.send(id, peer, Message::StatusResponse(response))
                }
                ResponderOutput::SendSyncResponse { peer, mut response } => {
                    if self.malicious.contains(&id) {
                        if let Some(first) = response.extension.transactions.first_mut() {
                            *first = RawTransaction(b"forged".to_vec());
                        }
                    }
                    self.send(id, peer, Message::SyncResponse(response));
                }
                ResponderOutput::SendStatusUpdate { peer, update } => {
                    self.send(id, peer, Message::StatusUpdate(update))
                }
            }
        }
    }

    /// Whether node `id` still lists `peer` in its directory.
    pub fn knows(&self, id: u64, peer: u64) -> bool {
        self.node(id).directory.has_peer(&PeerId(peer))
    }
}
