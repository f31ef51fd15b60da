//! Sync response verification.
//!
//! The protocol hands every sync response to a [`SyncResponseVerifier`] and
//! only looks at the category of the result:
//!
//! - [`VerificationOutcome::Accepted`]: the extension was handed to the
//!   ledger for commit.
//! - [`VerificationOutcome::Unsolicited`]: stale or unexpected, dropped
//!   without touching the sender's reputation.
//! - [`VerificationOutcome::Malicious`]: the sender proved itself dishonest
//!   and is banned.
//!
//! [`LedgerExtensionVerifier`] is the standard implementation, combining a
//! consensus proof check with a ledger commit.

use crate::state::SyncingState;
use ledger_sync_types::{Hash, LedgerExtension, LedgerHeader, PeerId, StateVersion, SyncResponse};
use thiserror::Error;
use tracing::{debug, trace, warn};

// ═══════════════════════════════════════════════════════════════════════
// Outcomes
// ═══════════════════════════════════════════════════════════════════════

/// A response that arrived when nothing (or something else) was expected.
///
/// Usually a late reply after a timeout rotated to another peer. Never
/// grounds for a ban.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsolicitedResponse {
    #[error("no sync request pending")]
    NoRequestPending,

    #[error("response from {actual}, request was sent to {expected}")]
    SenderMismatch { expected: PeerId, actual: PeerId },

    #[error("extension starts at {start}, local ledger is at {current}")]
    ExtensionStartMismatch {
        start: StateVersion,
        current: StateVersion,
    },
}

impl UnsolicitedResponse {
    /// Low-cardinality label for metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::NoRequestPending => "no_request_pending",
            Self::SenderMismatch { .. } => "sender_mismatch",
            Self::ExtensionStartMismatch { .. } => "extension_start_mismatch",
        }
    }
}

/// A response no honest peer could have produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaliciousResponse {
    #[error("sync response carries no transactions")]
    EmptyResponse,

    #[error("{count} transactions from version {start} cannot reach version {end}")]
    InconsistentTransactionCount {
        start: StateVersion,
        count: u64,
        end: StateVersion,
    },

    #[error("proof at version {version} lacks a quorum of the validator set")]
    InsufficientQuorum { version: StateVersion },

    #[error("proof signatures at version {version} do not verify")]
    SignatureMismatch { version: StateVersion },

    #[error("transaction {index} could not be parsed")]
    UnparseableTransaction { index: usize },

    #[error("computed accumulator {computed} does not match proof accumulator {expected}")]
    ComputedRootMismatch { expected: Hash, computed: Hash },
}

impl MaliciousResponse {
    /// Low-cardinality label for metrics and ban reasons.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::EmptyResponse => "empty_response",
            Self::InconsistentTransactionCount { .. } => "inconsistent_transaction_count",
            Self::InsufficientQuorum { .. } => "insufficient_quorum",
            Self::SignatureMismatch { .. } => "signature_mismatch",
            Self::UnparseableTransaction { .. } => "unparseable_transaction",
            Self::ComputedRootMismatch { .. } => "computed_root_mismatch",
        }
    }
}

/// Result of verifying (and, on success, applying) a sync response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Accepted,
    Unsolicited(UnsolicitedResponse),
    Malicious(MaliciousResponse),
}

// ═══════════════════════════════════════════════════════════════════════
// Collaborator traits
// ═══════════════════════════════════════════════════════════════════════

/// Verifies a sync response against the current syncing state and, if it
/// holds up, applies it.
pub trait SyncResponseVerifier: Send {
    fn verify_and_apply(
        &mut self,
        state: &SyncingState,
        peer: PeerId,
        response: &SyncResponse,
    ) -> VerificationOutcome;
}

/// Cryptographic checks on a ledger proof.
pub trait ConsensusProofVerifier: Send {
    /// Whether the signers of `header` hold a quorum of the validator set
    /// of its epoch.
    fn has_quorum(&self, header: &LedgerHeader) -> bool;

    /// Whether every signature on `header` verifies.
    fn signatures_match(&self, header: &LedgerHeader) -> bool;
}

/// Reasons the ledger refused an extension.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    /// The extension does not continue the ledger's current head. Not
    /// evidence of misbehaviour: the request may predate a commit.
    #[error("extension starts at {start}, ledger head is at {head}")]
    StartMismatch {
        start: StateVersion,
        head: StateVersion,
    },

    #[error("transaction {index} could not be parsed")]
    TransactionParsingFailed { index: usize },

    #[error("transaction root mismatch: expected {expected}, computed {computed}")]
    TransactionRootMismatch { expected: Hash, computed: Hash },
}

/// Submits a verified extension for durable commit.
///
/// Commit completion is reported back to the protocol separately as a
/// ledger update.
pub trait LedgerCommitter: Send {
    fn commit(&mut self, extension: &LedgerExtension) -> Result<(), CommitError>;
}

// ═══════════════════════════════════════════════════════════════════════
// LedgerExtensionVerifier
// ═══════════════════════════════════════════════════════════════════════

/// Standard verifier: request bookkeeping, structural checks, proof checks,
/// then commit.
pub struct LedgerExtensionVerifier<P, C> {
    proofs: P,
    committer: C,
}

impl<P: ConsensusProofVerifier, C: LedgerCommitter> LedgerExtensionVerifier<P, C> {
    pub fn new(proofs: P, committer: C) -> Self {
        Self { proofs, committer }
    }

    pub fn committer(&self) -> &C {
        &self.committer
    }

    fn check_solicited(
        state: &SyncingState,
        peer: PeerId,
        extension: &LedgerExtension,
    ) -> Result<(), UnsolicitedResponse> {
        let pending = state
            .pending_request()
            .ok_or(UnsolicitedResponse::NoRequestPending)?;

        if pending.peer != peer {
            return Err(UnsolicitedResponse::SenderMismatch {
                expected: pending.peer,
                actual: peer,
            });
        }

        let current = state.current_header.state_version;
        if extension.start.state_version != current {
            return Err(UnsolicitedResponse::ExtensionStartMismatch {
                start: extension.start.state_version,
                current,
            });
        }

        Ok(())
    }

    fn check_proof(&self, extension: &LedgerExtension) -> Result<(), MaliciousResponse> {
        if extension.transactions.is_empty() {
            return Err(MaliciousResponse::EmptyResponse);
        }

        if extension.implied_end_version() != extension.end.state_version {
            return Err(MaliciousResponse::InconsistentTransactionCount {
                start: extension.start.state_version,
                count: extension.transaction_count(),
                end: extension.end.state_version,
            });
        }

        let version = extension.end.state_version;
        if !self.proofs.has_quorum(&extension.end) {
            return Err(MaliciousResponse::InsufficientQuorum { version });
        }
        if !self.proofs.signatures_match(&extension.end) {
            return Err(MaliciousResponse::SignatureMismatch { version });
        }

        Ok(())
    }
}

impl<P: ConsensusProofVerifier, C: LedgerCommitter> SyncResponseVerifier
    for LedgerExtensionVerifier<P, C>
{
    fn verify_and_apply(
        &mut self,
        state: &SyncingState,
        peer: PeerId,
        response: &SyncResponse,
    ) -> VerificationOutcome {
        let extension = &response.extension;

        if let Err(reason) = Self::check_solicited(state, peer, extension) {
            debug!(%peer, %reason, "Unsolicited sync response");
            return VerificationOutcome::Unsolicited(reason);
        }

        if let Err(reason) = self.check_proof(extension) {
            warn!(%peer, %reason, "Sync response failed verification");
            return VerificationOutcome::Malicious(reason);
        }

        match self.committer.commit(extension) {
            Ok(()) => {
                trace!(
                    %peer,
                    start = %extension.start.state_version,
                    end = %extension.end.state_version,
                    "Sync response committed"
                );
                VerificationOutcome::Accepted
            }
            Err(CommitError::StartMismatch { start, head }) => {
                debug!(%peer, %start, %head, "Sync response no longer continues the ledger");
                VerificationOutcome::Unsolicited(UnsolicitedResponse::ExtensionStartMismatch {
                    start,
                    current: head,
                })
            }
            Err(CommitError::TransactionParsingFailed { index }) => {
                warn!(%peer, index, "Sync response carries an unparseable transaction");
                VerificationOutcome::Malicious(MaliciousResponse::UnparseableTransaction { index })
            }
            Err(CommitError::TransactionRootMismatch { expected, computed }) => {
                warn!(%peer, %expected, %computed, "Sync response transaction root mismatch");
                VerificationOutcome::Malicious(MaliciousResponse::ComputedRootMismatch {
                    expected,
                    computed,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_sync_types::{RawTransaction, RequestId};

    struct StubProofs {
        quorum: bool,
        signatures: bool,
    }

    impl ConsensusProofVerifier for StubProofs {
        fn has_quorum(&self, _header: &LedgerHeader) -> bool {
            self.quorum
        }

        fn signatures_match(&self, _header: &LedgerHeader) -> bool {
            self.signatures
        }
    }

    #[derive(Default)]
    struct RecordingCommitter {
        fail_with: Option<CommitError>,
        committed: Vec<StateVersion>,
    }

    impl LedgerCommitter for RecordingCommitter {
        fn commit(&mut self, extension: &LedgerExtension) -> Result<(), CommitError> {
            if let Some(error) = self.fail_with.clone() {
                return Err(error);
            }
            self.committed.push(extension.end.state_version);
            Ok(())
        }
    }

    fn header(version: u64) -> LedgerHeader {
        LedgerHeader {
            state_version: StateVersion(version),
            ..LedgerHeader::genesis()
        }
    }

    fn response(start: u64, count: usize, end: u64) -> SyncResponse {
        SyncResponse {
            extension: LedgerExtension {
                start: header(start),
                transactions: (0..count).map(|i| RawTransaction(vec![i as u8 + 1])).collect(),
                end: header(end),
            },
        }
    }

    fn verifier(
        quorum: bool,
        signatures: bool,
        fail_with: Option<CommitError>,
    ) -> LedgerExtensionVerifier<StubProofs, RecordingCommitter> {
        LedgerExtensionVerifier::new(
            StubProofs { quorum, signatures },
            RecordingCommitter {
                fail_with,
                ..Default::default()
            },
        )
    }

    fn pending_from(peer: u64) -> SyncingState {
        SyncingState::new(header(10), [PeerId(peer)], header(20))
            .with_pending_request(PeerId(peer), RequestId(1))
    }

    #[test]
    fn test_valid_response_is_committed() {
        let mut verifier = verifier(true, true, None);
        let outcome = verifier.verify_and_apply(&pending_from(1), PeerId(1), &response(10, 5, 15));
        assert_eq!(outcome, VerificationOutcome::Accepted);
        assert_eq!(verifier.committer().committed, vec![StateVersion(15)]);
    }

    #[test]
    fn test_no_pending_request_is_unsolicited() {
        let mut verifier = verifier(true, true, None);
        let state = SyncingState::new(header(10), [PeerId(1)], header(20));
        let outcome = verifier.verify_and_apply(&state, PeerId(1), &response(10, 5, 15));
        assert_eq!(
            outcome,
            VerificationOutcome::Unsolicited(UnsolicitedResponse::NoRequestPending)
        );
        assert!(verifier.committer().committed.is_empty());
    }

    #[test]
    fn test_wrong_sender_is_unsolicited() {
        let mut verifier = verifier(true, true, None);
        let outcome = verifier.verify_and_apply(&pending_from(1), PeerId(2), &response(10, 5, 15));
        assert!(matches!(
            outcome,
            VerificationOutcome::Unsolicited(UnsolicitedResponse::SenderMismatch { .. })
        ));
    }

    #[test]
    fn test_stale_start_is_unsolicited() {
        let mut verifier = verifier(true, true, None);
        let outcome = verifier.verify_and_apply(&pending_from(1), PeerId(1), &response(8, 7, 15));
        assert_eq!(
            outcome,
            VerificationOutcome::Unsolicited(UnsolicitedResponse::ExtensionStartMismatch {
                start: StateVersion(8),
                current: StateVersion(10),
            })
        );
    }

    #[test]
    fn test_structural_failures_are_malicious() {
        let mut verifier = verifier(true, true, None);

        let empty = verifier.verify_and_apply(&pending_from(1), PeerId(1), &response(10, 0, 10));
        assert_eq!(
            empty,
            VerificationOutcome::Malicious(MaliciousResponse::EmptyResponse)
        );

        let miscounted =
            verifier.verify_and_apply(&pending_from(1), PeerId(1), &response(10, 3, 15));
        assert!(matches!(
            miscounted,
            VerificationOutcome::Malicious(MaliciousResponse::InconsistentTransactionCount {
                count: 3,
                ..
            })
        ));
        assert!(verifier.committer().committed.is_empty());
    }

    #[test]
    fn test_proof_failures_are_malicious() {
        let mut no_quorum = verifier(false, true, None);
        let outcome = no_quorum.verify_and_apply(&pending_from(1), PeerId(1), &response(10, 5, 15));
        assert_eq!(
            outcome,
            VerificationOutcome::Malicious(MaliciousResponse::InsufficientQuorum {
                version: StateVersion(15)
            })
        );

        let mut bad_signatures = verifier(true, false, None);
        let outcome =
            bad_signatures.verify_and_apply(&pending_from(1), PeerId(1), &response(10, 5, 15));
        assert_eq!(
            outcome,
            VerificationOutcome::Malicious(MaliciousResponse::SignatureMismatch {
                version: StateVersion(15)
            })
        );
    }

    #[test]
    fn test_commit_failures_are_malicious() {
        let mut unparseable = verifier(
            true,
            true,
            Some(CommitError::TransactionParsingFailed { index: 2 }),
        );
        let outcome =
            unparseable.verify_and_apply(&pending_from(1), PeerId(1), &response(10, 5, 15));
        assert_eq!(
            outcome,
            VerificationOutcome::Malicious(MaliciousResponse::UnparseableTransaction { index: 2 })
        );

        let mut wrong_root = verifier(
            true,
            true,
            Some(CommitError::TransactionRootMismatch {
                expected: Hash::ZERO,
                computed: Hash::from_bytes(b"other"),
            }),
        );
        let outcome =
            wrong_root.verify_and_apply(&pending_from(1), PeerId(1), &response(10, 5, 15));
        assert!(matches!(
            outcome,
            VerificationOutcome::Malicious(MaliciousResponse::ComputedRootMismatch { .. })
        ));
    }

    #[test]
    fn test_commit_start_mismatch_is_unsolicited() {
        let mut verifier = verifier(
            true,
            true,
            Some(CommitError::StartMismatch {
                start: StateVersion(10),
                head: StateVersion(15),
            }),
        );
        let outcome = verifier.verify_and_apply(&pending_from(1), PeerId(1), &response(10, 5, 15));
        assert_eq!(
            outcome,
            VerificationOutcome::Unsolicited(UnsolicitedResponse::ExtensionStartMismatch {
                start: StateVersion(10),
                current: StateVersion(15),
            })
        );
    }

    #[test]
    fn test_metric_labels_are_distinct() {
        let labels = [
            MaliciousResponse::EmptyResponse.metric_label(),
            MaliciousResponse::InsufficientQuorum {
                version: StateVersion(1),
            }
            .metric_label(),
            MaliciousResponse::SignatureMismatch {
                version: StateVersion(1),
            }
            .metric_label(),
            MaliciousResponse::UnparseableTransaction { index: 0 }.metric_label(),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
        assert_eq!(
            UnsolicitedResponse::NoRequestPending.metric_label(),
            "no_request_pending"
        );
    }
}
