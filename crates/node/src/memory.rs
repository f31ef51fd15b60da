//! In-memory ledger for simulation and testing.
//!
//! Implements both sides a node needs: [`LedgerCommitter`] for the local
//! sync protocol and [`CommittedReader`] for serving peers. Clones share the
//! same ledger, so one clone can sit inside a verifier while another backs a
//! responder.

use crate::responder::CommittedReader;
use crate::verification::{CommitError, LedgerCommitter};
use ledger_sync_types::{Hash, LedgerExtension, LedgerHeader, RawTransaction, StateVersion};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug)]
struct LedgerInner {
    header: LedgerHeader,
    transactions: Vec<RawTransaction>,
    /// `accumulators[v]` is the accumulator at state version `v`.
    accumulators: Vec<Hash>,
    /// Headers committed through [`LedgerCommitter`] not yet drained.
    unreported: Vec<LedgerHeader>,
}

impl Default for LedgerInner {
    fn default() -> Self {
        Self {
            header: LedgerHeader::genesis(),
            transactions: Vec::new(),
            accumulators: vec![Hash::ZERO],
            unreported: Vec::new(),
        }
    }
}

impl LedgerInner {
    fn accumulator_at(&self, version: StateVersion) -> Option<Hash> {
        usize::try_from(version.0)
            .ok()
            .and_then(|index| self.accumulators.get(index).copied())
    }

    fn push(&mut self, transaction: RawTransaction) {
        let last = self.accumulators.last().copied().unwrap_or(Hash::ZERO);
        self.accumulators.push(last.accumulate(&transaction.hash()));
        self.transactions.push(transaction);
    }
}

/// Shared in-memory ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl InMemoryLedger {
    /// An empty ledger at the genesis header.
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger that already holds `count` generated transactions.
    pub fn with_generated_transactions(count: u64) -> Self {
        let ledger = Self::new();
        ledger.append((0..count).map(generated_transaction).collect());
        ledger
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The latest committed header.
    pub fn header(&self) -> LedgerHeader {
        self.lock().header.clone()
    }

    pub fn state_version(&self) -> StateVersion {
        self.lock().header.state_version
    }

    /// Append locally produced transactions and return the new header.
    pub fn append(&self, transactions: Vec<RawTransaction>) -> LedgerHeader {
        let mut inner = self.lock();
        let count = transactions.len() as u64;
        for transaction in transactions {
            inner.push(transaction);
        }
        let accumulator = inner.accumulators.last().copied().unwrap_or(Hash::ZERO);
        let previous = inner.header.clone();
        inner.header = LedgerHeader {
            state_version: previous.state_version.advanced_by(count),
            epoch: previous.epoch,
            proposer_timestamp_ms: previous.proposer_timestamp_ms + 1,
            accumulator,
        };
        inner.header.clone()
    }

    /// Headers committed from sync responses since the last call, oldest
    /// first.
    pub fn take_committed_headers(&self) -> Vec<LedgerHeader> {
        std::mem::take(&mut self.lock().unreported)
    }
}

impl LedgerCommitter for InMemoryLedger {
    fn commit(&mut self, extension: &LedgerExtension) -> Result<(), CommitError> {
        let mut inner = self.lock();

        // The protocol may have asked from a header we have since moved past.
        if extension.start != inner.header {
            return Err(CommitError::StartMismatch {
                start: extension.start.state_version,
                head: inner.header.state_version,
            });
        }

        if let Some(index) = extension.transactions.iter().position(|tx| tx.0.is_empty()) {
            return Err(CommitError::TransactionParsingFailed { index });
        }

        let computed = extension.computed_accumulator();
        if computed != extension.end.accumulator {
            return Err(CommitError::TransactionRootMismatch {
                expected: extension.end.accumulator,
                computed,
            });
        }

        for transaction in &extension.transactions {
            inner.push(transaction.clone());
        }
        inner.header = extension.end.clone();
        inner.unreported.push(extension.end.clone());
        trace!(version = %extension.end.state_version, "Committed ledger extension");
        Ok(())
    }
}

impl CommittedReader for InMemoryLedger {
    fn latest_header(&self) -> LedgerHeader {
        self.header()
    }

    fn extension_from(&self, from: &LedgerHeader) -> Option<LedgerExtension> {
        let inner = self.lock();
        if from.state_version >= inner.header.state_version {
            return None;
        }

        // A requester on a different history cannot use our transactions.
        if inner.accumulator_at(from.state_version) != Some(from.accumulator) {
            trace!(from = %from.state_version, "Requester history diverges from ours");
            return None;
        }

        let start = usize::try_from(from.state_version.0).ok()?;
        let end = usize::try_from(inner.header.state_version.0).ok()?;
        Some(LedgerExtension {
            start: from.clone(),
            transactions: inner.transactions.get(start..end)?.to_vec(),
            end: inner.header.clone(),
        })
    }
}

/// Deterministic non-empty transaction payload for version `n`.
pub fn generated_transaction(n: u64) -> RawTransaction {
    RawTransaction(format!("tx-{n}").into_bytes())
}
