//! Ledger headers and extensions.

use crate::{Hash, StateVersion};
use serde::{Deserialize, Serialize};

/// A verified checkpoint of ledger state.
///
/// The sync protocol only ever compares [`state_version`](Self::state_version);
/// the remaining fields travel with the header so that verification and
/// commit collaborators can check them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerHeader {
    /// Ledger progress at this checkpoint.
    pub state_version: StateVersion,
    /// Consensus epoch the proof was produced in.
    pub epoch: u64,
    /// Timestamp of the proposal that produced this checkpoint.
    pub proposer_timestamp_ms: u64,
    /// Running accumulator over all committed transactions.
    pub accumulator: Hash,
}

impl LedgerHeader {
    /// The header every ledger starts from.
    pub fn genesis() -> Self {
        Self {
            state_version: StateVersion::PRE_GENESIS,
            epoch: 0,
            proposer_timestamp_ms: 0,
            accumulator: Hash::ZERO,
        }
    }

    pub fn is_ahead_of(&self, other: &LedgerHeader) -> bool {
        self.state_version > other.state_version
    }
}

/// An opaque, not-yet-parsed transaction as carried in a ledger extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawTransaction(pub Vec<u8>);

impl RawTransaction {
    pub fn hash(&self) -> Hash {
        Hash::from_bytes(&self.0)
    }
}

/// A contiguous batch of transactions plus the proof justifying them.
///
/// `start` is the header the requester reported; `end` is the proof the
/// batch claims to reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerExtension {
    pub start: LedgerHeader,
    pub transactions: Vec<RawTransaction>,
    pub end: LedgerHeader,
}

impl LedgerExtension {
    pub fn transaction_count(&self) -> u64 {
        self.transactions.len() as u64
    }

    /// The state version `start` would reach after applying every transaction.
    pub fn implied_end_version(&self) -> StateVersion {
        self.start.state_version.advanced_by(self.transaction_count())
    }

    /// Accumulator obtained by folding every transaction hash onto `start`.
    pub fn computed_accumulator(&self) -> Hash {
        self.transactions
            .iter()
            .fold(self.start.accumulator, |acc, tx| acc.accumulate(&tx.hash()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(version: u64) -> LedgerHeader {
        LedgerHeader {
            state_version: StateVersion(version),
            ..LedgerHeader::genesis()
        }
    }

    #[test]
    fn test_implied_end_version() {
        let extension = LedgerExtension {
            start: header(10),
            transactions: vec![RawTransaction(vec![1]), RawTransaction(vec![2])],
            end: header(12),
        };
        assert_eq!(extension.implied_end_version(), StateVersion(12));
        assert_eq!(extension.transaction_count(), 2);
    }

    #[test]
    fn test_computed_accumulator_depends_on_transactions() {
        let a = LedgerExtension {
            start: header(0),
            transactions: vec![RawTransaction(vec![1])],
            end: header(1),
        };
        let b = LedgerExtension {
            transactions: vec![RawTransaction(vec![2])],
            ..a.clone()
        };
        assert_ne!(a.computed_accumulator(), b.computed_accumulator());
        assert_eq!(
            a.computed_accumulator(),
            Hash::ZERO.accumulate(&RawTransaction(vec![1]).hash())
        );
    }

    #[test]
    fn test_is_ahead_of() {
        assert!(header(5).is_ahead_of(&header(4)));
        assert!(!header(4).is_ahead_of(&header(4)));
    }
}
