//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a remote peer.
///
/// The sync protocol never interprets the value; it only compares, hashes
/// and forwards it to the network and peer-control layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Identifier of an outbound sync request.
///
/// Strictly increasing over a node's lifetime; used to tell a live request
/// timeout apart from a stale one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    /// The id following this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonically increasing counter of committed ledger progress.
///
/// Each committed transaction advances the state version by one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StateVersion(pub u64);

impl StateVersion {
    pub const PRE_GENESIS: Self = Self(0);

    /// The version reached after committing `count` more transactions.
    pub fn advanced_by(self, count: u64) -> Self {
        Self(self.0.saturating_add(count))
    }

    /// How many versions `self` is ahead of `other` (zero if behind).
    pub fn distance_from(self, other: StateVersion) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for StateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
