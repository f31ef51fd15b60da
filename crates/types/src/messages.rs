//! Wire messages exchanged by the ledger sync protocol.
//!
//! Encoding and transport belong to the network layer; these are plain
//! serde-derivable values.

use crate::{LedgerExtension, LedgerHeader, RequestId};
use serde::{Deserialize, Serialize};

/// Asks a peer for its latest ledger header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest;

/// Reply to a [`StatusRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub header: LedgerHeader,
}

/// Asks a peer for the ledger extension that follows `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub from: LedgerHeader,
    pub request_id: RequestId,
}

/// Reply to a [`SyncRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub extension: LedgerExtension,
}

/// Unsolicited push of a peer's latest ledger header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatusUpdate {
    pub header: LedgerHeader,
}
