//! Core types for ledger sync.
//!
//! - **Primitives**: [`Hash`] and the accumulator fold
//! - **Identifiers**: [`PeerId`], [`RequestId`], [`StateVersion`]
//! - **Ledger**: [`LedgerHeader`], [`LedgerExtension`], [`RawTransaction`]
//! - **Messages**: the request/response/advertisement wire values
//!
//! This crate does not depend on any other workspace crate.

mod hash;
mod identifiers;
mod ledger;
mod messages;

pub use hash::Hash;
pub use identifiers::{PeerId, RequestId, StateVersion};
pub use ledger::{LedgerExtension, LedgerHeader, RawTransaction};
pub use messages::{
    LedgerStatusUpdate, StatusRequest, StatusResponse, SyncRequest, SyncResponse,
};
