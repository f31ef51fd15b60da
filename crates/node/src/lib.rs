//! Ledger sync state machines.
//!
//! - [`LedgerSyncProtocol`]: the local side. Detects that peers are ahead and
//!   pulls verified ledger extensions until the node catches up.
//! - [`SyncResponder`]: the serving side. Answers peers' status and sync
//!   requests and advertises new commits.
//!
//! Both are pure: they take inputs and return outputs, leaving network,
//! timers and storage to the runner.

mod candidates;
mod config;
mod memory;
mod peers;
mod rate_limiter;
mod responder;
mod state;
mod sync_protocol;
mod verification;

pub use candidates::CandidateQueue;
pub use config::SyncRelayConfig;
pub use memory::{generated_transaction, InMemoryLedger};
pub use peers::{PeerDirectory, SharedPeerDirectory};
pub use rate_limiter::TokenBucket;
pub use responder::{CommittedReader, ResponderInput, ResponderOutput, SyncResponder};
pub use state::{
    IdleState, PendingRequest, SyncCheckState, SyncState, SyncStateKind, SyncingState,
};
pub use sync_protocol::{LedgerSyncProtocol, SyncInput, SyncOutput, SyncStatus, SyncTimeout};
pub use verification::{
    CommitError, ConsensusProofVerifier, LedgerCommitter, LedgerExtensionVerifier,
    MaliciousResponse, SyncResponseVerifier, UnsolicitedResponse, VerificationOutcome,
};
