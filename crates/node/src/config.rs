//! Relay configuration for ledger sync.

use std::time::Duration;

/// Timeouts and limits shared by the local sync protocol and the responder.
///
/// Bundles every tunable so runners can pass a single value.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRelayConfig {
    /// Period of the `CheckTrigger` timer.
    pub sync_check_interval: Duration,

    /// How long a sync check waits for status responses before deciding
    /// with whatever arrived.
    pub sync_check_receive_status_timeout: Duration,

    /// How long a sync request may stay unanswered before the next
    /// candidate is tried.
    pub sync_request_timeout: Duration,

    /// How long to wait for the local commit of an accepted extension.
    pub ledger_update_timeout: Duration,

    /// Upper bound on peers asked during a sync check. `None` asks every
    /// ledger-sync peer in the directory.
    pub sync_check_max_peers: Option<usize>,

    /// Ban length requested for a peer that sent a malicious response.
    pub ban_duration: Duration,

    /// Upper bound on peers notified when the local ledger advances.
    pub ledger_status_update_max_peers_to_notify: usize,

    /// Maximum ledger status updates sent per second.
    pub max_ledger_updates_rate: f64,
}

impl Default for SyncRelayConfig {
    fn default() -> Self {
        Self {
            sync_check_interval: Duration::from_millis(3000),
            sync_check_receive_status_timeout: Duration::from_millis(5000),
            sync_request_timeout: Duration::from_millis(5000),
            ledger_update_timeout: Duration::from_millis(1000),
            sync_check_max_peers: None,
            ban_duration: Duration::from_secs(30 * 60),
            ledger_status_update_max_peers_to_notify: 10,
            max_ledger_updates_rate: 50.0,
        }
    }
}
