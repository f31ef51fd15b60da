//! Metrics facade for ledger sync.
//!
//! Provides a [`MetricsRecorder`] trait with sync-specific methods and default
//! no-op implementations. A global singleton recorder is accessed via
//! `recorder()`, and convenience free functions delegate to it.
//!
//! # Usage
//!
//! ```ignore
//! ledger_sync_metrics::record_sync_request_sent();
//! ledger_sync_metrics::set_sync_versions(current, target, true);
//! ```
//!
//! At startup a backend may be installed with [`set_global_recorder`]. Without
//! one every call is a no-op.

use std::sync::OnceLock;

// ═══════════════════════════════════════════════════════════════════════
// Trait
// ═══════════════════════════════════════════════════════════════════════

/// Domain-specific metrics recording trait.
///
/// All methods have default no-op implementations so backends only need
/// to override the metrics they care about.
#[allow(unused_variables)]
pub trait MetricsRecorder: Send + Sync + 'static {
    // ── Local sync ───────────────────────────────────────────────────

    /// Set the current/target state version gauges.
    fn set_sync_versions(&self, current: u64, target: u64, in_progress: bool) {}

    /// Record status requests sent at the start of a sync check.
    fn record_status_requests_sent(&self, count: usize) {}

    /// Record a sync check that closed with `responses` status replies.
    fn record_sync_check_completed(&self, responses: usize) {}

    /// Record a sync request dispatched to a candidate.
    fn record_sync_request_sent(&self) {}

    /// Record a sync request that timed out.
    fn record_sync_request_timeout(&self) {}

    /// Record a verified and applied sync response.
    fn record_sync_response_accepted(&self) {}

    /// Record an ignored (stale or unsolicited) sync response.
    fn record_sync_response_unsolicited(&self, reason: &str) {}

    /// Record a peer banned for a malicious sync response.
    fn record_sync_peer_banned(&self, reason: &str) {}

    /// Record a ledger update timeout that resumed the pipeline.
    fn record_ledger_update_timeout(&self) {}

    // ── Remote sync ──────────────────────────────────────────────────

    /// Record a remote sync request served with an extension.
    fn record_remote_sync_request_served(&self) {}

    /// Record a remote sync request we could not serve.
    fn record_remote_sync_request_unserved(&self) {}

    /// Record ledger status updates pushed to peers.
    fn record_status_updates_sent(&self, count: usize) {}

    /// Record a ledger status update dropped by the send rate limiter.
    fn record_status_update_rate_limited(&self) {}
}

// ═══════════════════════════════════════════════════════════════════════
// Global singleton
// ═══════════════════════════════════════════════════════════════════════

struct NoopRecorder;
impl MetricsRecorder for NoopRecorder {}

static RECORDER: OnceLock<Box<dyn MetricsRecorder>> = OnceLock::new();

/// Install a global metrics recorder.
///
/// Can only be called once. Subsequent calls are silently ignored.
pub fn set_global_recorder(recorder: Box<dyn MetricsRecorder>) {
    let _ = RECORDER.set(recorder);
}

#[inline]
fn recorder() -> &'static dyn MetricsRecorder {
    RECORDER.get().map(|r| r.as_ref()).unwrap_or(&NoopRecorder)
}

// ═══════════════════════════════════════════════════════════════════════
// Convenience free functions
// ═══════════════════════════════════════════════════════════════════════

// ── Local sync ───────────────────────────────────────────────────────

#[inline]
pub fn set_sync_versions(current: u64, target: u64, in_progress: bool) {
    recorder().set_sync_versions(current, target, in_progress);
}

#[inline]
pub fn record_status_requests_sent(count: usize) {
    recorder().record_status_requests_sent(count);
}

#[inline]
pub fn record_sync_check_completed(responses: usize) {
    recorder().record_sync_check_completed(responses);
}

#[inline]
pub fn record_sync_request_sent() {
    recorder().record_sync_request_sent();
}

#[inline]
pub fn record_sync_request_timeout() {
    recorder().record_sync_request_timeout();
}

#[inline]
pub fn record_sync_response_accepted() {
    recorder().record_sync_response_accepted();
}

#[inline]
pub fn record_sync_response_unsolicited(reason: &str) {
    recorder().record_sync_response_unsolicited(reason);
}

#[inline]
pub fn record_sync_peer_banned(reason: &str) {
    recorder().record_sync_peer_banned(reason);
}

#[inline]
pub fn record_ledger_update_timeout() {
    recorder().record_ledger_update_timeout();
}

// ── Remote sync ──────────────────────────────────────────────────────

#[inline]
pub fn record_remote_sync_request_served() {
    recorder().record_remote_sync_request_served();
}

#[inline]
pub fn record_remote_sync_request_unserved() {
    recorder().record_remote_sync_request_unserved();
}

#[inline]
pub fn record_status_updates_sent(count: usize) {
    recorder().record_status_updates_sent(count);
}

#[inline]
pub fn record_status_update_rate_limited() {
    recorder().record_status_update_rate_limited();
}
