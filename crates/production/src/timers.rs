//! Timer management for the sync runner.
//!
//! Each timer is a tokio task that sleeps for the requested delay and then
//! posts the timeout back into the runner's event channel. The protocol
//! re-checks every timeout's token on expiry, so timers are only cancelled
//! at shutdown.

use crate::runner::RunnerEvent;
use ledger_sync_node::SyncTimeout;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Manages timers for the sync runner.
pub struct TimerManager {
    /// Active timers (timeout -> task handle).
    timers: HashMap<SyncTimeout, JoinHandle<()>>,
    /// Event sender for timer fires.
    event_tx: mpsc::Sender<RunnerEvent>,
}

impl TimerManager {
    /// Create a new timer manager.
    pub fn new(event_tx: mpsc::Sender<RunnerEvent>) -> Self {
        Self {
            timers: HashMap::new(),
            event_tx,
        }
    }

    /// Fire `timeout` after `delay`.
    ///
    /// An identical timeout already pending is replaced.
    pub fn schedule(&mut self, timeout: SyncTimeout, delay: Duration) {
        self.cancel(&timeout);

        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!(?timeout, "Timer fired, sending event");
            // A closed channel means the runner has shut down.
            let _ = event_tx.send(RunnerEvent::Timeout(timeout)).await;
        });

        self.timers.insert(timeout, handle);
        debug!(?timeout, ?delay, "Timer set");
    }

    /// Forget a timer that has delivered its event.
    pub fn fired(&mut self, timeout: &SyncTimeout) {
        self.timers.remove(timeout);
    }

    /// Cancel a timer.
    ///
    /// If the timer doesn't exist or has already fired, this is a no-op.
    pub fn cancel(&mut self, timeout: &SyncTimeout) {
        if let Some(handle) = self.timers.remove(timeout) {
            handle.abort();
            trace!(?timeout, "Timer cancelled");
        }
    }

    /// Cancel all timers.
    ///
    /// Called during shutdown.
    pub fn cancel_all(&mut self) {
        for (timeout, handle) in self.timers.drain() {
            handle.abort();
            trace!(?timeout, "Timer cancelled (shutdown)");
        }
    }

    /// Get the number of active timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
