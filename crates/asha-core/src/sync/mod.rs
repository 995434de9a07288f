//! Sync engine: drains the pending queue to the remote backend.
//!
//! The engine is reactive, not time-based: it runs a pass when connectivity
//! comes back, when intake appends while connected, or when explicitly
//! asked. Passes over the queue are sequential and never run concurrently;
//! a trigger that arrives mid-pass coalesces into one follow-up pass.

mod remote;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use remote::{RemoteClient, IDEMPOTENCY_KEY_HEADER};

use crate::connectivity::{ConnectivityMonitor, Subscription};
use crate::db::SubmissionStore;
use crate::error::Result;

const DEFAULT_MAX_ATTEMPTS: u32 = 25;

/// Retry policy for the drain loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Entries that have reached this many attempts are skipped by sync
    /// passes instead of being retried forever. `None` disables the cap.
    pub max_attempts: Option<u32>,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
        }
    }
}

/// Outcome counts for one drain pass over the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Entries a send was attempted for
    pub attempted: usize,
    /// Entries acknowledged and marked synced
    pub synced: usize,
    /// Entries whose send failed; they stay retry-eligible
    pub failed: usize,
    /// Entries skipped because they reached the attempt cap
    pub skipped: usize,
}

impl PassSummary {
    fn merge(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.synced += other.synced;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Drains unsynced submissions to the remote, one at a time.
pub struct SyncEngine {
    store: Arc<dyn SubmissionStore>,
    remote: RemoteClient,
    policy: SyncPolicy,
    pass_in_flight: AtomicBool,
    run_again: AtomicBool,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn SubmissionStore>, remote: RemoteClient) -> Self {
        Self {
            store,
            remote,
            policy: SyncPolicy::default(),
            pass_in_flight: AtomicBool::new(false),
            run_again: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fire-and-forget sync trigger.
    ///
    /// Spawns a drain task on the current Tokio runtime. If a pass is
    /// already in flight, the trigger coalesces into "run one more pass
    /// after the current one" instead of starting a concurrent drain.
    pub fn trigger(self: &Arc<Self>) {
        self.run_again.store(true, Ordering::SeqCst);
        if self.pass_in_flight.swap(true, Ordering::SeqCst) {
            // An active drain will pick the request up.
            return;
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.drain().await;
        });
    }

    async fn drain(&self) {
        loop {
            while self.run_again.swap(false, Ordering::SeqCst) {
                match self.run_pass().await {
                    Ok(summary) => {
                        if summary.attempted > 0 || summary.skipped > 0 {
                            tracing::info!(
                                attempted = summary.attempted,
                                synced = summary.synced,
                                failed = summary.failed,
                                skipped = summary.skipped,
                                "sync pass finished"
                            );
                        }
                    }
                    Err(error) => tracing::warn!(%error, "sync pass skipped"),
                }
            }

            self.pass_in_flight.store(false, Ordering::SeqCst);
            // A trigger may have landed between the last queue check and
            // the flag reset; reclaim the drain if so.
            if self.run_again.load(Ordering::SeqCst)
                && !self.pass_in_flight.swap(true, Ordering::SeqCst)
            {
                continue;
            }
            break;
        }
    }

    /// Drain the queue directly and return the combined summary.
    ///
    /// This is the manual trigger for callers that own the engine (e.g. a
    /// `sync` command) and want the outcome synchronously. It takes the
    /// same single-drain discipline as background triggers: an active
    /// drain finishes before this one starts, and triggers that land
    /// mid-batch fold into this drain instead of starting a concurrent
    /// one. A storage error releases the drain and propagates; the next
    /// trigger retries.
    pub async fn sync_now(&self) -> Result<PassSummary> {
        self.run_again.store(true, Ordering::SeqCst);
        while self.pass_in_flight.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let mut total = PassSummary::default();
        loop {
            while self.run_again.swap(false, Ordering::SeqCst) {
                match self.run_pass().await {
                    Ok(summary) => total.merge(summary),
                    Err(error) => {
                        self.pass_in_flight.store(false, Ordering::SeqCst);
                        return Err(error);
                    }
                }
            }

            self.pass_in_flight.store(false, Ordering::SeqCst);
            if self.run_again.load(Ordering::SeqCst)
                && !self.pass_in_flight.swap(true, Ordering::SeqCst)
            {
                continue;
            }
            return Ok(total);
        }
    }

    /// Wait until no drain task is active.
    pub async fn wait_idle(&self) {
        while self.pass_in_flight.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Trigger a drain whenever the monitor transitions to connected.
    ///
    /// The returned subscription must stay alive for the wiring to hold.
    #[must_use]
    pub fn watch_connectivity(self: &Arc<Self>, monitor: &ConnectivityMonitor) -> Subscription {
        let engine = Arc::clone(self);
        monitor.subscribe(move |status| {
            if status.is_connected() {
                tracing::debug!("connectivity restored, triggering sync");
                engine.trigger();
            }
        })
    }

    /// One sequential pass over the unsynced queue.
    ///
    /// A single failure never aborts the batch: the entry is marked failed
    /// and the pass moves on. Storage errors while marking are logged and
    /// the pass continues; a storage error while listing skips the pass
    /// entirely (the next trigger retries).
    async fn run_pass(&self) -> Result<PassSummary> {
        let pending = self.store.list_pending()?;
        let mut summary = PassSummary::default();
        if pending.is_empty() {
            return Ok(summary);
        }

        for submission in pending {
            if let Some(cap) = self.policy.max_attempts {
                if submission.attempt_count >= cap {
                    tracing::warn!(
                        id = %submission.id,
                        attempts = submission.attempt_count,
                        "attempt cap reached, skipping submission"
                    );
                    summary.skipped += 1;
                    continue;
                }
            }

            summary.attempted += 1;
            match self.remote.send(&submission).await {
                Ok(()) => match self.store.mark_synced(&submission.id) {
                    Ok(()) => {
                        tracing::debug!(id = %submission.id, "submission synced");
                        summary.synced += 1;
                    }
                    Err(error) => {
                        // The remote has the data; the local record will be
                        // resent once and deduplicated by the idempotency key.
                        tracing::error!(id = %submission.id, %error, "failed to mark synced");
                        summary.failed += 1;
                    }
                },
                Err(error) => {
                    tracing::warn!(id = %submission.id, %error, "send attempt failed");
                    if let Err(mark_error) = self.store.mark_failed(&submission.id) {
                        tracing::error!(id = %submission.id, %mark_error, "failed to mark failed");
                    }
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}
