//! Submission intake: the single entry point for capturing new data.
//!
//! Intake never blocks on the network. Every submission is persisted to the
//! local queue first; the sync engine is nudged afterwards if the device is
//! currently connected, and otherwise the entry simply waits for the next
//! reconnect transition.

use std::sync::Arc;

use crate::connectivity::ConnectivityMonitor;
use crate::db::SubmissionStore;
use crate::error::Result;
use crate::models::{Category, Payload, Submission};
use crate::sync::SyncEngine;

/// Accepts completed forms and hands them to the durable queue.
pub struct SubmissionIntake {
    store: Arc<dyn SubmissionStore>,
    monitor: ConnectivityMonitor,
    engine: Arc<SyncEngine>,
}

impl SubmissionIntake {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        monitor: ConnectivityMonitor,
        engine: Arc<SyncEngine>,
    ) -> Self {
        Self {
            store,
            monitor,
            engine,
        }
    }

    /// Persist a submission locally, then nudge the sync engine if the
    /// device is online.
    ///
    /// Returns as soon as the local write lands. The returned submission is
    /// always `Pending`; sync happens in the background and the caller
    /// re-reads the store to observe progress. A persistence failure
    /// propagates and means the data was NOT captured.
    pub fn submit(&self, payload: Payload, category: Category) -> Result<Submission> {
        let submission = self.store.append(&payload, category)?;
        tracing::info!(id = %submission.id, %category, "submission captured");

        if self.monitor.current_status().is_connected() {
            self.engine.trigger();
        }

        Ok(submission)
    }
}
