//! Connectivity monitor: a pure signal source for network reachability.
//!
//! The monitor abstracts whatever platform signal is available (here, an
//! HTTP probe, see [`ConnectivityProbe`]) into a point-in-time status query
//! plus transition-only subscriber callbacks. No retry or backoff logic
//! lives in this module.

mod probe;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub use probe::ConnectivityProbe;

/// Point-in-time network reachability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Connected,
    Disconnected,
}

impl ConnectivityStatus {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

type Handler = Arc<dyn Fn(ConnectivityStatus) + Send + Sync>;

struct MonitorState {
    status: ConnectivityStatus,
    next_subscriber_id: u64,
    subscribers: Vec<(u64, Handler)>,
}

struct MonitorInner {
    state: Mutex<MonitorState>,
}

impl MonitorInner {
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared reachability signal. Cheap to clone; all clones observe the same
/// status and subscriber set.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    #[must_use]
    pub fn new(initial: ConnectivityStatus) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                state: Mutex::new(MonitorState {
                    status: initial,
                    next_subscriber_id: 0,
                    subscribers: Vec::new(),
                }),
            }),
        }
    }

    /// Point-in-time status query, usable before attempting a send
    #[must_use]
    pub fn current_status(&self) -> ConnectivityStatus {
        self.inner.lock().status
    }

    /// Feed a fresh observation from the platform signal.
    ///
    /// Subscribers are invoked only when the status actually changes, and
    /// always outside the internal lock.
    pub fn set_status(&self, status: ConnectivityStatus) {
        let handlers: Vec<Handler> = {
            let mut state = self.inner.lock();
            if state.status == status {
                return;
            }
            state.status = status;
            state.subscribers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };

        tracing::debug!(?status, "connectivity transition");
        for handler in handlers {
            handler(status);
        }
    }

    /// Register a callback invoked on every status transition.
    ///
    /// The returned [`Subscription`] must be kept alive for as long as the
    /// caller wants callbacks; cancel with [`Subscription::unsubscribe`].
    pub fn subscribe(
        &self,
        handler: impl Fn(ConnectivityStatus) + Send + Sync + 'static,
    ) -> Subscription {
        let mut state = self.inner.lock();
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.push((id, Arc::new(handler)));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }
}

/// Cancellation token for a [`ConnectivityMonitor`] subscription.
pub struct Subscription {
    inner: Weak<MonitorInner>,
    id: u64,
}

impl Subscription {
    /// Remove the handler; it will never be invoked again.
    ///
    /// Idempotent: safe to call any number of times.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.lock().subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn current_status_reflects_last_observation() {
        let monitor = ConnectivityMonitor::new(ConnectivityStatus::Disconnected);
        assert_eq!(
            monitor.current_status(),
            ConnectivityStatus::Disconnected
        );

        monitor.set_status(ConnectivityStatus::Connected);
        assert_eq!(monitor.current_status(), ConnectivityStatus::Connected);
    }

    #[test]
    fn handlers_fire_on_transitions_only() {
        let monitor = ConnectivityMonitor::new(ConnectivityStatus::Disconnected);
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_in_handler = Arc::clone(&calls);
        let _subscription = monitor.subscribe(move |_| {
            calls_in_handler.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_status(ConnectivityStatus::Disconnected); // no change
        monitor.set_status(ConnectivityStatus::Connected); // transition
        monitor.set_status(ConnectivityStatus::Connected); // no change
        monitor.set_status(ConnectivityStatus::Disconnected); // transition

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_stops_callbacks() {
        let monitor = ConnectivityMonitor::new(ConnectivityStatus::Disconnected);
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_in_handler = Arc::clone(&calls);
        let subscription = monitor.subscribe(move |_| {
            calls_in_handler.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_status(ConnectivityStatus::Connected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        subscription.unsubscribe();
        subscription.unsubscribe(); // must not panic or double-remove

        monitor.set_status(ConnectivityStatus::Disconnected);
        monitor.set_status(ConnectivityStatus::Connected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multiple_subscribers_each_observe_transitions() {
        let monitor = ConnectivityMonitor::new(ConnectivityStatus::Disconnected);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let first_in_handler = Arc::clone(&first);
        let keep_first = monitor.subscribe(move |_| {
            first_in_handler.fetch_add(1, Ordering::SeqCst);
        });
        let second_in_handler = Arc::clone(&second);
        let keep_second = monitor.subscribe(move |_| {
            second_in_handler.fetch_add(1, Ordering::SeqCst);
        });

        monitor.set_status(ConnectivityStatus::Connected);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        keep_first.unsubscribe();
        monitor.set_status(ConnectivityStatus::Disconnected);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);

        keep_second.unsubscribe();
    }
}
