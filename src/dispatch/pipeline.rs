//! Single-consumer delivery state machine.
//!
//! `DispatchPipeline` turns each `Signal` into a `WatchedEvent`, resolves the
//! interested watchers from the session registry and invokes them one at a
//! time. It holds the session's cached state and enforces the transition
//! graph: once `Expired` is delivered the registry is drained and closed,
//! and an illegal transition leaves the session unusable.
//!
//! The pipeline is synchronous and takes `&mut self`, so it cannot run
//! concurrently with itself. `EventDispatcher` drives one from a dedicated
//! thread; tests can drive one directly.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::codes::{EventType, SessionState};
use crate::error::{WatchError, WatchResult};
use crate::event::WatchedEvent;
use crate::watcher::WatcherHandle;

use super::dispatcher::DispatcherConfig;
use super::registry::WatchRegistry;
use super::signal::Signal;

/// Counters shared between the pipeline and whoever observes it.
#[derive(Debug, Default)]
pub struct DispatchStats {
    signals_processed: AtomicU64,
    events_delivered: AtomicU64,
    watcher_failures: AtomicU64,
    signals_rejected: AtomicU64,
    errors_dropped: AtomicU64,
}

impl DispatchStats {
    /// Signals that produced an event.
    #[must_use]
    pub fn signals_processed(&self) -> u64 {
        self.signals_processed.load(Ordering::Relaxed)
    }

    /// Successful `notify` calls.
    #[must_use]
    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn watcher_failures(&self) -> u64 {
        self.watcher_failures.load(Ordering::Relaxed)
    }

    /// Signals refused with an error. No watcher saw them.
    #[must_use]
    pub fn signals_rejected(&self) -> u64 {
        self.signals_rejected.load(Ordering::Relaxed)
    }

    /// Errors that did not fit on the observability channel.
    #[must_use]
    pub fn errors_dropped(&self) -> u64 {
        self.errors_dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn record_dropped_error(&self) {
        self.errors_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of one processed signal.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub event: WatchedEvent,
    /// Watchers whose `notify` returned normally.
    pub notified: usize,
    /// One `WatcherInvocation` error per watcher that panicked.
    pub failures: Vec<WatchError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Active,
    Expired,
    /// The transport produced an illegal transition.
    Failed,
}

/// In-order event delivery for one session.
#[derive(Debug)]
pub struct DispatchPipeline {
    registry: Arc<WatchRegistry>,
    state: SessionState,
    lifecycle: Lifecycle,
    clear_watches_on_disconnect: bool,
    stats: Arc<DispatchStats>,
}

impl DispatchPipeline {
    #[must_use]
    pub fn new(registry: Arc<WatchRegistry>, cfg: &DispatcherConfig) -> Self {
        Self::with_stats(registry, cfg, Arc::new(DispatchStats::default()))
    }

    pub(crate) fn with_stats(registry: Arc<WatchRegistry>, cfg: &DispatcherConfig, stats: Arc<DispatchStats>) -> Self {
        Self {
            registry,
            state: SessionState::Unknown,
            lifecycle: Lifecycle::Active,
            clear_watches_on_disconnect: cfg.clear_watches_on_disconnect,
            stats,
        }
    }

    /// Last state reported by the transport.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// True once the session expired or became unusable.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lifecycle != Lifecycle::Active
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<WatchRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Processes one signal and delivers the resulting event.
    ///
    /// Watcher failures never surface here; they are listed in the report.
    ///
    /// # Errors
    ///
    /// - `IllegalStateTransition` if the edge is not allowed. The session is
    ///   unusable afterwards and its registry is closed.
    /// - `InvalidEventConstruction` for a node change of type `None`. Only
    ///   this signal is dropped.
    /// - `SessionClosed` for any signal after expiry or a failed transition,
    ///   except state signals after expiry, which report the illegal edge.
    pub fn process(&mut self, signal: Signal) -> WatchResult<DeliveryReport> {
        let result = match signal {
            Signal::StateChanged(next) => self.transition(next),
            Signal::NodeChanged { event_type, path } => self.node_changed(event_type, path),
        };

        match &result {
            Ok(_) => {
                self.stats.signals_processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.stats.signals_rejected.fetch_add(1, Ordering::Relaxed);
                tracing::error!(state = %self.state, error = %err, "rejected signal");
            }
        }
        result
    }

    fn transition(&mut self, next: SessionState) -> WatchResult<DeliveryReport> {
        if self.lifecycle == Lifecycle::Failed {
            return Err(WatchError::SessionClosed { state: self.state });
        }

        if !self.state.can_transition_to(next) {
            if self.lifecycle == Lifecycle::Active {
                self.lifecycle = Lifecycle::Failed;
                // Nothing can fire any more; refuse new watches too.
                self.registry.close(self.state);
                tracing::warn!(from = %self.state, to = %next, "session unusable, releasing watches");
            }
            return Err(WatchError::IllegalStateTransition {
                from: self.state,
                to: next,
            });
        }

        self.state = next;
        let watchers = match next {
            SessionState::Expired => {
                self.lifecycle = Lifecycle::Expired;
                let watchers = self.registry.drain_session();
                tracing::info!(watchers = watchers.len(), "session expired, releasing watches");
                watchers
            }
            SessionState::Disconnected if self.clear_watches_on_disconnect => self.registry.drain_registrations(),
            _ => self.registry.resolve_all(),
        };

        Ok(self.deliver(WatchedEvent::session(next), &watchers))
    }

    fn node_changed(&mut self, event_type: EventType, path: String) -> WatchResult<DeliveryReport> {
        if self.lifecycle != Lifecycle::Active {
            return Err(WatchError::SessionClosed { state: self.state });
        }

        let event = WatchedEvent::node(self.state, event_type, path.as_str())?;
        let watchers = self.registry.resolve_and_consume(&path, event_type);
        Ok(self.deliver(event, &watchers))
    }

    fn deliver(&self, event: WatchedEvent, watchers: &[WatcherHandle]) -> DeliveryReport {
        tracing::debug!(
            state = %event.state(),
            event_type = %event.event_type(),
            path = event.path().unwrap_or(""),
            watchers = watchers.len(),
            "delivering watched event"
        );

        let mut notified: usize = 0;
        let mut failures = Vec::new();
        for watcher in watchers {
            let ev = event.clone();
            match panic::catch_unwind(AssertUnwindSafe(|| watcher.notify(ev))) {
                Ok(()) => notified += 1,
                Err(payload) => {
                    let err = WatchError::WatcherInvocation {
                        watcher: watcher.id(),
                        message: panic_message(&*payload),
                    };
                    tracing::warn!(watcher = %watcher.id(), error = %err, "watcher failed");
                    self.stats.watcher_failures.fetch_add(1, Ordering::Relaxed);
                    failures.push(err);
                }
            }
        }

        self.stats
            .events_delivered
            .fetch_add(notified as u64, Ordering::Relaxed);

        DeliveryReport {
            event,
            notified,
            failures,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("watcher panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("watcher panicked: {s}")
    } else {
        "watcher panicked".to_string()
    }
}
