//! Dispatcher worker.
//!
//! The transport pushes decoded signals into one bounded channel; a dedicated
//! thread owns the `DispatchPipeline` and drains that channel in order. The
//! transport side never runs watcher code, and the dispatch side never
//! reorders or drops a signal. A full queue applies backpressure to
//! `SignalSender::send` (or fails fast with `try_send`).

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::codes::SessionState;
use crate::error::{WatchError, WatchResult};
use crate::event::WireEvent;
use crate::watcher::WatcherHandle;

use super::pipeline::{DispatchPipeline, DispatchStats};
use super::registry::WatchRegistry;
use super::signal::Signal;

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Max queued signals before `send` blocks.
    pub signal_queue_capacity: usize,
    /// Max queued errors on the observability channel; overflow is counted.
    pub error_queue_capacity: usize,
    /// Name of the dispatch thread.
    pub thread_name: String,
    /// Drop all per-path registrations when the session disconnects.
    pub clear_watches_on_disconnect: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            signal_queue_capacity: 4096,
            error_queue_capacity: 256,
            thread_name: "zkwatch-dispatch".to_string(),
            clear_watches_on_disconnect: false,
        }
    }
}

#[derive(Debug)]
pub(crate) enum DispatchMsg {
    Signal(Signal),
    Flush { reply: Sender<()> },
    Shutdown,
}

/// Transport-side handle for feeding signals to a dispatcher.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: Sender<DispatchMsg>,
    capacity: usize,
    // Shared by every clone; `false` once shutdown has been requested.
    // Enqueueing happens under the read lock, so nothing lands behind
    // `Shutdown` in the queue.
    open: Arc<RwLock<bool>>,
}

impl SignalSender {
    fn gate(&self) -> WatchResult<RwLockReadGuard<'_, bool>> {
        let open = self.open.read().unwrap_or_else(PoisonError::into_inner);
        if *open {
            Ok(open)
        } else {
            Err(WatchError::disconnected("dispatch_queue"))
        }
    }

    fn close(&self) {
        *self.open.write().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Enqueues a signal, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// `WatchError::Disconnected` once the dispatcher has been shut down or
    /// its worker has stopped.
    pub fn send(&self, signal: Signal) -> WatchResult<()> {
        let _open = self.gate()?;
        self.tx
            .send(DispatchMsg::Signal(signal))
            .map_err(|_| WatchError::disconnected("dispatch_queue"))
    }

    /// Enqueues a signal without blocking.
    ///
    /// # Errors
    ///
    /// - `WatchError::QueueFull` if the queue is at capacity.
    /// - `WatchError::Disconnected` once the dispatcher has been shut down.
    pub fn try_send(&self, signal: Signal) -> WatchResult<()> {
        let _open = self.gate()?;
        match self.tx.try_send(DispatchMsg::Signal(signal)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(WatchError::QueueFull {
                capacity: self.capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(WatchError::disconnected("dispatch_queue")),
        }
    }

    /// Shorthand for a state transition.
    ///
    /// # Errors
    ///
    /// Same as [`SignalSender::send`].
    pub fn send_state(&self, state: SessionState) -> WatchResult<()> {
        self.send(Signal::StateChanged(state))
    }

    /// Decodes a server frame and enqueues it.
    ///
    /// A frame that fails to decode is returned to the caller and nothing is
    /// enqueued, so later frames are unaffected.
    ///
    /// # Errors
    ///
    /// `InvalidWireCode` or `InvalidEventConstruction` for a bad frame,
    /// otherwise as [`SignalSender::send`].
    pub fn send_wire(&self, wire: WireEvent) -> WatchResult<()> {
        let signal = Signal::from_wire(wire).inspect_err(|err| {
            tracing::error!(error = %err, "discarding undecodable event frame");
        })?;
        self.send(signal)
    }
}

/// Event dispatch for one session: owns the registry and the worker thread.
///
/// Dropping the dispatcher without `shutdown` leaves the worker running
/// until every `SignalSender` is gone.
#[derive(Debug)]
pub struct EventDispatcher {
    registry: Arc<WatchRegistry>,
    sender: SignalSender,
    stats: Arc<DispatchStats>,
    errors: Receiver<WatchError>,
    join: JoinHandle<()>,
}

impl EventDispatcher {
    /// Starts a dispatcher with a fresh registry.
    ///
    /// # Errors
    ///
    /// `WatchError::Internal` if the worker thread cannot be spawned.
    pub fn new(cfg: DispatcherConfig, default_watcher: Option<WatcherHandle>) -> WatchResult<Self> {
        let registry = WatchRegistry::new();
        registry.set_default_watcher(default_watcher);
        Self::with_registry(cfg, Arc::new(registry))
    }

    /// Starts a dispatcher over an existing registry.
    ///
    /// # Errors
    ///
    /// `WatchError::Internal` if the worker thread cannot be spawned.
    pub fn with_registry(cfg: DispatcherConfig, registry: Arc<WatchRegistry>) -> WatchResult<Self> {
        let capacity = cfg.signal_queue_capacity.max(1);
        let (tx, rx) = bounded::<DispatchMsg>(capacity);
        let (errors_tx, errors_rx) = bounded::<WatchError>(cfg.error_queue_capacity.max(1));

        let stats = Arc::new(DispatchStats::default());
        let pipeline = DispatchPipeline::with_stats(Arc::clone(&registry), &cfg, Arc::clone(&stats));

        let join = thread::Builder::new()
            .name(cfg.thread_name.clone())
            .spawn(move || worker_loop(pipeline, rx, errors_tx))
            .map_err(|e| WatchError::internal(format!("failed to spawn dispatch worker: {e}")))?;

        Ok(Self {
            registry,
            sender: SignalSender {
                tx,
                capacity,
                open: Arc::new(RwLock::new(true)),
            },
            stats,
            errors: errors_rx,
            join,
        })
    }

    /// Registry shared with the RPC layer.
    #[must_use]
    pub fn registry(&self) -> &Arc<WatchRegistry> {
        &self.registry
    }

    /// A new transport-side handle.
    #[must_use]
    pub fn sender(&self) -> SignalSender {
        self.sender.clone()
    }

    /// Enqueues a signal, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Same as [`SignalSender::send`].
    pub fn send(&self, signal: Signal) -> WatchResult<()> {
        self.sender.send(signal)
    }

    #[must_use]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Rejected signals and watcher failures, in the order they happened.
    #[must_use]
    pub fn errors(&self) -> &Receiver<WatchError> {
        &self.errors
    }

    fn request_flush(&self) -> WatchResult<Receiver<()>> {
        let (reply_tx, reply_rx) = bounded::<()>(1);
        let _open = self.sender.gate()?;
        self.sender
            .tx
            .send(DispatchMsg::Flush { reply: reply_tx })
            .map_err(|_| WatchError::disconnected("dispatch_queue"))?;
        Ok(reply_rx)
    }

    /// Blocks until every signal sent before this call has been delivered.
    ///
    /// # Errors
    ///
    /// `WatchError::Disconnected` if the worker has stopped.
    pub fn flush(&self) -> WatchResult<()> {
        self.request_flush()?
            .recv()
            .map_err(|_| WatchError::disconnected("dispatch_worker"))
    }

    /// Like `flush`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// - `WatchError::Timeout` if delivery has not caught up in time.
    /// - `WatchError::Disconnected` if the worker has stopped.
    pub fn flush_timeout(&self, timeout: Duration) -> WatchResult<()> {
        self.request_flush()?.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => WatchError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            RecvTimeoutError::Disconnected => WatchError::disconnected("dispatch_worker"),
        })
    }

    /// Delivers everything already accepted, then stops the worker and
    /// waits for it. Every `SignalSender` refuses new signals with
    /// `Disconnected` from the moment this is called.
    ///
    /// # Errors
    ///
    /// `WatchError::Internal` if the worker thread panicked.
    pub fn shutdown(self) -> WatchResult<()> {
        self.sender.close();
        // The worker may already be gone; joining still reports how it ended.
        let _ = self.sender.tx.send(DispatchMsg::Shutdown);

        self.join
            .join()
            .map_err(|_| WatchError::internal("dispatch worker panicked"))
    }
}

fn worker_loop(mut pipeline: DispatchPipeline, rx: Receiver<DispatchMsg>, errors_tx: Sender<WatchError>) {
    loop {
        match rx.recv() {
            Ok(DispatchMsg::Signal(signal)) => match pipeline.process(signal) {
                Ok(report) => {
                    for err in report.failures {
                        publish_error(&pipeline, &errors_tx, err);
                    }
                }
                Err(err) => publish_error(&pipeline, &errors_tx, err),
            },
            Ok(DispatchMsg::Flush { reply }) => {
                let _ = reply.send(());
            }
            Ok(DispatchMsg::Shutdown) | Err(_) => break,
        }
    }

    tracing::info!(state = %pipeline.state(), "dispatch worker stopped");
}

fn publish_error(pipeline: &DispatchPipeline, errors_tx: &Sender<WatchError>, err: WatchError) {
    // Never block delivery on a slow error consumer.
    if errors_tx.try_send(err).is_err() {
        pipeline.stats().record_dropped_error();
    }
}
