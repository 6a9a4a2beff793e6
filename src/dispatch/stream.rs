use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::error::{WatchError, WatchResult};
use crate::event::WatchedEvent;
use crate::watcher::{Watcher, WatcherHandle};

/// Watcher half of a stream: forwards events into a bounded buffer.
struct ChannelWatcher {
    tx: Sender<WatchedEvent>,
    dropped: Arc<AtomicU64>,
}

impl Watcher for ChannelWatcher {
    fn notify(&self, event: WatchedEvent) {
        // Never block the dispatch thread: drop if the consumer is slow.
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Receiving half of a channel-backed watcher.
///
/// Lets an application consume events on its own thread instead of inside
/// `notify`. Register the returned handle like any other watcher; the same
/// handle can back several registrations.
#[derive(Debug)]
pub struct WatchStream {
    rx: Receiver<WatchedEvent>,
    dropped: Arc<AtomicU64>,
}

impl WatchStream {
    /// Creates a watcher/stream pair buffering up to `capacity` events.
    #[must_use]
    pub fn bounded(capacity: usize) -> (WatcherHandle, Self) {
        let (tx, rx) = bounded::<WatchedEvent>(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let watcher = WatcherHandle::new(ChannelWatcher {
            tx,
            dropped: Arc::clone(&dropped),
        });
        (watcher, Self { rx, dropped })
    }

    /// Receive the next event (blocking).
    ///
    /// Fails with `Disconnected` once every copy of the watcher handle is gone
    /// and the buffer is empty.
    ///
    /// # Errors
    ///
    /// `WatchError::Disconnected` as above.
    pub fn recv(&self) -> WatchResult<WatchedEvent> {
        self.rx.recv().map_err(|_| WatchError::disconnected("watch_stream"))
    }

    /// Receive the next event with a timeout.
    ///
    /// # Errors
    ///
    /// `WatchError::Timeout` if nothing arrives in time, `Disconnected` as
    /// for [`WatchStream::recv`].
    pub fn recv_timeout(&self, timeout: Duration) -> WatchResult<WatchedEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => WatchError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            RecvTimeoutError::Disconnected => WatchError::disconnected("watch_stream"),
        })
    }

    /// Next buffered event, if any.
    ///
    /// # Errors
    ///
    /// `WatchError::Disconnected` as for [`WatchStream::recv`].
    pub fn try_recv(&self) -> WatchResult<Option<WatchedEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WatchError::disconnected("watch_stream")),
        }
    }

    /// Events discarded because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
