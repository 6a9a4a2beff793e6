//! The watcher callback contract.
//!
//! A watcher receives one `WatchedEvent` per `notify` call, always from the
//! session's dispatch thread and always in the order the transport reported
//! the underlying signals. `notify` runs inline on that thread, so a slow
//! watcher delays every later event of the session. Hand heavy work off (see
//! `WatchStream`) instead of doing it in place.
//!
//! # Example
//!
//! ```
//! use zkwatch::{watcher_fn, WatchedEvent};
//!
//! let watcher = watcher_fn(|event: WatchedEvent| {
//!     println!("{event}");
//! });
//! assert_eq!(watcher.clone().id(), watcher.id());
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::WatchedEvent;

/// Event handler registered with a session.
///
/// Implementations must not rely on panicking to signal failure to the
/// dispatcher: a panic is caught, reported, and delivery carries on with
/// the next watcher.
pub trait Watcher: Send + Sync + 'static {
    /// Called once per delivered event.
    fn notify(&self, event: WatchedEvent);
}

/// Adapter that wraps a closure into a [`Watcher`].
struct FnWatcher<F>(F);

impl<F: Fn(WatchedEvent) + Send + Sync + 'static> Watcher for FnWatcher<F> {
    fn notify(&self, event: WatchedEvent) {
        (self.0)(event);
    }
}

/// Identity of a registered watcher.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatcherId(Uuid);

impl WatcherId {
    /// Create a new random watcher id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared, identified watcher.
///
/// Clones share both the watcher and its id, so registering a clone for a
/// path the original already watches does not fire it twice.
#[derive(Clone)]
pub struct WatcherHandle {
    id: WatcherId,
    inner: Arc<dyn Watcher>,
}

impl WatcherHandle {
    pub fn new<W: Watcher>(watcher: W) -> Self {
        Self::from_arc(Arc::new(watcher))
    }

    pub fn from_arc(watcher: Arc<dyn Watcher>) -> Self {
        Self {
            id: WatcherId::new(),
            inner: watcher,
        }
    }

    #[must_use]
    pub const fn id(&self) -> WatcherId {
        self.id
    }

    pub fn notify(&self, event: WatchedEvent) {
        self.inner.notify(event);
    }
}

impl fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Creates a watcher from a closure.
pub fn watcher_fn<F>(f: F) -> WatcherHandle
where
    F: Fn(WatchedEvent) + Send + Sync + 'static,
{
    WatcherHandle::new(FnWatcher(f))
}
