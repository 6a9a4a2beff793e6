//! Watch registrations for one session.
//!
//! The RPC layer adds registrations when a watch-enabled request succeeds;
//! the dispatch pipeline resolves (and consumes) them when events arrive.
//! Both sides go through one mutex, so a registration racing an in-flight
//! dispatch for the same path lands entirely before or entirely after that
//! resolution.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::codes::{EventType, SessionState};
use crate::error::{WatchError, WatchResult};
use crate::watcher::{WatcherHandle, WatcherId};

/// Class of change a registration is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchKind {
    /// Set by a data read; fires on data change, creation and deletion.
    Data,
    /// Set by an existence check; fires on creation, data change and deletion.
    Exists,
    /// Set by a children listing; fires on child changes and deletion.
    Children,
}

impl WatchKind {
    /// Registration kinds fired by a node event of `event_type`.
    #[must_use]
    pub const fn triggered_by(event_type: EventType) -> &'static [Self] {
        match event_type {
            EventType::None => &[],
            EventType::NodeCreated | EventType::NodeDataChanged => &[Self::Data, Self::Exists],
            EventType::NodeChildrenChanged => &[Self::Children],
            EventType::NodeDeleted => &[Self::Data, Self::Exists, Self::Children],
        }
    }
}

/// Lifetime of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    /// Removed the first time it fires.
    #[default]
    OneShot,
    /// Stays until unregistered or the session ends.
    Persistent,
}

#[derive(Debug)]
struct WatchEntry {
    seq: u64,
    kind: WatchKind,
    mode: WatchMode,
    watcher: WatcherHandle,
}

#[derive(Debug, Default)]
struct RegistryInner {
    default_watcher: Option<WatcherHandle>,
    // Entries per path are kept in ascending `seq` order.
    watches: HashMap<String, Vec<WatchEntry>>,
    next_seq: u64,
    // Set once the session can no longer fire watches.
    closed: Option<SessionState>,
}

impl RegistryInner {
    fn resolution(&self) -> Resolution {
        Resolution::new(self.default_watcher.clone())
    }
}

/// Ordered, de-duplicated watcher set for one event.
struct Resolution {
    seen: HashSet<WatcherId>,
    out: Vec<WatcherHandle>,
}

impl Resolution {
    fn new(default_watcher: Option<WatcherHandle>) -> Self {
        let mut r = Self {
            seen: HashSet::new(),
            out: Vec::new(),
        };
        if let Some(w) = default_watcher {
            r.push(w);
        }
        r
    }

    fn push(&mut self, watcher: WatcherHandle) {
        if self.seen.insert(watcher.id()) {
            self.out.push(watcher);
        }
    }
}

/// Session-owned watch registry.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    inner: Mutex<RegistryInner>,
}

impl WatchRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a client-wide default watcher already installed.
    #[must_use]
    pub fn with_default_watcher(watcher: WatcherHandle) -> Self {
        let registry = Self::new();
        registry.set_default_watcher(Some(watcher));
        registry
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // Watchers never run under this lock, so a poisoned guard still holds
        // consistent data.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replaces the default watcher. Returns the previous one.
    pub fn set_default_watcher(&self, watcher: Option<WatcherHandle>) -> Option<WatcherHandle> {
        std::mem::replace(&mut self.lock().default_watcher, watcher)
    }

    #[must_use]
    pub fn default_watcher(&self) -> Option<WatcherHandle> {
        self.lock().default_watcher.clone()
    }

    /// Adds a registration for `(path, kind)`.
    ///
    /// Registering the same watcher for the same `(path, kind)` again keeps
    /// its original position and adopts the new `mode`.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::SessionClosed`, carrying the state the session
    /// ended in, once the registry has been closed.
    pub fn register(
        &self,
        path: impl Into<String>,
        kind: WatchKind,
        watcher: WatcherHandle,
        mode: WatchMode,
    ) -> WatchResult<()> {
        let mut inner = self.lock();
        if let Some(state) = inner.closed {
            return Err(WatchError::SessionClosed { state });
        }

        let seq = inner.next_seq;
        let entries = inner.watches.entry(path.into()).or_default();
        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.kind == kind && e.watcher.id() == watcher.id())
        {
            existing.mode = mode;
            return Ok(());
        }
        entries.push(WatchEntry {
            seq,
            kind,
            mode,
            watcher,
        });
        inner.next_seq += 1;
        Ok(())
    }

    /// Removes one registration. Returns whether it existed.
    pub fn unregister(&self, path: &str, kind: WatchKind, watcher: WatcherId) -> bool {
        let mut inner = self.lock();
        let Some(entries) = inner.watches.get_mut(path) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| !(e.kind == kind && e.watcher.id() == watcher));
        let removed = entries.len() != before;
        if entries.is_empty() {
            inner.watches.remove(path);
        }
        removed
    }

    /// Watchers to notify for a node event on `path`: the default watcher,
    /// then matching registrations in registration order.
    ///
    /// One-shot registrations are removed in the same critical section.
    pub fn resolve_and_consume(&self, path: &str, event_type: EventType) -> Vec<WatcherHandle> {
        let mut inner = self.lock();
        let mut resolution = inner.resolution();

        let kinds = WatchKind::triggered_by(event_type);
        if let Some(entries) = inner.watches.get_mut(path) {
            entries.retain(|e| {
                if !kinds.contains(&e.kind) {
                    return true;
                }
                resolution.push(e.watcher.clone());
                e.mode == WatchMode::Persistent
            });
            if entries.is_empty() {
                inner.watches.remove(path);
            }
        }

        resolution.out
    }

    /// The default watcher followed by every registered watcher, in
    /// registration order. Nothing is consumed.
    #[must_use]
    pub fn resolve_all(&self) -> Vec<WatcherHandle> {
        let inner = self.lock();
        collect_all(&inner, inner.resolution())
    }

    /// Drops every per-path registration; the registry stays open.
    /// Returns the watchers that were registered, as `resolve_all` would.
    pub fn drain_registrations(&self) -> Vec<WatcherHandle> {
        let mut inner = self.lock();
        let watchers = collect_all(&inner, inner.resolution());
        inner.watches.clear();
        watchers
    }

    /// Resolves every watcher, drops all registrations and closes the
    /// registry, in one critical section.
    pub fn drain_session(&self) -> Vec<WatcherHandle> {
        let mut inner = self.lock();
        let watchers = collect_all(&inner, inner.resolution());
        inner.watches.clear();
        if inner.closed.is_none() {
            inner.closed = Some(SessionState::Expired);
        }
        watchers
    }

    /// Drops all registrations and refuses new ones, as at expiry.
    pub fn clear_session(&self) {
        self.close(SessionState::Expired);
    }

    /// Drops all registrations and refuses new ones; later `register` calls
    /// report `state`. The first close wins.
    pub fn close(&self, state: SessionState) {
        let mut inner = self.lock();
        inner.watches.clear();
        if inner.closed.is_none() {
            inner.closed = Some(state);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    /// State the session ended in, if the registry is closed.
    #[must_use]
    pub fn closed_state(&self) -> Option<SessionState> {
        self.lock().closed
    }

    /// Number of per-path registrations (the default watcher is not counted).
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.lock().watches.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registration_count() == 0
    }

    /// Sorted paths holding at least one registration of `kind`, for
    /// re-establishing watches after a reconnect.
    #[must_use]
    pub fn watched_paths(&self, kind: WatchKind) -> Vec<String> {
        let inner = self.lock();
        let mut paths: Vec<String> = inner
            .watches
            .iter()
            .filter(|(_, entries)| entries.iter().any(|e| e.kind == kind))
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }
}

fn collect_all(inner: &RegistryInner, mut resolution: Resolution) -> Vec<WatcherHandle> {
    let mut entries: Vec<&WatchEntry> = inner.watches.values().flatten().collect();
    entries.sort_by_key(|e| e.seq);
    for e in entries {
        resolution.push(e.watcher.clone());
    }
    resolution.out
}
