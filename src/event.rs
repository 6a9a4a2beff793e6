//! Watched events and their wire representation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codes::{EventType, SessionState};
use crate::error::{WatchError, WatchResult};

/// Event frame as pushed by the server: raw codes plus an optional path.
///
/// Nothing in this struct is validated. Convert it with
/// `WatchedEvent::try_from` or `Signal::from_wire` before use.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub event_type: i32,
    pub state: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl WireEvent {
    /// Builds a frame from raw codes.
    #[must_use]
    pub fn new(event_type: i32, state: i32, path: Option<String>) -> Self {
        Self {
            event_type,
            state,
            path,
        }
    }
}

/// A single notification handed to a watcher.
///
/// `path` is present exactly when `event_type` is not `EventType::None`.
/// The fields are private so that rule cannot be broken after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WireEvent", into = "WireEvent")]
pub struct WatchedEvent {
    state: SessionState,
    event_type: EventType,
    path: Option<String>,
}

impl WatchedEvent {
    /// Creates an event, checking the path/type rule.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::InvalidEventConstruction` when a node event has no
    /// path or a session event carries one.
    pub fn new(state: SessionState, event_type: EventType, path: Option<String>) -> WatchResult<Self> {
        if event_type.is_node_event() != path.is_some() {
            return Err(WatchError::InvalidEventConstruction { event_type, path });
        }
        Ok(Self {
            state,
            event_type,
            path,
        })
    }

    /// A session-state notification (type `None`, no path).
    #[must_use]
    pub const fn session(state: SessionState) -> Self {
        Self {
            state,
            event_type: EventType::None,
            path: None,
        }
    }

    /// A node notification observed while the session was in `state`.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::InvalidEventConstruction` if `event_type` is `None`.
    pub fn node(state: SessionState, event_type: EventType, path: impl Into<String>) -> WatchResult<Self> {
        Self::new(state, event_type, Some(path.into()))
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// True for pure session-state notifications.
    #[must_use]
    pub const fn is_session_event(&self) -> bool {
        !self.event_type.is_node_event()
    }

    /// Wire frame for this event.
    #[must_use]
    pub fn to_wire(&self) -> WireEvent {
        WireEvent::new(self.event_type.code(), self.state.code(), self.path.clone())
    }
}

impl TryFrom<WireEvent> for WatchedEvent {
    type Error = WatchError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let state = SessionState::from_code(wire.state)?;
        let event_type = EventType::from_code(wire.event_type)?;
        Self::new(state, event_type, wire.path)
    }
}

impl From<WatchedEvent> for WireEvent {
    fn from(event: WatchedEvent) -> Self {
        Self::new(event.event_type.code(), event.state.code(), event.path)
    }
}

impl fmt::Display for WatchedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WatchedEvent state:{} type:{} path:{}",
            self.state,
            self.event_type,
            self.path.as_deref().unwrap_or("null")
        )
    }
}
