//! Session states and event types with their wire codes.
//!
//! Both enumerations are closed: every defined value maps to exactly one
//! signed integer and back. Decoding an integer outside the table is an
//! error, never a silent fallback to `Unknown` or `None`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// Which code table a wire integer was decoded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireCodeKind {
    SessionState,
    EventType,
}

impl fmt::Display for WireCodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionState => f.write_str("SessionState"),
            Self::EventType => f.write_str("EventType"),
        }
    }
}

/// State of the client session at the time of an event.
///
/// Serializes as its wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum SessionState {
    /// Initial tag before the transport has reported anything.
    Unknown,
    Disconnected,
    NoSyncConnected,
    SyncConnected,
    /// Terminal. The server has discarded the session and its watches.
    Expired,
}

impl SessionState {
    /// All defined states, in wire-table order.
    pub const ALL: [Self; 5] = [
        Self::Unknown,
        Self::Disconnected,
        Self::NoSyncConnected,
        Self::SyncConnected,
        Self::Expired,
    ];

    /// Integer representation sent over the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Unknown => -1,
            Self::Disconnected => 0,
            Self::NoSyncConnected => 1,
            Self::SyncConnected => 3,
            Self::Expired => -112,
        }
    }

    /// Decodes a wire integer.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::InvalidWireCode` for any integer outside the table.
    pub fn from_code(code: i32) -> Result<Self, WatchError> {
        match code {
            -1 => Ok(Self::Unknown),
            0 => Ok(Self::Disconnected),
            1 => Ok(Self::NoSyncConnected),
            3 => Ok(Self::SyncConnected),
            -112 => Ok(Self::Expired),
            _ => Err(WatchError::InvalidWireCode {
                kind: WireCodeKind::SessionState,
                code,
            }),
        }
    }

    /// True for the two connected states.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::NoSyncConnected | Self::SyncConnected)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired)
    }

    /// Whether the transport may move the session from `self` to `next`.
    ///
    /// `Unknown` can only be left, `Expired` can only be entered, and only
    /// from a live state. Live states move freely among themselves.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (_, Self::Unknown) | (Self::Expired, _) | (Self::Unknown, Self::Expired) => false,
            _ => true,
        }
    }
}

impl From<SessionState> for i32 {
    fn from(state: SessionState) -> Self {
        state.code()
    }
}

impl TryFrom<i32> for SessionState {
    type Error = WatchError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Kind of change an event reports.
///
/// Serializes as its wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum EventType {
    /// Session-state notification, no node involved.
    None,
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

impl EventType {
    /// All defined event types, in wire-table order.
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::NodeCreated,
        Self::NodeDeleted,
        Self::NodeDataChanged,
        Self::NodeChildrenChanged,
    ];

    /// Integer representation sent over the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::None => -1,
            Self::NodeCreated => 1,
            Self::NodeDeleted => 2,
            Self::NodeDataChanged => 3,
            Self::NodeChildrenChanged => 4,
        }
    }

    /// Decodes a wire integer.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::InvalidWireCode` for any integer outside the table.
    pub fn from_code(code: i32) -> Result<Self, WatchError> {
        match code {
            -1 => Ok(Self::None),
            1 => Ok(Self::NodeCreated),
            2 => Ok(Self::NodeDeleted),
            3 => Ok(Self::NodeDataChanged),
            4 => Ok(Self::NodeChildrenChanged),
            _ => Err(WatchError::InvalidWireCode {
                kind: WireCodeKind::EventType,
                code,
            }),
        }
    }

    /// True for every type that refers to a node (anything but `None`).
    #[must_use]
    pub const fn is_node_event(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl From<EventType> for i32 {
    fn from(event_type: EventType) -> Self {
        event_type.code()
    }
}

impl TryFrom<i32> for EventType {
    type Error = WatchError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
