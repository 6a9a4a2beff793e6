//! Error types for zkwatch.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the specific failure (bad wire code, illegal transition, closed session)
//! instead of parsing messages.

use thiserror::Error;

use crate::codes::{EventType, SessionState, WireCodeKind};
use crate::watcher::WatcherId;

/// Top-level error type for zkwatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// A wire integer is not one of the defined codes.
    #[error("Invalid integer value {code} for conversion to {kind}")]
    InvalidWireCode {
        kind: WireCodeKind,
        code: i32,
    },

    /// A `WatchedEvent` was built with a path/type combination that breaks
    /// the "path present iff type != None" rule.
    #[error("Invalid event construction: type {event_type:?} with path {path:?}")]
    InvalidEventConstruction {
        event_type: EventType,
        path: Option<String>,
    },

    #[error("Illegal session state transition: {from:?} -> {to:?}")]
    IllegalStateTransition {
        from: SessionState,
        to: SessionState,
    },

    /// A watcher failed inside `notify`. Reported, never propagated.
    #[error("Watcher {watcher} failed: {message}")]
    WatcherInvocation {
        watcher: WatcherId,
        message: String,
    },

    #[error("Session is closed (last state {state:?})")]
    SessionClosed {
        state: SessionState,
    },

    #[error("Dispatch queue is full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl WatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub(crate) fn disconnected(path: &str) -> Self {
        Self::Disconnected {
            path: path.to_string(),
        }
    }

    /// Returns true if the same call may succeed later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::Timeout { .. })
    }

    /// Returns true if this error leaves the session unusable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IllegalStateTransition { .. } | Self::SessionClosed { .. } | Self::Internal { .. }
        )
    }
}

/// Result type alias for zkwatch operations.
pub type WatchResult<T> = Result<T, WatchError>;
