//! Decoded signals handed from the transport to the dispatcher.

use crate::codes::{EventType, SessionState};
use crate::error::{WatchError, WatchResult};
use crate::event::WireEvent;

/// One raw signal, in session order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// The session moved to a new state.
    StateChanged(SessionState),
    /// A node changed. Carries the session's current state implicitly.
    NodeChanged { event_type: EventType, path: String },
}

impl Signal {
    /// Node-change signal.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::InvalidEventConstruction` for `EventType::None`,
    /// which only tags session-state notifications.
    pub fn node_changed(event_type: EventType, path: impl Into<String>) -> WatchResult<Self> {
        let path = path.into();
        if !event_type.is_node_event() {
            return Err(WatchError::InvalidEventConstruction {
                event_type,
                path: Some(path),
            });
        }
        Ok(Self::NodeChanged { event_type, path })
    }

    /// Decodes a server frame.
    ///
    /// A frame of type `None` is a state transition; any other type is a
    /// node change on `path`. The frame's state code is still validated for
    /// node changes even though the dispatcher tracks state itself.
    ///
    /// # Errors
    ///
    /// `InvalidWireCode` for undefined codes, `InvalidEventConstruction`
    /// when the path does not match the type.
    pub fn from_wire(wire: WireEvent) -> WatchResult<Self> {
        let state = SessionState::from_code(wire.state)?;
        let event_type = EventType::from_code(wire.event_type)?;
        match (event_type, wire.path) {
            (EventType::None, None) => Ok(Self::StateChanged(state)),
            (event_type, Some(path)) if event_type.is_node_event() => Ok(Self::NodeChanged { event_type, path }),
            (event_type, path) => Err(WatchError::InvalidEventConstruction { event_type, path }),
        }
    }

    #[must_use]
    pub const fn is_state_change(&self) -> bool {
        matches!(self, Self::StateChanged(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::WireCodeKind;

    #[test]
    fn session_frame_decodes_to_state_change() {
        let sig = Signal::from_wire(WireEvent::new(-1, -112, None)).unwrap();
        assert_eq!(sig, Signal::StateChanged(SessionState::Expired));
        assert!(sig.is_state_change());
    }

    #[test]
    fn node_frame_decodes_to_node_change() {
        let sig = Signal::from_wire(WireEvent::new(3, 3, Some("/cfg".to_string()))).unwrap();
        assert_eq!(
            sig,
            Signal::NodeChanged {
                event_type: EventType::NodeDataChanged,
                path: "/cfg".to_string()
            }
        );
    }

    #[test]
    fn bad_codes_are_rejected() {
        let err = Signal::from_wire(WireEvent::new(7, 3, Some("/a".to_string()))).unwrap_err();
        assert_eq!(
            err,
            WatchError::InvalidWireCode {
                kind: WireCodeKind::EventType,
                code: 7
            }
        );
        let err = Signal::from_wire(WireEvent::new(1, 99, Some("/a".to_string()))).unwrap_err();
        assert!(matches!(err, WatchError::InvalidWireCode { kind: WireCodeKind::SessionState, code: 99 }));
    }

    #[test]
    fn path_must_match_type() {
        assert!(matches!(
            Signal::from_wire(WireEvent::new(1, 3, None)),
            Err(WatchError::InvalidEventConstruction { .. })
        ));
        assert!(matches!(
            Signal::from_wire(WireEvent::new(-1, 3, Some("/a".to_string()))),
            Err(WatchError::InvalidEventConstruction { .. })
        ));
        assert!(Signal::node_changed(EventType::None, "/a").is_err());
        assert!(Signal::node_changed(EventType::NodeDeleted, "/a").is_ok());
    }
}
