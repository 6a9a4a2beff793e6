//! # zkwatch - ordered watch-event delivery for coordination service clients
//!
//! zkwatch is the event-notification layer of a coordination service
//! client. The transport reports session-state transitions and node-change
//! notifications; zkwatch turns them into `WatchedEvent`s and delivers them,
//! strictly in session order, to the watchers the application registered.
//!
//! ## Core Concepts
//!
//! - **SessionState / EventType**: closed code tables shared with the server
//! - **WatchedEvent**: one notification (state, type, optional path)
//! - **Watcher**: the callback invoked once per delivered event
//! - **EventDispatcher**: per-session worker that resolves and invokes watchers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use zkwatch::{
//!     watcher_fn, DispatcherConfig, EventDispatcher, EventType, SessionState, Signal, WatchKind,
//!     WatchMode,
//! };
//!
//! # fn main() -> zkwatch::WatchResult<()> {
//! let default = watcher_fn(|event| println!("session: {event}"));
//! let dispatcher = EventDispatcher::new(DispatcherConfig::default(), Some(default))?;
//!
//! // RPC layer: a read with a watch succeeded.
//! let on_config = watcher_fn(|event| println!("config: {event}"));
//! dispatcher
//!     .registry()
//!     .register("/config", WatchKind::Data, on_config, WatchMode::OneShot)?;
//!
//! // Transport layer: push signals in session order.
//! let transport = dispatcher.sender();
//! transport.send_state(SessionState::SyncConnected)?;
//! transport.send(Signal::node_changed(EventType::NodeDataChanged, "/config")?)?;
//!
//! dispatcher.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codes;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod watcher;

// Re-export primary types at crate root for convenience
pub use codes::{EventType, SessionState, WireCodeKind};
pub use dispatch::{
    DeliveryReport, DispatchPipeline, DispatchStats, DispatcherConfig, EventDispatcher, Signal,
    SignalSender, WatchKind, WatchMode, WatchRegistry, WatchStream,
};
pub use error::{WatchError, WatchResult};
pub use event::{WatchedEvent, WireEvent};
pub use watcher::{watcher_fn, Watcher, WatcherHandle, WatcherId};
