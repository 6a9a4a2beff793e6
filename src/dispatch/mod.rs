//! Dispatch subsystem: turns transport signals into ordered watcher calls.
//!
//! One `EventDispatcher` serves one client session. The transport feeds it
//! through a `SignalSender`, the RPC layer adds watches to its
//! `WatchRegistry`, and a single worker thread runs the `DispatchPipeline`
//! that delivers every event to the interested watchers in order.

/// Worker thread, configuration and transport handle.
pub mod dispatcher;
/// Single-consumer delivery state machine.
pub mod pipeline;
/// Session-owned watch registrations.
pub mod registry;
/// Decoded transport signals.
pub mod signal;
/// Channel-backed watcher.
pub mod stream;

pub use dispatcher::{DispatcherConfig, EventDispatcher, SignalSender};
pub use pipeline::{DeliveryReport, DispatchPipeline, DispatchStats};
pub use registry::{WatchKind, WatchMode, WatchRegistry};
pub use signal::Signal;
pub use stream::WatchStream;
