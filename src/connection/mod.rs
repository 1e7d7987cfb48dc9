//! Connection management for persistent bidirectional communication
//!
//! This module handles:
//! - A single persistent connection with bounded automatic reconnection
//! - Heartbeat pings while the link is open
//! - Lifecycle events (`connected`, `error`, `reconnect_failed`) fanned out to subscribers

mod heartbeat;
mod manager;
mod reconnect;
mod state;

pub use heartbeat::Heartbeat;
pub use manager::{ConnectionConfig, ConnectionManager, LinkStats};
pub use reconnect::{ReconnectDecision, ReconnectPolicy, ReconnectState};
pub use state::{ConnectionState, ConnectionStateMachine, LinkEvent, TransitionResult};
