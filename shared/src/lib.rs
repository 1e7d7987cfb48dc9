//! ParaCook Shared Protocol Types
//!
//! This crate provides the envelope type and text codec shared by the
//! real-time link client and the development server.

pub mod codec;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message kinds carried in the envelope `type` field
pub mod kinds {
    /// Heartbeat reply from the server, consumed by the link itself
    pub const PONG: &str = "pong";

    /// Lifecycle: connection opened or closed, payload `{connected: bool}`
    pub const CONNECTED: &str = "connected";
    /// Lifecycle: transport reported an error, payload `{error}`
    pub const ERROR: &str = "error";
    /// Lifecycle: reconnect budget exhausted, payload `{message}`
    pub const RECONNECT_FAILED: &str = "reconnect_failed";

    /// Greeting the dev server sends when a session opens
    pub const HELLO: &str = "hello";

    pub const LOG: &str = "log";
    pub const TASK_STATUS: &str = "task_status";
    pub const MAP_UPDATE: &str = "map_update";
    pub const CONFIG_UPDATE: &str = "config_update";
    pub const AGENTS_UPDATE: &str = "agents_update";
    pub const ACTIONS_UPDATE: &str = "actions_update";
    pub const SYSTEM_RESET: &str = "system_reset";
    pub const WORLD_UPDATE: &str = "world_update";

    /// Kinds synthesized locally by the link rather than received on the wire
    pub const LIFECYCLE: [&str; 3] = [CONNECTED, ERROR, RECONNECT_FAILED];
}

/// Timing and close-code defaults for the link
pub mod timing {
    /// Interval between keep-alive pings while the link is open
    pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

    /// Fixed delay before each reconnect attempt
    pub const RECONNECT_DELAY_MS: u64 = 3_000;

    /// Reconnect attempts allowed before giving up
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

    /// Close code sent on a deliberate disconnect
    pub const NORMAL_CLOSURE: u16 = 1000;

    /// Close code reported when a close frame carried no status
    pub const NO_STATUS_RECEIVED: u16 = 1005;

    /// Close code reported when the connection dropped without a close frame
    pub const ABNORMAL_CLOSURE: u16 = 1006;
}

/// A decoded message: a kind discriminator plus an arbitrary payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Create an envelope of the given kind
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Create the heartbeat reply envelope
    pub fn pong() -> Self {
        Self::new(kinds::PONG, Value::Null)
    }

    /// Whether this envelope is a heartbeat reply
    pub fn is_pong(&self) -> bool {
        self.kind == kinds::PONG
    }

    /// Whether this kind is reserved for locally synthesized lifecycle events
    pub fn is_lifecycle(&self) -> bool {
        kinds::LIFECYCLE.contains(&self.kind.as_str())
    }
}
