//! ParaCook real-time link
//!
//! A client for the ParaCook server's WebSocket channel: one persistent
//! connection with heartbeat and bounded reconnection, and a registry that
//! fans inbound envelopes and lifecycle events out to subscribers.

pub mod config;
pub mod connection;
pub mod error;
pub mod subscription;
pub mod transport;

pub use config::ClientConfig;
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, LinkStats};
pub use error::LinkError;
pub use subscription::{Listener, Subscription, SubscriptionGroup, SubscriptionRegistry};
pub use transport::{MemoryConnector, WebSocketConnector};
