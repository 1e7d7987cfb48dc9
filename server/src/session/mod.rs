//! Session management for tracking connected clients
//!
//! This module handles:
//! - Tracking all connected client sessions
//! - Reading heartbeat and envelope frames from each client
//! - Broadcasting envelopes to every client

mod connection;
mod manager;

pub use connection::{ClientSession, Inbound, SessionHandle};
pub use manager::SessionManager;
