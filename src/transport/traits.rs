//! Transport trait abstraction for pluggable message-framed backends

use anyhow::Result;
use async_trait::async_trait;

/// How a transport connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Numeric close code (1000 normal, 1006 abnormal, ...)
    pub code: u16,
    /// Close reason supplied by the peer, may be empty
    pub reason: String,
    /// Whether the closing handshake completed
    pub clean: bool,
}

impl CloseInfo {
    /// A close that completed the closing handshake
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            clean: true,
        }
    }

    /// A connection that dropped without a closing handshake
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: paracook_shared::timing::ABNORMAL_CLOSURE,
            reason: reason.into(),
            clean: false,
        }
    }
}

/// Events reported by an open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived
    Message(String),
    /// The transport reported an error; a `Closed` event follows if it is fatal
    Error(String),
    /// The connection is gone; no further events are produced
    Closed(CloseInfo),
}

/// An open, full-duplex, text-framed connection
#[async_trait]
pub trait TransportStream: Send + 'static {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Wait for the next event. Must be cancel-safe.
    async fn next_event(&mut self) -> TransportEvent;

    /// Close the connection with the given code
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// Factory for opening transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Open a connection to `address`; success is the transport's open event
    async fn connect(&self, address: &str) -> Result<Self::Stream>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
