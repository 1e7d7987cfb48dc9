//! In-process transport whose far end is driven by the caller
//!
//! Each successful `connect` creates a channel pair and hands the far end
//! to whoever awaits [`MemoryConnector::accept`]. Used for hermetic tests.

use crate::transport::traits::{CloseInfo, TransportConnector, TransportEvent, TransportStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// A frame written by the client side of a memory connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFrame {
    /// A text frame
    Text(String),
    /// The client closed the connection
    Close { code: u16, reason: String },
}

/// Client end of a memory connection
pub struct MemoryTransportStream {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<PeerFrame>,
    finished: bool,
}

#[async_trait]
impl TransportStream for MemoryTransportStream {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.outbound
            .send(PeerFrame::Text(text))
            .map_err(|_| anyhow!("Memory peer has gone away"))
    }

    async fn next_event(&mut self) -> TransportEvent {
        if self.finished {
            return std::future::pending().await;
        }
        match self.inbound.recv().await {
            Some(TransportEvent::Closed(close)) => {
                self.finished = true;
                TransportEvent::Closed(close)
            }
            Some(event) => event,
            None => {
                self.finished = true;
                TransportEvent::Closed(CloseInfo::abnormal("Memory peer dropped"))
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.outbound
            .send(PeerFrame::Close {
                code,
                reason: reason.to_owned(),
            })
            .map_err(|_| anyhow!("Memory peer has gone away"))
    }
}

/// Far end of a memory connection
pub struct MemoryPeer {
    address: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    frames: mpsc::UnboundedReceiver<PeerFrame>,
}

impl MemoryPeer {
    /// Address the client connected to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Deliver a text frame to the client
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Message(text.into()));
    }

    /// Report a transport error to the client
    pub fn send_error(&self, error: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Error(error.into()));
    }

    /// Close the connection from the far end
    pub fn close(&self, code: u16, clean: bool) {
        let _ = self.events.send(TransportEvent::Closed(CloseInfo {
            code,
            reason: String::new(),
            clean,
        }));
    }

    /// Next frame written by the client; `None` once the client dropped its end
    pub async fn recv(&mut self) -> Option<PeerFrame> {
        self.frames.recv().await
    }

    /// Next frame if one is already queued
    pub fn try_recv(&mut self) -> Option<PeerFrame> {
        self.frames.try_recv().ok()
    }
}

struct ConnectorState {
    refusing: AtomicBool,
    attempts: AtomicUsize,
    peers_tx: mpsc::UnboundedSender<MemoryPeer>,
    peers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MemoryPeer>>,
    last_address: Mutex<Option<String>>,
}

/// Connector producing memory connections; clones share state
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<ConnectorState>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(ConnectorState {
                refusing: AtomicBool::new(false),
                attempts: AtomicUsize::new(0),
                peers_tx,
                peers_rx: tokio::sync::Mutex::new(peers_rx),
                last_address: Mutex::new(None),
            }),
        }
    }

    /// Make subsequent connect calls fail (or succeed again)
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refusing.store(refuse, Ordering::SeqCst);
    }

    /// Number of connect calls made so far, refused ones included
    pub fn connect_attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Address passed to the most recent connect call
    pub fn last_address(&self) -> Option<String> {
        self.state
            .last_address
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for the next accepted connection
    pub async fn accept(&self) -> Option<MemoryPeer> {
        self.state.peers_rx.lock().await.recv().await
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportConnector for MemoryConnector {
    type Stream = MemoryTransportStream;

    async fn connect(&self, address: &str) -> Result<Self::Stream> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        *self
            .state
            .last_address
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(address.to_owned());

        if self.state.refusing.load(Ordering::SeqCst) {
            return Err(anyhow!("Connection refused: {}", address));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            address: address.to_owned(),
            events: events_tx,
            frames: frames_rx,
        };
        self.state
            .peers_tx
            .send(peer)
            .map_err(|_| anyhow!("Memory connector closed"))?;

        Ok(MemoryTransportStream {
            inbound: events_rx,
            outbound: frames_tx,
            finished: false,
        })
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}
