//! Individual client session handling

use anyhow::Result;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use paracook_shared::{codec, Envelope};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Handle to send messages to a specific client
#[derive(Clone)]
pub struct SessionHandle {
    pub id: u64,
    pub addr: SocketAddr,
    writer: Arc<Mutex<WsSink>>,
}

impl SessionHandle {
    /// Send an envelope to this client
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        let encoded = codec::encode(envelope)?;
        self.send_text(encoded).await
    }

    /// Send a raw text frame to this client
    pub async fn send_text(&self, text: String) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send(Message::Text(text.into())).await?;
        Ok(())
    }
}

/// What a client sent us
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The bare heartbeat frame
    Ping,
    /// A JSON envelope
    Envelope(Envelope),
    /// Text that is neither
    Unparsed(String),
}

/// Active client session
pub struct ClientSession {
    pub handle: SessionHandle,
    reader: WsSource,
}

impl ClientSession {
    /// Create a new session from an upgraded WebSocket
    pub fn new(id: u64, stream: WebSocketStream<TcpStream>, addr: SocketAddr) -> Self {
        let (writer, reader) = stream.split();

        let handle = SessionHandle {
            id,
            addr,
            writer: Arc::new(Mutex::new(writer)),
        };

        Self { handle, reader }
    }

    /// Get a cloneable handle for sending messages
    pub fn get_handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Read the next text message from this session
    /// Returns None if the connection is closed
    pub async fn recv(&mut self) -> Option<Inbound> {
        loop {
            match self.reader.next().await? {
                Ok(Message::Text(text)) => return Some(classify(text.as_str())),
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Read error from {}: {}", self.handle.addr, e);
                    return None;
                }
            }
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.addr
    }
}

fn classify(text: &str) -> Inbound {
    if codec::is_ping(text) {
        return Inbound::Ping;
    }
    match codec::decode(text) {
        Ok(envelope) => Inbound::Envelope(envelope),
        Err(_) => Inbound::Unparsed(text.to_owned()),
    }
}
