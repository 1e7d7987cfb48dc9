//! WebSocket transport implementation for the server's `/ws` endpoint

use crate::transport::traits::{CloseInfo, TransportConnector, TransportEvent, TransportStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use paracook_shared::timing;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket stream wrapper implementing TransportStream
pub struct WebSocketTransportStream {
    inner: WsStream,
    /// Close reported after a read error
    pending_close: Option<CloseInfo>,
    /// Set once a `Closed` event has been produced
    finished: bool,
}

impl WebSocketTransportStream {
    pub fn new(stream: WsStream) -> Self {
        Self {
            inner: stream,
            pending_close: None,
            finished: false,
        }
    }
}

#[async_trait]
impl TransportStream for WebSocketTransportStream {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        if let Some(close) = self.pending_close.take() {
            self.finished = true;
            return TransportEvent::Closed(close);
        }
        if self.finished {
            return std::future::pending().await;
        }

        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    return TransportEvent::Message(text.as_str().to_owned());
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return TransportEvent::Message(text),
                    Err(_) => debug!("Dropping non-UTF-8 binary frame ({} bytes)", bytes.len()),
                },
                Some(Ok(Message::Close(frame))) => {
                    self.finished = true;
                    let close = match frame {
                        Some(frame) => {
                            CloseInfo::clean(u16::from(frame.code), frame.reason.as_str())
                        }
                        None => CloseInfo::clean(timing::NO_STATUS_RECEIVED, ""),
                    };
                    return TransportEvent::Closed(close);
                }
                Some(Ok(other)) => {
                    // Protocol-level ping/pong is answered by tungstenite itself
                    trace!("Ignoring control frame: {:?}", other);
                }
                Some(Err(e)) => {
                    let reason = e.to_string();
                    self.pending_close = Some(CloseInfo::abnormal(reason.clone()));
                    return TransportEvent::Error(reason);
                }
                None => {
                    self.finished = true;
                    let close = CloseInfo::abnormal("Connection ended without close frame");
                    return TransportEvent::Closed(close);
                }
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.inner.close(Some(frame)).await?;
        Ok(())
    }
}

/// WebSocket connector for `ws://` and `wss://` addresses
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Create a connector with the given handshake timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    type Stream = WebSocketTransportStream;

    async fn connect(&self, address: &str) -> Result<Self::Stream> {
        let (stream, response) = timeout(self.connect_timeout, connect_async(address))
            .await
            .map_err(|_| {
                anyhow!("Timed out connecting to {} after {:?}", address, self.connect_timeout)
            })??;

        debug!("WebSocket handshake with {} complete: {}", address, response.status());
        Ok(WebSocketTransportStream::new(stream))
    }

    fn name(&self) -> &'static str {
        "WebSocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, ConnectionManager};
    use paracook_shared::kinds;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    async fn start_server() -> (String, Arc<server::SessionManager>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let sessions = Arc::new(server::SessionManager::new());
        let serve_sessions = sessions.clone();
        tokio::spawn(async move {
            let _ = server::serve(listener, serve_sessions).await;
        });
        (format!("ws://{}/ws", addr), sessions)
    }

    async fn wait_for_sessions(sessions: &server::SessionManager, expected: usize) {
        for _ in 0..200 {
            if sessions.count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} sessions, have {}", expected, sessions.count().await);
    }

    #[test]
    fn test_connector_name() {
        assert_eq!(WebSocketConnector::default().name(), "WebSocket");
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let connector = WebSocketConnector::new(Duration::from_secs(2));
        assert!(connector.connect(&format!("ws://{}/ws", addr)).await.is_err());
    }

    #[tokio::test]
    async fn test_end_to_end_with_dev_server() {
        let (url, sessions) = start_server().await;

        let config = ConnectionConfig {
            heartbeat_interval: Duration::from_millis(50),
            pong_timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let manager = ConnectionManager::new(WebSocketConnector::default(), config);

        let (connected_tx, mut connected_rx) = mpsc::unbounded_channel::<Value>();
        manager.subscribe(kinds::CONNECTED, move |payload| {
            connected_tx.send(payload.clone())?;
            Ok(())
        });
        let (world_tx, mut world_rx) = mpsc::unbounded_channel::<Value>();
        manager.subscribe(kinds::WORLD_UPDATE, move |payload| {
            world_tx.send(payload.clone())?;
            Ok(())
        });

        manager.connect(url.as_str()).await;
        assert_eq!(connected_rx.recv().await, Some(json!({"connected": true})));
        wait_for_sessions(&sessions, 1).await;

        sessions.broadcast(kinds::WORLD_UPDATE, json!({"tick": 1})).await;
        assert_eq!(world_rx.recv().await, Some(json!({"tick": 1})));

        // Several heartbeats pass; each is answered so the deadline never trips
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(manager.is_connected());
        assert_eq!(manager.reconnect_attempts(), 0);

        manager.disconnect().await;
        assert_eq!(connected_rx.recv().await, Some(json!({"connected": false})));
        assert!(!manager.is_connected());
        wait_for_sessions(&sessions, 0).await;
    }
}
