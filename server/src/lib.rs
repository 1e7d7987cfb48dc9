//! ParaCook development server
//!
//! Speaks the link's envelope protocol over WebSocket: greets each client,
//! answers heartbeats and broadcasts envelopes to every session.

pub mod session;

pub use session::{ClientSession, Inbound, SessionHandle, SessionManager};

use paracook_shared::{kinds, Envelope};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Accept clients on `listener` until the listener fails
pub async fn serve(listener: TcpListener, sessions: Arc<SessionManager>) -> anyhow::Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        info!("Connection from: {}", addr);

        let sessions = sessions.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, addr, sessions).await {
                warn!("Session with {} failed: {:#}", addr, e);
            }
        });
    }
}

async fn handle_connection(
    socket: TcpStream,
    addr: SocketAddr,
    sessions: Arc<SessionManager>,
) -> anyhow::Result<()> {
    let stream = tokio_tungstenite::accept_async(socket).await?;
    let mut session = ClientSession::new(sessions.next_id(), stream, addr);
    let handle = session.get_handle();

    sessions.register(handle.clone()).await;
    info!("Session {} registered ({} connected)", handle.id, sessions.count().await);

    let hello = Envelope::new(kinds::HELLO, json!({ "session": handle.id }));
    if let Err(e) = handle.send(&hello).await {
        warn!("Failed to greet session {}: {:#}", handle.id, e);
    }

    while let Some(inbound) = session.recv().await {
        match inbound {
            Inbound::Ping => {
                if let Err(e) = handle.send(&Envelope::pong()).await {
                    warn!("Failed to answer heartbeat from {}: {:#}", addr, e);
                    break;
                }
            }
            Inbound::Envelope(envelope) => {
                debug!("[session {}] {}: {}", handle.id, envelope.kind, envelope.data);
            }
            Inbound::Unparsed(text) => {
                warn!("[session {}] unparsed frame: {}", handle.id, text);
            }
        }
    }

    sessions.unregister(handle.id).await;
    info!("Session {} closed ({} connected)", handle.id, sessions.count().await);
    Ok(())
}
