use paracook_shared::codec;
use server::SessionManager;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let bind = std::env::var("PARACOOK_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_owned());
    let listener = TcpListener::bind(&bind).await?;
    info!("Server listening on ws://{}/ws", listener.local_addr()?);
    info!("Type a JSON envelope per line to broadcast it");

    let sessions = Arc::new(SessionManager::new());
    let server = tokio::spawn(server::serve(listener, sessions.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match codec::decode(line.trim()) {
                    Ok(envelope) => {
                        let delivered = sessions.broadcast(&envelope.kind, envelope.data).await;
                        info!("Broadcast {} to {} session(s)", envelope.kind, delivered);
                    }
                    Err(e) => warn!("Not an envelope: {}", e),
                },
                None => {
                    // stdin closed; keep serving
                    server.await??;
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}
