//! Session manager for tracking all connected clients

use super::connection::SessionHandle;
use paracook_shared::Envelope;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Manages all active client sessions
pub struct SessionManager {
    /// Map of session id -> session handle
    sessions: Arc<RwLock<HashMap<u64, SessionHandle>>>,
    next_id: AtomicU64,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a new session
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a new client session
    pub async fn register(&self, handle: SessionHandle) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(handle.id, handle);
    }

    /// Unregister a client session
    pub async fn unregister(&self, id: u64) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id);
    }

    /// Send an envelope to a specific client
    pub async fn send_to(&self, id: u64, envelope: &Envelope) -> anyhow::Result<()> {
        let handle = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Session not connected: {}", id))?;
        handle.send(envelope).await
    }

    /// Broadcast an envelope to all connected clients; returns how many received it
    pub async fn broadcast(&self, kind: &str, data: Value) -> usize {
        let envelope = Envelope::new(kind, data);
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();

        let mut delivered = 0;
        for handle in handles {
            match handle.send(&envelope).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to send to session {} ({}): {}", handle.id, handle.addr, e),
            }
        }
        delivered
    }

    /// Get the number of connected clients
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_empty_manager() {
        let sessions = SessionManager::new();
        assert_eq!(sessions.count().await, 0);
        assert_eq!(sessions.broadcast("log", json!({"message": "nobody"})).await, 0);
        assert!(sessions.send_to(7, &Envelope::pong()).await.is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        let sessions = SessionManager::new();
        let a = sessions.next_id();
        let b = sessions.next_id();
        assert_ne!(a, b);
    }
}
