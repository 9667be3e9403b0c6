//! Connection registry
//!
//! Tracks the single live connection per identity and doubles as the
//! personal notification room: sending to a user means sending to the
//! one connection registered for them.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use palaver_core::models::Identity;

use crate::protocol::ServerEvent;

/// Outbound queue feeding a connection's writer task
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// A registered connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: Uuid,
    pub identity: Identity,
    pub sender: EventSender,
}

/// One live connection per identity
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<Uuid, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, evicting any prior connection for the
    /// same identity.
    ///
    /// The eviction notice is queued and the entry replaced under one
    /// write lock, so no other event can land on the old connection
    /// between the notice and its replacement.
    pub async fn admit(&self, handle: ConnectionHandle) {
        let user_id = handle.identity.id;
        let mut inner = self.inner.write().await;
        if let Some(prev) = inner.insert(user_id, handle) {
            info!(user_id = %user_id, old_conn = %prev.conn_id, "Evicting previous connection");
            let _ = prev.sender.send(ServerEvent::Evicted {
                reason: "signed in from another connection".to_string(),
            });
        }
    }

    /// Remove the entry for this identity, but only if it still belongs
    /// to the given connection. A disconnect racing with its own
    /// eviction must not tear down the successor.
    pub async fn remove(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut inner = self.inner.write().await;
        match inner.get(&user_id) {
            Some(h) if h.conn_id == conn_id => {
                inner.remove(&user_id);
                true
            }
            _ => {
                debug!(user_id = %user_id, conn_id = %conn_id, "Stale remove ignored");
                false
            }
        }
    }

    /// Deliver an event on a user's personal room. Returns false when
    /// the user has no live connection; callers treat that as
    /// fire-and-forget.
    pub async fn send_to_user(&self, user_id: Uuid, event: ServerEvent) -> bool {
        let inner = self.inner.read().await;
        match inner.get(&user_id) {
            Some(h) => h.sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver an event to every live connection
    pub async fn broadcast_all(&self, event: ServerEvent) {
        let inner = self.inner.read().await;
        for handle in inner.values() {
            let _ = handle.sender.send(event.clone());
        }
    }

    pub async fn is_connected(&self, user_id: Uuid) -> bool {
        self.inner.read().await.contains_key(&user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(user_id: Uuid) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let h = ConnectionHandle {
            conn_id: Uuid::new_v4(),
            identity: Identity {
                id: user_id,
                username: "alice".to_string(),
            },
            sender: tx,
        };
        (h, rx)
    }

    #[tokio::test]
    async fn test_admit_evicts_previous() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        let (first, mut first_rx) = handle(user_id);
        let (second, _second_rx) = handle(user_id);
        let second_conn = second.conn_id;

        registry.admit(first).await;
        registry.admit(second).await;

        assert_eq!(registry.connection_count().await, 1);
        match first_rx.recv().await {
            Some(ServerEvent::Evicted { .. }) => {}
            other => panic!("Expected eviction, got {:?}", other),
        }

        // Registry now points at the second connection
        assert!(registry.send_to_user(user_id, ServerEvent::Evicted { reason: "x".into() }).await);
        let _ = second_conn;
    }

    #[tokio::test]
    async fn test_stale_remove_keeps_successor() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        let (first, _rx1) = handle(user_id);
        let first_conn = first.conn_id;
        let (second, _rx2) = handle(user_id);

        registry.admit(first).await;
        registry.admit(second).await;

        // The evicted connection cleans up late; the successor survives
        assert!(!registry.remove(user_id, first_conn).await);
        assert!(registry.is_connected(user_id).await);
    }

    #[tokio::test]
    async fn test_remove_own_entry() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        let (h, _rx) = handle(user_id);
        let conn_id = h.conn_id;
        registry.admit(h).await;

        assert!(registry.remove(user_id, conn_id).await);
        assert!(!registry.is_connected(user_id).await);
    }
}
