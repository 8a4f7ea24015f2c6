use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Registry of live WebSocket sessions. A connection is just an address for
/// unicast and broadcast: each entry holds the sender side of that session's
/// outbound queue, drained by its writer task.
///
/// Delivery is best-effort per recipient. A full or closed queue is logged and
/// skipped; only the session's own receive loop removes the entry when it
/// detects disconnect.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<String>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session and hand back its id.
    pub async fn add(&self, tx: mpsc::UnboundedSender<String>) -> ConnectionId {
        let id = Uuid::new_v4();
        let mut connections = self.connections.write().await;
        connections.insert(id, tx);
        info!(connection_id = %id, connections = connections.len(), "websocket connected");
        id
    }

    /// Deregister a session. Removing an id that is already gone is a no-op.
    pub async fn remove(&self, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if connections.remove(&id).is_some() {
            info!(connection_id = %id, connections = connections.len(), "websocket disconnected");
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Queue a message for one session. Transport failures are logged and
    /// swallowed; the entry stays registered until its own loop removes it.
    pub async fn send_to(&self, id: ConnectionId, payload: String) {
        let connections = self.connections.read().await;
        match connections.get(&id) {
            Some(tx) => {
                if let Err(err) = tx.send(payload) {
                    warn!(connection_id = %id, error = %err, "failed to queue unicast message");
                }
            }
            None => debug!(connection_id = %id, "unicast target no longer registered"),
        }
    }

    /// Fan one message out to every session registered right now. The recipient
    /// set is snapshotted first, so sessions added mid-broadcast may or may not
    /// see this message, and one dead recipient never blocks the rest.
    pub async fn broadcast(&self, payload: &str) {
        let recipients: Vec<(ConnectionId, mpsc::UnboundedSender<String>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };
        for (id, tx) in recipients {
            if let Err(err) = tx.send(payload.to_owned()) {
                warn!(connection_id = %id, error = %err, "failed to queue broadcast message");
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_remove_track_membership() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.add(tx).await;
        assert_eq!(registry.connection_count().await, 1);
        registry.remove(id).await;
        assert_eq!(registry.connection_count().await, 0);
        // idempotent
        registry.remove(id).await;
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_connection() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.add(tx_a).await;
        registry.add(tx_b).await;

        registry.broadcast("hello").await;

        assert_eq!(rx_a.recv().await.unwrap(), "hello");
        assert_eq!(rx_b.recv().await.unwrap(), "hello");
        assert!(rx_a.try_recv().is_err(), "no duplicate delivery");
    }

    #[tokio::test]
    async fn one_dead_recipient_does_not_block_the_rest() {
        let registry = ConnectionRegistry::new();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        registry.add(tx_dead).await;
        let live_id = registry.add(tx_live).await;
        drop(rx_dead);

        registry.broadcast("still delivered").await;
        assert_eq!(rx_live.recv().await.unwrap(), "still delivered");

        // The dead entry is not evicted by the failed send.
        assert_eq!(registry.connection_count().await, 2);
        registry.send_to(live_id, "direct".into()).await;
        assert_eq!(rx_live.recv().await.unwrap(), "direct");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn membership_churn_during_broadcasts_never_duplicates_or_drops() {
        use std::sync::Arc;

        let registry = Arc::new(ConnectionRegistry::new());
        let (tx_stable, mut rx_stable) = mpsc::unbounded_channel();
        registry.add(tx_stable).await;

        let broadcaster = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    registry.broadcast(&format!("msg-{i}")).await;
                    tokio::task::yield_now().await;
                }
            })
        };
        let churn = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let mut sessions = Vec::new();
                for _ in 0..50 {
                    let (tx, rx) = mpsc::unbounded_channel();
                    let id = registry.add(tx).await;
                    sessions.push((id, rx));
                    tokio::task::yield_now().await;
                }
                let mut deliveries = Vec::new();
                for (id, mut rx) in sessions {
                    registry.remove(id).await;
                    let mut messages = Vec::new();
                    while let Ok(message) = rx.try_recv() {
                        messages.push(message);
                    }
                    deliveries.push(messages);
                }
                deliveries
            })
        };

        broadcaster.await.unwrap();
        let deliveries = churn.await.unwrap();

        // The member registered for the whole run saw every broadcast exactly
        // once, in commit order.
        let mut seen = Vec::new();
        while let Ok(message) = rx_stable.try_recv() {
            seen.push(message);
        }
        let expected: Vec<String> = (0..100).map(|i| format!("msg-{i}")).collect();
        assert_eq!(seen, expected);

        // Sessions that joined or left mid-broadcast may have missed messages
        // sent outside their membership window, but never received one twice.
        for messages in deliveries {
            let mut unique = messages.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), messages.len());
        }
    }

    #[tokio::test]
    async fn send_to_unknown_or_dead_target_is_silent() {
        let registry = ConnectionRegistry::new();
        registry.send_to(Uuid::new_v4(), "nobody home".into()).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.add(tx).await;
        drop(rx);
        registry.send_to(id, "dropped".into()).await;
        assert_eq!(registry.connection_count().await, 1);
    }
}
