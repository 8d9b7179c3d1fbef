use crate::infra::websocket::connection::{Connection, Delivery};
use axum::extract::ws::Utf8Bytes;
use dashmap::DashMap;
use std::{fmt, sync::Arc};
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-broadcast delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub skipped: usize,
    pub pruned: usize,
}

#[derive(Clone)]
pub struct ConnectionManager {
    /// Active WebSocket connections mapped by connection ID
    connections: Arc<DashMap<Uuid, Arc<Connection>>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Register a connection; from here on it receives broadcasts.
    pub fn add_connection(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.id, connection);
    }

    pub fn remove_connection(&self, conn_id: Uuid) -> Option<Arc<Connection>> {
        self.connections.remove(&conn_id).map(|(_, connection)| connection)
    }

    pub fn get_connection(&self, conn_id: &Uuid) -> Option<Arc<Connection>> {
        self.connections.get(conn_id).map(|c| c.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Offer the frame for event `sequence` to every registered connection.
    ///
    /// Never waits on a client. Full queues skip the frame for that client;
    /// closed ones are pruned.
    pub fn broadcast(&self, sequence: u64, frame: &Utf8Bytes) -> BroadcastReport {
        // Snapshot first so no shard lock is held while pruning.
        let connections: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut report = BroadcastReport::default();
        for connection in connections {
            match connection.offer(sequence, frame.clone()) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Full => {
                    warn!(
                        connection_id = %connection.id,
                        "client queue full; skipping event"
                    );
                    report.skipped += 1;
                }
                Delivery::Closed => {
                    debug!(connection_id = %connection.id, "pruning closed connection");
                    self.connections.remove(&connection.id);
                    report.pruned += 1;
                }
            }
        }
        report
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn one_stuck_client_does_not_block_others() {
        let manager = ConnectionManager::new();

        let (fast, mut fast_rx) = Connection::channel();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let slow = Connection::new(slow_tx);
        let (gone, gone_rx) = Connection::channel();
        drop(gone_rx);

        let gone_id = gone.id;
        manager.add_connection(Arc::new(fast));
        manager.add_connection(Arc::new(slow));
        manager.add_connection(Arc::new(gone));

        let first = manager.broadcast(1, &"first".into());
        assert_eq!(
            first,
            BroadcastReport {
                delivered: 2,
                skipped: 0,
                pruned: 1
            }
        );
        assert!(manager.get_connection(&gone_id).is_none());

        let second = manager.broadcast(2, &"second".into());
        assert_eq!(second.delivered, 1);
        assert_eq!(second.skipped, 1);

        assert_eq!(fast_rx.try_recv().unwrap().as_str(), "first");
        assert_eq!(fast_rx.try_recv().unwrap().as_str(), "second");
        assert_eq!(manager.connection_count(), 2);
    }
}
