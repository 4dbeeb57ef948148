//! Registry of live adapter connections.
//!
//! Connections are keyed by the adapter id announced in `X-Self-ID` (which
//! may be the wildcard `*`). If a second connection arrives with an id that
//! is already live, it is queued behind the first: the first keeps receiving
//! routed actions until it disconnects, then the next one takes over.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ApiResult};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Sending half of a connected adapter.
///
/// Cloning is cheap; every clone writes into the same outbound frame queue,
/// which the transport drains into the socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    connection_id: u64,
    adapter_id: String,
    tx: mpsc::Sender<String>,
}

impl ConnectionHandle {
    /// Wraps the outbound frame queue of a freshly accepted connection.
    pub fn new(adapter_id: impl Into<String>, tx: mpsc::Sender<String>) -> Self {
        Self {
            connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            adapter_id: adapter_id.into(),
            tx,
        }
    }

    pub fn adapter_id(&self) -> &str {
        &self.adapter_id
    }

    /// Process-unique id distinguishing connections that share an adapter id.
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Queues a text frame for delivery.
    pub async fn send_text(&self, text: String) -> ApiResult<()> {
        self.tx
            .send(text)
            .await
            .map_err(|_| ApiError::Network(format!("connection to '{}' closed", self.adapter_id)))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Live adapter connections keyed by adapter id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, VecDeque<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. Returns `true` if it is now the live route for its
    /// adapter id, `false` if it was queued behind an existing one.
    pub fn register(&self, handle: ConnectionHandle) -> bool {
        let adapter_id = handle.adapter_id().to_string();
        let mut connections = self.connections.write();
        let queue = connections.entry(adapter_id.clone()).or_default();
        queue.push_back(handle);

        if queue.len() > 1 {
            warn!(
                adapter_id = %adapter_id,
                queued = queue.len() - 1,
                "Adapter id already has a live connection; new connection queued behind it"
            );
            false
        } else {
            info!(adapter_id = %adapter_id, "Adapter connection registered");
            true
        }
    }

    /// Removes exactly this connection, if it is still present.
    pub fn unregister(&self, handle: &ConnectionHandle) -> bool {
        let mut connections = self.connections.write();
        let Some(queue) = connections.get_mut(handle.adapter_id()) else {
            return false;
        };
        let Some(position) = queue
            .iter()
            .position(|c| c.connection_id == handle.connection_id)
        else {
            return false;
        };
        queue.remove(position);
        if queue.is_empty() {
            connections.remove(handle.adapter_id());
            info!(adapter_id = %handle.adapter_id(), "Adapter connection unregistered");
        } else if position == 0 {
            debug!(adapter_id = %handle.adapter_id(), "Queued connection promoted to live route");
        }
        true
    }

    /// Returns the live connection for `adapter_id`.
    pub fn get(&self, adapter_id: &str) -> Option<ConnectionHandle> {
        self.connections
            .read()
            .get(adapter_id)
            .and_then(|queue| queue.front().cloned())
    }

    pub fn contains(&self, adapter_id: &str) -> bool {
        self.connections.read().contains_key(adapter_id)
    }

    /// Returns the live connection if exactly one adapter id is registered.
    pub fn sole(&self) -> Option<ConnectionHandle> {
        let connections = self.connections.read();
        if connections.len() != 1 {
            return None;
        }
        connections.values().next().and_then(|q| q.front().cloned())
    }

    /// Number of distinct adapter ids with a live connection.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn adapter_ids(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }
}
