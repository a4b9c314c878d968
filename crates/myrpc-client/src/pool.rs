use std::collections::HashMap;
use std::sync::Arc;

use myrpc_common::transport::{Connection, ConnectionConfig};
use myrpc_common::Result;
use tokio::sync::Mutex;

/// Cache of provider connections, one per `host:port`.
///
/// Each [`Connection`] multiplexes any number of concurrent calls, so there
/// is no need for more than one per address. Connections found closed are
/// evicted and replaced on the next [`acquire`](Self::acquire).
///
/// # Example
///
/// ```rust,no_run
/// use myrpc_client::ConnectionCache;
/// use myrpc_common::transport::ConnectionConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = ConnectionCache::new(ConnectionConfig::default());
/// let conn = cache.acquire("127.0.0.1:20880").await?;
/// let again = cache.acquire("127.0.0.1:20880").await?;
/// assert!(std::sync::Arc::ptr_eq(&conn, &again));
/// # Ok(())
/// # }
/// ```
pub struct ConnectionCache {
    config: ConnectionConfig,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl ConnectionCache {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the live connection for `addr`, connecting if there is none.
    ///
    /// # Errors
    ///
    /// `Connection` or `Timeout` if a new connection cannot be established.
    pub async fn acquire(&self, addr: &str) -> Result<Arc<Connection>> {
        {
            let mut connections = self.connections.lock().await;
            match connections.get(addr) {
                Some(conn) if !conn.is_closed() => return Ok(Arc::clone(conn)),
                Some(_) => {
                    tracing::debug!(addr = %addr, "evicting closed connection");
                    connections.remove(addr);
                }
                None => {}
            }
        }

        // Connect without holding the lock so other addresses are not blocked.
        let conn = Arc::new(Connection::connect(addr, self.config).await?);

        let mut connections = self.connections.lock().await;
        match connections.get(addr) {
            // Another caller won the race; keep theirs and drop ours.
            Some(existing) if !existing.is_closed() => Ok(Arc::clone(existing)),
            _ => {
                connections.insert(addr.to_string(), Arc::clone(&conn));
                tracing::debug!(addr = %addr, "connection cached");
                Ok(conn)
            }
        }
    }

    /// Drops `addr`'s connection from the cache if it is closed.
    pub async fn evict_if_closed(&self, addr: &str) {
        let mut connections = self.connections.lock().await;
        if connections.get(addr).map(|c| c.is_closed()).unwrap_or(false) {
            connections.remove(addr);
            tracing::debug!(addr = %addr, "evicting closed connection");
        }
    }

    /// Closes every cached connection, failing their pending calls.
    pub async fn close_all(&self) {
        let mut connections = self.connections.lock().await;
        for (addr, conn) in connections.drain() {
            tracing::debug!(addr = %addr, "closing connection");
            conn.close();
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
