use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::protocol::error::{Result, RpcError};

/// Async TCP accept loop shared by the RPC server and the coordination
/// server.
///
/// Each accepted connection is handed to the handler on its own task.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Binds to `bind_addr` (e.g. "0.0.0.0:20880", or port 0 for any port).
    pub async fn bind(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| RpcError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RpcError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Connection tasks already running are not cancelled by shutdown; they end
    /// when their peer disconnects.
    pub async fn run_with_handler<F, Fut, S>(&self, handler: F, shutdown: S) -> Result<()>
    where
        F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("accept loop shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // Per-connection failures (e.g. EMFILE) must not stop the server.
                        tracing::error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            tracing::debug!(peer = %peer_addr, "connection established");

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = handler(stream, peer_addr).await {
                    tracing::warn!(peer = %peer_addr, error = %e, "connection error");
                }
            });
        }
    }
}
