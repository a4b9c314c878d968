use std::sync::Arc;

use myrpc_common::protocol::{Request, RpcResult};
use myrpc_common::{Result, RpcError, ServiceAddress};

use crate::config::ClientConfig;
use crate::pool::ConnectionCache;

/// MyRPC client for making calls to providers
///
/// Keeps one multiplexed connection per provider address and reuses it for
/// every call to that address. Cloning is cheap and shares the cache.
///
/// # Example
///
/// ```rust,no_run
/// use myrpc_client::{ClientConfig, RpcClient};
/// use myrpc_common::{Request, ServiceAddress};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RpcClient::new(ClientConfig::default())?;
/// let request = Request::new("com.example.ExampleService", "sayHello")
///     .with_arg("string", json!("World"))
///     .with_arg("int", json!(3))
///     .with_version("1.0");
///
/// let result = client.call(&ServiceAddress::new("127.0.0.1", 20880), request).await?;
/// assert_eq!(result, Some(json!("Hello, World (3)")));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    connections: ConnectionCache,
}

impl RpcClient {
    /// Creates a client. No connection is made until the first call.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let connections = ConnectionCache::new(config.connection());
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                connections,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Sends `request` to the provider at `address` and waits for its
    /// response.
    ///
    /// Returns the result value, `None` for methods that return nothing.
    ///
    /// # Errors
    ///
    /// - `RemoteInvocation` if the provider reported a failure
    /// - `Connection` / `ConnectionClosed` if the connection could not be
    ///   made or died before the response arrived
    /// - `Timeout` if no response arrived within `call_timeout`
    pub async fn call(&self, address: &ServiceAddress, request: Request) -> Result<Option<RpcResult>> {
        request.validate()?;
        let addr = address.to_string();

        let conn = self.inner.connections.acquire(&addr).await?;
        let outcome = match conn.send(&request).await {
            Ok(call) => call.wait(self.inner.config.call_timeout).await,
            Err(e) => Err(e),
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                if conn.is_closed() {
                    self.inner.connections.evict_if_closed(&addr).await;
                }
                tracing::debug!(
                    addr = %addr,
                    request_id = %request.request_id,
                    error = %e,
                    "call failed"
                );
                return Err(e);
            }
        };

        match response.error {
            Some(message) => Err(RpcError::RemoteInvocation(message)),
            None => Ok(response.result),
        }
    }

    /// Closes every cached connection. Calls in flight fail with
    /// `ConnectionClosed`.
    pub async fn close_all(&self) {
        self.inner.connections.close_all().await;
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_client_creation() {
        assert!(RpcClient::new(ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        let config = ClientConfig::default().with_call_timeout(Duration::ZERO);
        assert!(RpcClient::new(config).is_err());
    }

    #[tokio::test]
    async fn test_client_is_clonable() {
        let client = RpcClient::new(ClientConfig::default()).unwrap();
        let clone = client.clone();
        assert!(Arc::ptr_eq(&client.inner, &clone.inner));
        assert_eq!(clone.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_request_not_sent() {
        let client = RpcClient::new(ClientConfig::default()).unwrap();
        let request = Request::new("", "m");
        let result = client.call(&ServiceAddress::new("127.0.0.1", 1), request).await;
        assert!(matches!(result, Err(RpcError::InvalidRequest(_))));
        assert_eq!(client.connection_count().await, 0);
    }
}
