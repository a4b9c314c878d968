//! Typed client stubs over discovery plus the RPC client.

use std::sync::Arc;

use myrpc_common::{Request, Result, RpcError, ServiceAddress, DEFAULT_VERSION};
use myrpc_registry::ServiceRegistry;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::RpcClient;

/// A client-side adapter for one service interface.
///
/// Implementors forward each trait method to [`ServiceProxy::invoke`].
///
/// ```
/// use myrpc_client::{RemoteService, ServiceProxy};
/// use myrpc_common::Result;
/// use serde_json::json;
///
/// pub struct CalculatorClient {
///     proxy: ServiceProxy,
/// }
///
/// impl RemoteService for CalculatorClient {
///     const INTERFACE: &'static str = "com.example.Calculator";
///
///     fn from_proxy(proxy: ServiceProxy) -> Self {
///         Self { proxy }
///     }
/// }
///
/// impl CalculatorClient {
///     pub async fn add(&self, a: i64, b: i64) -> Result<i64> {
///         self.proxy.invoke("add", &["long", "long"], vec![json!(a), json!(b)]).await
///     }
/// }
/// ```
pub trait RemoteService: Sized {
    /// Fully qualified interface name providers register under.
    const INTERFACE: &'static str;

    fn from_proxy(proxy: ServiceProxy) -> Self;
}

/// Creates service adapters bound to a registry and a client.
#[derive(Clone)]
pub struct ProxyFactory {
    registry: Arc<ServiceRegistry>,
    client: RpcClient,
}

impl ProxyFactory {
    pub fn new(registry: Arc<ServiceRegistry>, client: RpcClient) -> Self {
        Self { registry, client }
    }

    /// Builds an adapter for `T` at `version`.
    pub fn create<T: RemoteService>(&self, version: &str) -> T {
        T::from_proxy(self.proxy(T::INTERFACE, version))
    }

    /// Builds an adapter for `T` at the default version.
    pub fn create_default<T: RemoteService>(&self) -> T {
        self.create(DEFAULT_VERSION)
    }

    /// Untyped proxy for `interface` at `version`.
    pub fn proxy(&self, interface: &str, version: &str) -> ServiceProxy {
        ServiceProxy {
            interface: interface.to_string(),
            version: version.to_string(),
            registry: Arc::clone(&self.registry),
            client: self.client.clone(),
        }
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

/// Invocation handler for one `(interface, version)`.
#[derive(Clone)]
pub struct ServiceProxy {
    interface: String,
    version: String,
    registry: Arc<ServiceRegistry>,
    client: RpcClient,
}

impl ServiceProxy {
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Calls `method` on a provider picked from the registry and converts the
    /// result into `R`. Use `R = ()` for methods that return nothing.
    ///
    /// # Errors
    ///
    /// - `ServiceNotFound` if no provider is registered (nothing is sent)
    /// - `InvalidAddress` if the registered address is not `host:port`
    /// - `RemoteInvocation` if the provider reported a failure
    /// - `InvalidResponse` if the result does not convert into `R`
    /// - transport errors from [`RpcClient::call`]
    pub async fn invoke<R: DeserializeOwned>(
        &self,
        method: &str,
        parameter_types: &[&str],
        args: Vec<Value>,
    ) -> Result<R> {
        let request = Request::new(self.interface.as_str(), method)
            .with_args(
                parameter_types.iter().map(|t| t.to_string()).collect(),
                args,
            )
            .with_version(self.version.as_str());

        let addr = self.registry.discover(&self.interface, &self.version).await?;
        let address = ServiceAddress::parse(&addr)?;

        tracing::debug!(
            interface = %self.interface,
            method = %method,
            address = %address,
            request_id = %request.request_id,
            "invoking remote method"
        );

        let result = self.client.call(&address, request).await?;
        coerce(result)
    }
}

/// Converts a wire result into the declared return type. A missing result is
/// treated as `null`, which is what `()` and `Option<T>` expect.
fn coerce<R: DeserializeOwned>(result: Option<Value>) -> Result<R> {
    serde_json::from_value(result.unwrap_or(Value::Null))
        .map_err(|e| RpcError::InvalidResponse(format!("unexpected result type: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_string() {
        let value: String = coerce(Some(json!("Hello, World (3)"))).unwrap();
        assert_eq!(value, "Hello, World (3)");
    }

    #[test]
    fn test_coerce_void() {
        let _: () = coerce(None).unwrap();
        let _: () = coerce(Some(Value::Null)).unwrap();
    }

    #[test]
    fn test_coerce_optional() {
        let value: Option<i32> = coerce(None).unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_coerce_mismatch() {
        let result: Result<i32> = coerce(Some(json!("not a number")));
        assert!(matches!(result, Err(RpcError::InvalidResponse(_))));
    }
}
