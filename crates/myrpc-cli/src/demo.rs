//! The demo `ExampleService` served by `myrpc provider` and called by
//! `myrpc call`.

use std::sync::Arc;

use myrpc_client::{RemoteService, ServiceProxy};
use myrpc_common::Result;
use myrpc_server::ServiceDefinition;
use serde_json::json;

/// Interface name both sides agree on.
pub const EXAMPLE_SERVICE: &str = "com.example.ExampleService";

pub trait ExampleService: Send + Sync {
    fn say_hello(&self, name: &str, times: i32) -> String;
}

/// Provider-side implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExampleServiceImpl;

impl ExampleService for ExampleServiceImpl {
    fn say_hello(&self, name: &str, times: i32) -> String {
        tracing::info!(name = %name, times, "sayHello");
        format!("Hello, {} ({})", name, times)
    }
}

/// Exposes `service` as `ExampleService` at `version`.
pub fn definition<S: ExampleService + 'static>(service: Arc<S>, version: &str) -> ServiceDefinition {
    ServiceDefinition::new(EXAMPLE_SERVICE, version).method(
        "sayHello",
        &["string", "int"],
        move |(name, times): (String, i32)| Ok(service.say_hello(&name, times)),
    )
}

/// Consumer-side adapter.
pub struct ExampleServiceClient {
    proxy: ServiceProxy,
}

impl RemoteService for ExampleServiceClient {
    const INTERFACE: &'static str = EXAMPLE_SERVICE;

    fn from_proxy(proxy: ServiceProxy) -> Self {
        Self { proxy }
    }
}

impl ExampleServiceClient {
    pub async fn say_hello(&self, name: &str, times: i32) -> Result<String> {
        self.proxy
            .invoke("sayHello", &["string", "int"], vec![json!(name), json!(times)])
            .await
    }

    pub fn version(&self) -> &str {
        self.proxy.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use myrpc_client::{ClientConfig, ProxyFactory, RpcClient};
    use myrpc_common::RpcError;
    use myrpc_registry::{CoordinationStore, RegistryConfig, ServiceRegistry};
    use myrpc_server::{RpcServer, ServerConfig};

    #[test]
    fn test_say_hello() {
        assert_eq!(ExampleServiceImpl.say_hello("World", 3), "Hello, World (3)");
    }

    #[test]
    fn test_definition_dispatches_to_service() {
        let service = definition(Arc::new(ExampleServiceImpl), "1.0");
        assert_eq!(service.key(), "com.example.ExampleService#1.0");

        let result = service
            .invoke(
                "sayHello",
                &["string".to_string(), "int".to_string()],
                vec![json!("World"), json!(3)],
            )
            .unwrap();
        assert_eq!(result, json!("Hello, World (3)"));
    }

    #[tokio::test]
    async fn test_provider_and_consumer() {
        let store = CoordinationStore::new();
        let provider_registry = ServiceRegistry::in_memory(store.clone(), RegistryConfig::default())
            .await
            .unwrap();
        let server = RpcServer::builder(ServerConfig::new().with_bind_addr("127.0.0.1:0"))
            .service(definition(Arc::new(ExampleServiceImpl), "1.0"))
            .start(Arc::new(provider_registry))
            .await
            .unwrap();
        let serving = tokio::spawn(server.run(std::future::pending()));

        let consumer_registry = ServiceRegistry::in_memory(store, RegistryConfig::default())
            .await
            .unwrap();
        let client = RpcClient::new(ClientConfig::default().with_call_timeout(Duration::from_secs(5))).unwrap();
        let factory = ProxyFactory::new(Arc::new(consumer_registry), client);

        let v1: ExampleServiceClient = factory.create("1.0");
        assert_eq!(v1.say_hello("World", 3).await.unwrap(), "Hello, World (3)");

        let v2: ExampleServiceClient = factory.create("2.0");
        assert!(matches!(
            v2.say_hello("World", 3).await,
            Err(RpcError::ServiceNotFound { .. })
        ));

        serving.abort();
    }
}
