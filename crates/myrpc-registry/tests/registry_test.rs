//! Service Registry Integration Tests
//!
//! These tests exercise registration and discovery against both the
//! in-process store and the networked coordination server, including
//! outages, session loss and the random address distribution.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use myrpc_common::transport::{write_frame, FrameConfig, FrameReader, MessageCodec, Serializer};
use myrpc_common::{RpcError, ServiceAddress, ServiceEndpoint};
use myrpc_registry::protocol::{CoordinationReply, CoordinationRequest};
use myrpc_registry::{
    CoordinationServer, CoordinationStore, RegistryConfig, RetryPolicy, ServiceRegistry,
    SessionState,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const SERVICE: &str = "com.example.ExampleService";

// ============================================================================
// Helpers
// ============================================================================

fn fast_config() -> RegistryConfig {
    RegistryConfig::default()
        .with_operation_timeout(Duration::from_millis(200))
        .with_session_check_interval(Duration::from_millis(50))
        .with_watch_interval(Duration::from_millis(50))
        .with_retry(
            RetryPolicy::default()
                .with_base_delay(Duration::from_millis(20))
                .with_max_delay(Duration::from_millis(100)),
        )
}

fn endpoint(version: &str, host: &str, port: u16) -> ServiceEndpoint {
    ServiceEndpoint::new(SERVICE, version, ServiceAddress::new(host, port))
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

// ============================================================================
// In-memory backend
// ============================================================================

#[tokio::test]
async fn test_register_then_discover() {
    let store = CoordinationStore::new();
    let provider = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    let consumer = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();

    let path = provider.register(&endpoint("1.0", "127.0.0.1", 20880)).await.unwrap();
    assert_eq!(path, format!("/my-rpc/{}/1.0/address-0000000000", SERVICE));

    assert_eq!(consumer.discover(SERVICE, "1.0").await.unwrap(), "127.0.0.1:20880");
    assert_eq!(consumer.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_unknown_service_not_found() {
    let store = CoordinationStore::new();
    let consumer = ServiceRegistry::in_memory(store, fast_config()).await.unwrap();

    let err = consumer.discover(SERVICE, "1.0").await.unwrap_err();
    assert!(matches!(err, RpcError::ServiceNotFound { .. }));
}

#[tokio::test]
async fn test_other_version_not_found() {
    let store = CoordinationStore::new();
    let provider = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    provider.register(&endpoint("1.0", "127.0.0.1", 20880)).await.unwrap();

    let consumer = ServiceRegistry::in_memory(store, fast_config()).await.unwrap();
    let err = consumer.discover(SERVICE, "2.0").await.unwrap_err();
    match err {
        RpcError::ServiceNotFound { interface, version } => {
            assert_eq!(interface, SERVICE);
            assert_eq!(version, "2.0");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_default_version_path() {
    let store = CoordinationStore::new();
    let provider = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    provider.register(&endpoint("DEFAULT", "10.0.0.1", 9000)).await.unwrap();

    assert_eq!(
        store.get_children(&format!("/my-rpc/{}/DEFAULT", SERVICE)).unwrap(),
        vec!["address-0000000000"]
    );
}

#[tokio::test]
async fn test_close_removes_registrations() {
    let store = CoordinationStore::new();
    let provider = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    let consumer = ServiceRegistry::in_memory(store, fast_config()).await.unwrap();

    provider.register(&endpoint("1.0", "127.0.0.1", 20880)).await.unwrap();
    assert!(consumer.discover(SERVICE, "1.0").await.is_ok());

    provider.close().await;

    let err = consumer.discover(SERVICE, "1.0").await.unwrap_err();
    assert!(matches!(err, RpcError::ServiceNotFound { .. }));
}

#[tokio::test]
async fn test_outage_falls_back_to_cache() {
    let store = CoordinationStore::new();
    let provider = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    let consumer = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();

    provider.register(&endpoint("1.0", "127.0.0.1", 20880)).await.unwrap();
    assert_eq!(consumer.discover(SERVICE, "1.0").await.unwrap(), "127.0.0.1:20880");

    store.set_available(false);

    assert_eq!(consumer.discover(SERVICE, "1.0").await.unwrap(), "127.0.0.1:20880");
}

#[tokio::test]
async fn test_outage_without_cache_is_not_found() {
    let store = CoordinationStore::new();
    let provider = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    let consumer = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    provider.register(&endpoint("1.0", "127.0.0.1", 20880)).await.unwrap();

    store.set_available(false);

    let err = consumer.discover(SERVICE, "1.0").await.unwrap_err();
    assert!(matches!(err, RpcError::ServiceNotFound { .. }));
}

#[tokio::test]
async fn test_cache_follows_membership_changes() {
    let store = CoordinationStore::new();
    let first = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    let consumer = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();

    first.register(&endpoint("1.0", "10.0.0.1", 9000)).await.unwrap();
    assert_eq!(consumer.discover(SERVICE, "1.0").await.unwrap(), "10.0.0.1:9000");

    let second = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    second.register(&endpoint("1.0", "10.0.0.2", 9000)).await.unwrap();
    first.close().await;

    // The refreshed cache must hold only the new provider.
    assert_eq!(consumer.discover(SERVICE, "1.0").await.unwrap(), "10.0.0.2:9000");
    store.set_available(false);
    for _ in 0..20 {
        assert_eq!(consumer.discover(SERVICE, "1.0").await.unwrap(), "10.0.0.2:9000");
    }
}

#[tokio::test]
async fn test_random_distribution() {
    let store = CoordinationStore::new();
    let mut providers = Vec::new();
    for port in [9001, 9002, 9003] {
        let provider = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
        provider.register(&endpoint("1.0", "127.0.0.1", port)).await.unwrap();
        providers.push(provider);
    }
    let consumer = ServiceRegistry::in_memory(store, fast_config()).await.unwrap();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for _ in 0..3000 {
        *counts.entry(consumer.discover(SERVICE, "1.0").await.unwrap()).or_default() += 1;
    }

    assert_eq!(counts.len(), 3);
    for (addr, count) in counts {
        assert!(
            (800..=1200).contains(&count),
            "{} picked {} times out of 3000",
            addr,
            count
        );
    }
}

#[tokio::test]
async fn test_session_loss_reannounces() {
    let store = CoordinationStore::new();
    let provider = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    let consumer = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    provider.register(&endpoint("1.0", "127.0.0.1", 20880)).await.unwrap();

    for session in store.session_ids() {
        store.expire_session(session);
    }
    assert!(store
        .get_children(&format!("/my-rpc/{}/1.0", SERVICE))
        .unwrap()
        .is_empty());

    eventually(|| async { consumer.discover(SERVICE, "1.0").await.is_ok() }).await;
    assert_eq!(consumer.discover(SERVICE, "1.0").await.unwrap(), "127.0.0.1:20880");
    assert_eq!(provider.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_start_fails_when_unavailable() {
    let store = CoordinationStore::new();
    store.set_available(false);

    let result = ServiceRegistry::in_memory(store, fast_config()).await;
    assert!(matches!(result, Err(RpcError::Coordination(_))));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let result = ServiceRegistry::in_memory(
        CoordinationStore::new(),
        fast_config().with_root("relative"),
    )
    .await;
    assert!(matches!(result, Err(RpcError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_watch_publishes_changes() {
    let store = CoordinationStore::new();
    let consumer = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    let mut addresses = consumer.watch(SERVICE, "1.0");
    assert!(addresses.borrow().is_empty());

    let first = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    first.register(&endpoint("1.0", "10.0.0.1", 9000)).await.unwrap();
    let second = ServiceRegistry::in_memory(store.clone(), fast_config()).await.unwrap();
    second.register(&endpoint("1.0", "10.0.0.2", 9000)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            addresses.changed().await.unwrap();
            if addresses.borrow().len() == 2 {
                break;
            }
        }
    })
    .await
    .unwrap();

    let seen: HashSet<String> = addresses.borrow().iter().cloned().collect();
    assert!(seen.contains("10.0.0.1:9000"));
    assert!(seen.contains("10.0.0.2:9000"));

    first.close().await;
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            addresses.changed().await.unwrap();
            if addresses.borrow().len() == 1 {
                break;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(*addresses.borrow(), vec!["10.0.0.2:9000".to_string()]);
}

// ============================================================================
// Networked backend
// ============================================================================

async fn spawn_coordination_server(store: CoordinationStore) -> String {
    let server = CoordinationServer::bind("127.0.0.1:0", store).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let _ = server.run(std::future::pending()).await;
    });
    addr
}

/// A hand-driven coordination session: sends requests and reads replies.
struct RawSession {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    codec: MessageCodec,
}

impl RawSession {
    async fn open(addr: &str) -> Self {
        let (read_half, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader: FrameReader::new(read_half, FrameConfig::default()),
            writer,
            codec: MessageCodec::default(),
        }
    }

    async fn call(&mut self, request: CoordinationRequest) -> CoordinationReply {
        let frame = self.codec.encode(&request).unwrap();
        write_frame(&mut self.writer, &frame).await.unwrap();
        let payload = self.reader.next_frame().await.unwrap().unwrap();
        self.codec.serializer().deserialize(&payload).unwrap()
    }
}

#[tokio::test]
async fn test_remote_register_and_discover() {
    let store = CoordinationStore::new();
    let addr = spawn_coordination_server(store.clone()).await;

    let provider = ServiceRegistry::connect(&addr, fast_config()).await.unwrap();
    let consumer = ServiceRegistry::connect(&addr, fast_config()).await.unwrap();

    provider.register(&endpoint("1.0", "127.0.0.1", 20880)).await.unwrap();
    assert_eq!(consumer.discover(SERVICE, "1.0").await.unwrap(), "127.0.0.1:20880");
    assert!(matches!(
        consumer.discover(SERVICE, "2.0").await,
        Err(RpcError::ServiceNotFound { .. })
    ));
}

#[tokio::test]
async fn test_remote_session_ends_with_provider() {
    let store = CoordinationStore::new();
    let addr = spawn_coordination_server(store.clone()).await;

    let provider = ServiceRegistry::connect(&addr, fast_config()).await.unwrap();
    provider.register(&endpoint("1.0", "127.0.0.1", 20880)).await.unwrap();
    let path = format!("/my-rpc/{}/1.0", SERVICE);
    assert_eq!(store.get_children(&path).unwrap().len(), 1);

    drop(provider);

    eventually(|| async { store.get_children(&path).unwrap().is_empty() }).await;
}

#[tokio::test]
async fn test_remote_unreachable_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let config = fast_config().with_retry(
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(10))
            .with_max_retries(1),
    );
    let result = ServiceRegistry::connect(&addr, config).await;
    assert!(matches!(result, Err(RpcError::Coordination(_))));
}

#[tokio::test]
async fn test_silent_session_expires_after_timeout() {
    let store = CoordinationStore::new();
    let addr = spawn_coordination_server(store.clone()).await;

    let mut session = RawSession::open(&addr).await;
    assert_eq!(
        session.call(CoordinationRequest::Connect { session_timeout_ms: 300 }).await,
        CoordinationReply::Connected { session_timeout_ms: 300 }
    );
    let created = session
        .call(CoordinationRequest::CreateEphemeralSequential {
            path_prefix: format!("/my-rpc/{}/1.0/address-", SERVICE),
            data: b"10.0.0.9:20880".to_vec(),
        })
        .await;
    assert!(matches!(created, CoordinationReply::Created { .. }));

    let path = format!("/my-rpc/{}/1.0", SERVICE);
    assert_eq!(store.get_children(&path).unwrap().len(), 1);

    // The socket stays open but nothing more is sent.
    eventually(|| async { store.get_children(&path).unwrap().is_empty() }).await;
    assert!(store.session_ids().is_empty());
    drop(session);
}

#[tokio::test]
async fn test_server_default_timeout_applies_before_connect() {
    let store = CoordinationStore::new();
    let server = CoordinationServer::bind("127.0.0.1:0", store.clone())
        .await
        .unwrap()
        .with_session_timeout(Duration::from_millis(200));
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let _ = server.run(std::future::pending()).await;
    });

    let session = RawSession::open(&addr).await;
    eventually(|| async { store.session_ids().len() == 1 }).await;
    eventually(|| async { store.session_ids().is_empty() }).await;
    drop(session);
}

#[tokio::test]
async fn test_pinged_session_outlives_timeout() {
    let store = CoordinationStore::new();
    let addr = spawn_coordination_server(store.clone()).await;

    let config = fast_config().with_session_timeout(Duration::from_millis(300));
    let provider = ServiceRegistry::connect(&addr, config).await.unwrap();
    provider.register(&endpoint("1.0", "127.0.0.1", 20880)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;

    let path = format!("/my-rpc/{}/1.0", SERVICE);
    assert_eq!(store.get_children(&path).unwrap().len(), 1);
    assert_eq!(provider.state(), SessionState::Connected);
}
