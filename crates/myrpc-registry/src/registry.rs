use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use myrpc_common::{service_key, Result, RpcError, ServiceEndpoint};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::{CachedService, DiscoveryCache};
use crate::config::{RegistryConfig, ADDRESS_NODE_PREFIX};
use crate::coordinator::{join_path, Coordinator, CoordinatorFactory};
use crate::error::CoordinationError;
use crate::memory::CoordinationStore;
use crate::remote::RemoteConnector;

/// Connection state of the registry session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Outcome of reading a service's node set from the registry.
enum Lookup {
    /// The registry answered; the addresses it holds (possibly none).
    Found(Arc<CachedService>),
    /// The registry answered that nothing is registered.
    Missing,
    /// The registry could not be asked.
    Unreachable(CoordinationError),
}

/// A local registration and the session generation it was last announced on.
struct Registration {
    endpoint: ServiceEndpoint,
    generation: u64,
}

struct Inner {
    factory: Arc<dyn CoordinatorFactory>,
    config: RegistryConfig,
    session: RwLock<Option<Arc<dyn Coordinator>>>,
    /// Bumped under the `session` write lock each time a session is installed.
    generation: AtomicU64,
    state: watch::Sender<SessionState>,
    /// Held across announcing, so `register` and `reannounce` never both
    /// announce one endpoint on the same session.
    registrations: tokio::sync::Mutex<Vec<Registration>>,
    cache: DiscoveryCache,
    closed: AtomicBool,
}

/// Service registration and discovery over a coordination service.
///
/// Providers call [`register`](Self::register) once per exposed service; the
/// entry lives exactly as long as the registry session. Consumers call
/// [`discover`](Self::discover) per invocation and get one address picked
/// uniformly at random.
///
/// A background monitor pings the session. When it is lost the monitor
/// reconnects with backoff and announces every local registration again.
///
/// # Example
///
/// ```no_run
/// use myrpc_common::{ServiceAddress, ServiceEndpoint};
/// use myrpc_registry::{RegistryConfig, ServiceRegistry};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = ServiceRegistry::connect("127.0.0.1:2181", RegistryConfig::default()).await?;
///
/// registry
///     .register(&ServiceEndpoint::new(
///         "com.example.ExampleService",
///         "1.0",
///         ServiceAddress::new("127.0.0.1", 20880),
///     ))
///     .await?;
///
/// let addr = registry.discover("com.example.ExampleService", "1.0").await?;
/// assert_eq!(addr, "127.0.0.1:20880");
/// # Ok(())
/// # }
/// ```
pub struct ServiceRegistry {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ServiceRegistry {
    /// Connects to a networked coordination server at `addr`.
    pub async fn connect(addr: &str, config: RegistryConfig) -> Result<Self> {
        let factory = RemoteConnector::new(addr, &config);
        Self::start(Arc::new(factory), config).await
    }

    /// Uses an in-process store, sharing it with anyone else holding a
    /// handle to it.
    pub async fn in_memory(store: CoordinationStore, config: RegistryConfig) -> Result<Self> {
        Self::start(Arc::new(store), config).await
    }

    /// Opens the first session (retrying per the configured policy) and
    /// starts the session monitor.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a bad configuration, `Coordination` if no session
    /// could be established.
    pub async fn start(factory: Arc<dyn CoordinatorFactory>, config: RegistryConfig) -> Result<Self> {
        config.validate()?;

        let (state, _) = watch::channel(SessionState::Disconnected);
        let inner = Arc::new(Inner {
            factory,
            config,
            session: RwLock::new(None),
            generation: AtomicU64::new(0),
            state,
            registrations: tokio::sync::Mutex::new(Vec::new()),
            cache: DiscoveryCache::new(),
            closed: AtomicBool::new(false),
        });

        inner.establish().await?;
        tracing::info!(target = %inner.factory.describe(), "registry session established");

        let monitor = tokio::spawn(Arc::clone(&inner).monitor());
        Ok(Self {
            inner,
            tasks: Mutex::new(vec![monitor]),
        })
    }

    /// Publishes `endpoint` as an ephemeral sequential node under
    /// `{root}/{interface}/{version}/address-`. Returns the created path.
    ///
    /// The endpoint is remembered and announced again after a reconnect.
    pub async fn register(&self, endpoint: &ServiceEndpoint) -> Result<String> {
        let mut registrations = self.inner.registrations.lock().await;
        let (path, generation) = self.inner.announce(endpoint).await?;
        registrations.push(Registration {
            endpoint: endpoint.clone(),
            generation,
        });
        drop(registrations);

        tracing::info!(
            interface = %endpoint.interface_name,
            version = %endpoint.version,
            address = %endpoint.address,
            path = %path,
            "service registered"
        );
        Ok(path)
    }

    /// Returns one `host:port` providing `interface` at `version`.
    ///
    /// If the registry cannot be reached in time, the last known address set
    /// is used instead.
    ///
    /// # Errors
    ///
    /// `ServiceNotFound` if nothing is registered, or if the registry is
    /// unreachable and no addresses were ever seen.
    pub async fn discover(&self, interface: &str, version: &str) -> Result<String> {
        let key = service_key(interface, version);

        let service = match self.inner.lookup(interface, version).await {
            Lookup::Found(service) => service,
            Lookup::Missing => return Err(RpcError::service_not_found(interface, version)),
            Lookup::Unreachable(e) => match self.inner.cache.get(&key) {
                Some(cached) => {
                    tracing::warn!(
                        service = %key,
                        error = %e,
                        "registry unreachable, using cached addresses"
                    );
                    cached
                }
                None => {
                    tracing::warn!(service = %key, error = %e, "registry unreachable and no cached addresses");
                    return Err(RpcError::service_not_found(interface, version));
                }
            },
        };

        service
            .pick()
            .cloned()
            .ok_or_else(|| RpcError::service_not_found(interface, version))
    }

    /// Follows the address set of a service.
    ///
    /// A background task polls the registry every `watch_interval` and
    /// publishes the set whenever it changes. It stops when the receiver is
    /// dropped or the registry is closed.
    pub fn watch(&self, interface: &str, version: &str) -> watch::Receiver<Vec<String>> {
        let key = service_key(interface, version);
        let initial = self
            .inner
            .cache
            .get(&key)
            .map(|cached| cached.addresses.clone())
            .unwrap_or_default();
        let (tx, rx) = watch::channel(initial);

        let inner = Arc::clone(&self.inner);
        let interface = interface.to_string();
        let version = version.to_string();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.config.watch_interval);
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = interval.tick() => {}
                }
                if inner.closed.load(Ordering::SeqCst) {
                    break;
                }

                let addresses = match inner.lookup(&interface, &version).await {
                    Lookup::Found(service) => service.addresses.clone(),
                    Lookup::Missing => Vec::new(),
                    Lookup::Unreachable(_) => continue,
                };
                tx.send_if_modified(|current| {
                    if *current == addresses {
                        false
                    } else {
                        *current = addresses;
                        true
                    }
                });
            }
            tracing::debug!(service = %service_key(&interface, &version), "watch stopped");
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
        rx
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Ends the session; every endpoint registered through it disappears.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let session = self.inner.session.write().take();
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                tracing::debug!(error = %e, "error closing registry session");
            }
        }
        self.inner.state.send_replace(SessionState::Disconnected);
        tracing::info!("registry closed");
    }
}

impl Drop for ServiceRegistry {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl Inner {
    fn current_session(&self) -> Option<Arc<dyn Coordinator>> {
        self.session.read().clone()
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn service_path(&self, interface: &str, version: &str) -> String {
        join_path(&[&self.config.root, interface, version])
    }

    /// Runs one coordinator operation bounded by `operation_timeout`.
    async fn bounded<T, Fut>(&self, op: Fut) -> std::result::Result<T, CoordinationError>
    where
        Fut: Future<Output = std::result::Result<T, CoordinationError>>,
    {
        let timeout = self.config.operation_timeout;
        tokio::time::timeout(timeout, op)
            .await
            .unwrap_or(Err(CoordinationError::Timeout(timeout.as_millis() as u64)))
    }

    /// Connects with backoff and installs the new session.
    async fn establish(&self) -> Result<()> {
        self.state.send_replace(SessionState::Connecting);
        let connect_timeout = self.config.connect_timeout;
        let factory = &self.factory;
        let connected = self
            .config
            .retry
            .retry("registry connect", || async move {
                tokio::time::timeout(connect_timeout, factory.connect())
                    .await
                    .unwrap_or(Err(CoordinationError::Timeout(connect_timeout.as_millis() as u64)))
            })
            .await;

        match connected {
            Ok(session) => {
                {
                    let mut slot = self.session.write();
                    *slot = Some(session);
                    self.generation.fetch_add(1, Ordering::SeqCst);
                }
                self.state.send_replace(SessionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.state.send_replace(SessionState::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Creates the endpoint's node on the current session. Returns the node
    /// path and the session's generation.
    async fn announce(&self, endpoint: &ServiceEndpoint) -> Result<(String, u64)> {
        let (session, generation) = {
            let slot = self.session.read();
            (slot.clone(), self.current_generation())
        };
        let session =
            session.ok_or_else(|| RpcError::Coordination("registry session is not connected".to_string()))?;

        let prefix = format!(
            "{}/{}",
            self.service_path(&endpoint.interface_name, &endpoint.version),
            ADDRESS_NODE_PREFIX
        );
        let data = endpoint.address.to_string();

        let path = self
            .bounded(session.create_ephemeral_sequential(&prefix, data.as_bytes()))
            .await?;
        Ok((path, generation))
    }

    /// Lists the service's nodes and refreshes the cache when the node set
    /// changed.
    async fn lookup(&self, interface: &str, version: &str) -> Lookup {
        let key = service_key(interface, version);
        let path = self.service_path(interface, version);

        let Some(session) = self.current_session() else {
            return Lookup::Unreachable(CoordinationError::Unavailable(
                "registry session is not connected".to_string(),
            ));
        };

        let children = match self.bounded(session.get_children(&path)).await {
            Ok(children) => children,
            Err(CoordinationError::NoNode(_)) => {
                self.cache.remove(&key);
                return Lookup::Missing;
            }
            Err(e) => return Lookup::Unreachable(e),
        };

        if children.is_empty() {
            self.cache.remove(&key);
            return Lookup::Missing;
        }

        let nodes: BTreeSet<String> = children.into_iter().collect();
        if self.cache.is_current(&key, &nodes) {
            if let Some(cached) = self.cache.get(&key) {
                return Lookup::Found(cached);
            }
        }

        let reads = nodes.iter().map(|node| {
            let node_path = format!("{}/{}", path, node);
            let session = Arc::clone(&session);
            async move { self.bounded(session.get_data(&node_path)).await }
        });
        let results = futures::future::join_all(reads).await;

        let mut addresses = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(data) => match String::from_utf8(data) {
                    Ok(address) => addresses.push(address),
                    Err(_) => tracing::warn!(service = %key, "skipping registry node with non-UTF-8 data"),
                },
                // Removed between listing and reading.
                Err(CoordinationError::NoNode(_)) => {}
                Err(e) => return Lookup::Unreachable(e),
            }
        }

        if addresses.is_empty() {
            self.cache.remove(&key);
            return Lookup::Missing;
        }

        tracing::debug!(service = %key, addresses = ?addresses, "discovery cache refreshed");
        Lookup::Found(self.cache.replace(&key, CachedService { nodes, addresses }))
    }

    /// Pings the session and rebuilds it when it is lost.
    async fn monitor(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.session_check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            let healthy = match self.current_session() {
                Some(session) => match self.bounded(session.ping()).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "registry session lost");
                        false
                    }
                },
                None => false,
            };
            if healthy {
                continue;
            }

            self.state.send_replace(SessionState::Disconnected);
            let stale = self.session.write().take();
            if let Some(stale) = stale {
                // Drop the old session's nodes so re-announcing does not duplicate them.
                let _ = self.bounded(stale.close()).await;
            }

            if let Err(e) = self.establish().await {
                tracing::error!(error = %e, "registry reconnect failed, will retry");
                continue;
            }
            tracing::info!("registry session re-established");
            self.reannounce().await;
        }
    }

    /// Announces every registration not yet present on the current session.
    async fn reannounce(&self) {
        let mut registrations = self.registrations.lock().await;
        let current = self.current_generation();
        for registration in registrations.iter_mut() {
            if registration.generation == current {
                continue;
            }
            let endpoint = &registration.endpoint;
            match self.announce(endpoint).await {
                Ok((path, generation)) => {
                    registration.generation = generation;
                    tracing::info!(path = %path, "service re-registered");
                }
                Err(e) => tracing::error!(
                    interface = %endpoint.interface_name,
                    version = %endpoint.version,
                    error = %e,
                    "failed to re-register service"
                ),
            }
        }
    }
}
