//! MyRPC Service Registry
//!
//! Registration and discovery of service providers through a coordination
//! service.
//!
//! # Layout
//!
//! Providers publish `host:port` under
//! `{root}/{interface}/{version}/address-{sequence}` as ephemeral sequential
//! nodes, so an entry disappears with the provider's session. Consumers list
//! the children of `{root}/{interface}/{version}`, resolve their data and pick
//! one address uniformly at random.
//!
//! # Components
//!
//! - [`ServiceRegistry`] - registration, discovery, watches and the session monitor
//! - [`Coordinator`] / [`CoordinatorFactory`] - the coordination service seam
//! - [`CoordinationStore`] - in-process backend
//! - [`CoordinationServer`] / [`RemoteConnector`] - networked backend
//! - [`DiscoveryCache`] - fallback addresses for when the registry is unreachable
//! - [`RetryPolicy`] - exponential backoff for (re)connection

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod registry;
pub mod remote;
pub mod retry;
pub mod server;

pub use cache::{CachedService, DiscoveryCache};
pub use config::{RegistryConfig, ADDRESS_NODE_PREFIX, DEFAULT_ROOT, DEFAULT_SESSION_TIMEOUT};
pub use coordinator::{Coordinator, CoordinatorFactory};
pub use error::CoordinationError;
pub use memory::{CoordinationStore, MemoryCoordinator, SessionId};
pub use registry::{ServiceRegistry, SessionState};
pub use remote::{RemoteConnector, RemoteCoordinator};
pub use retry::RetryPolicy;
pub use server::CoordinationServer;
