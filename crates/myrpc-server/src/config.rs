//! Provider configuration.
//!
//! This module provides the settings an [`RpcServer`](crate::RpcServer) is
//! started with: where to listen, which host to advertise in the registry and
//! how many service calls may run at once.

use myrpc_common::transport::FrameConfig;
use myrpc_common::{Result, RpcError};

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:20880";

/// Default host published in the registry
pub const DEFAULT_ADVERTISE_HOST: &str = "127.0.0.1";

/// Default number of service calls allowed to run concurrently
pub const DEFAULT_WORKER_THREADS: usize = 200;

/// Provider configuration.
///
/// # Fields
///
/// - `bind_addr` - Listen address (default: `0.0.0.0:20880`, port 0 picks any port)
/// - `advertise_host` - Host consumers should connect to (default: `127.0.0.1`)
/// - `worker_threads` - Concurrent service calls (default: 200)
/// - `frame` - Framing limits (default: 16 MB maximum frame length)
///
/// The registry entry is always `advertise_host` joined with the port the
/// listener actually bound, so binding to port 0 still publishes a usable
/// address.
///
/// # Example
///
/// ```
/// use myrpc_server::ServerConfig;
///
/// let config = ServerConfig::new()
///     .with_bind_addr("127.0.0.1:0")
///     .with_advertise_host("10.0.0.7")
///     .with_worker_threads(16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind_addr: String,
    /// Host published in the registry next to the bound port
    pub advertise_host: String,
    /// Permits of the semaphore guarding the blocking pool
    pub worker_threads: usize,
    /// Framing limits
    pub frame: FrameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            advertise_host: DEFAULT_ADVERTISE_HOST.to_string(),
            worker_threads: DEFAULT_WORKER_THREADS,
            frame: FrameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Creates a new ServerConfig with default values.
    ///
    /// # Example
    ///
    /// ```
    /// use myrpc_server::ServerConfig;
    ///
    /// let config = ServerConfig::new();
    /// assert_eq!(config.bind_addr, "0.0.0.0:20880");
    /// assert_eq!(config.worker_threads, 200);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listen address.
    ///
    /// # Parameters
    ///
    /// * `bind_addr` - `host:port` to bind, e.g. `"0.0.0.0:20880"`
    pub fn with_bind_addr(mut self, bind_addr: impl Into<String>) -> Self {
        self.bind_addr = bind_addr.into();
        self
    }

    /// Sets the host published in the registry.
    ///
    /// # Parameters
    ///
    /// * `host` - Hostname or IPv4 address reachable by consumers
    pub fn with_advertise_host(mut self, host: impl Into<String>) -> Self {
        self.advertise_host = host.into();
        self
    }

    /// Sets how many service calls may run at the same time.
    ///
    /// Calls beyond this limit wait for a permit; while they wait, the
    /// connection they arrived on is not read further.
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if:
    /// - `bind_addr` is empty
    /// - `advertise_host` is empty or contains `:` (registry entries are
    ///   exactly `host:port`)
    /// - `worker_threads` is zero
    /// - the frame limits are invalid
    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.is_empty() {
            return Err(RpcError::InvalidRequest("bind_addr must not be empty".to_string()));
        }
        if self.advertise_host.is_empty() {
            return Err(RpcError::InvalidRequest(
                "advertise_host must not be empty".to_string(),
            ));
        }
        if self.advertise_host.contains(':') {
            return Err(RpcError::InvalidRequest(format!(
                "advertise_host must be a bare host, got {}",
                self.advertise_host
            )));
        }
        if self.worker_threads == 0 {
            return Err(RpcError::InvalidRequest(
                "worker_threads must be greater than 0".to_string(),
            ));
        }
        self.frame.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.advertise_host, DEFAULT_ADVERTISE_HOST);
        assert_eq!(config.worker_threads, DEFAULT_WORKER_THREADS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new()
            .with_bind_addr("127.0.0.1:0")
            .with_advertise_host("provider.local")
            .with_worker_threads(4)
            .with_frame_config(FrameConfig::default().with_max_frame_length(1024));

        assert_eq!(config.bind_addr, "127.0.0.1:0");
        assert_eq!(config.advertise_host, "provider.local");
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.frame.max_frame_length, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = ServerConfig::new().with_worker_threads(0);
        assert!(matches!(config.validate(), Err(RpcError::InvalidRequest(_))));
    }

    #[test]
    fn test_advertise_host_with_port_rejected() {
        let config = ServerConfig::new().with_advertise_host("127.0.0.1:20880");
        assert!(config.validate().is_err());

        let config = ServerConfig::new().with_advertise_host("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_bind_addr_rejected() {
        let config = ServerConfig::new().with_bind_addr("");
        assert!(config.validate().is_err());
    }
}
