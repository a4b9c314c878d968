use std::time::Duration;

use myrpc_common::transport::FrameConfig;
use myrpc_common::{Result, RpcError};

use crate::retry::RetryPolicy;

/// Default root under which every service is registered
pub const DEFAULT_ROOT: &str = "/my-rpc";

/// Session timeout used until a client names its own (5 seconds)
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Name prefix of the ephemeral sequential address nodes
pub const ADDRESS_NODE_PREFIX: &str = "address-";

/// Registry client configuration.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use myrpc_registry::RegistryConfig;
///
/// let config = RegistryConfig::default()
///     .with_root("/staging")
///     .with_operation_timeout(Duration::from_millis(500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root path of the registry tree
    ///
    /// Default: "/my-rpc"
    pub root: String,
    /// Session timeout announced to the coordination server when a session
    /// opens. The server expires a session that stays silent this long; it
    /// must exceed `session_check_interval` so the monitor's pings keep a
    /// healthy session alive.
    ///
    /// Default: 5s
    pub session_timeout: Duration,
    /// Timeout for establishing a session
    ///
    /// Default: 5s
    pub connect_timeout: Duration,
    /// Upper bound on a single registry read or write
    ///
    /// Default: 3s
    pub operation_timeout: Duration,
    /// How often the session monitor pings the coordination service
    ///
    /// Default: 1s
    pub session_check_interval: Duration,
    /// Poll interval of `ServiceRegistry::watch`
    ///
    /// Default: 2s
    pub watch_interval: Duration,
    /// Backoff applied when (re)connecting
    pub retry: RetryPolicy,
    /// Framing limits for the networked backend
    pub frame: FrameConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            connect_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(3),
            session_check_interval: Duration::from_secs(1),
            watch_interval: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            frame: FrameConfig::default(),
        }
    }
}

impl RegistryConfig {
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_session_check_interval(mut self, interval: Duration) -> Self {
        self.session_check_interval = interval;
        self
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the root is not absolute, any timeout or
    /// interval is zero, or the session would expire between two pings.
    pub fn validate(&self) -> Result<()> {
        if !self.root.starts_with('/') {
            return Err(RpcError::InvalidRequest(format!(
                "registry root must be an absolute path: {}",
                self.root
            )));
        }
        let durations = [
            ("session_timeout", self.session_timeout),
            ("connect_timeout", self.connect_timeout),
            ("operation_timeout", self.operation_timeout),
            ("session_check_interval", self.session_check_interval),
            ("watch_interval", self.watch_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(RpcError::InvalidRequest(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        if self.session_check_interval >= self.session_timeout {
            return Err(RpcError::InvalidRequest(format!(
                "session_check_interval ({:?}) must be shorter than session_timeout ({:?})",
                self.session_check_interval, self.session_timeout
            )));
        }
        self.retry.validate().map_err(RpcError::InvalidRequest)?;
        self.frame.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.root, "/my-rpc");
        assert_eq!(config.session_timeout, Duration::from_millis(5000));
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(config.retry.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relative_root_rejected() {
        let config = RegistryConfig::default().with_root("my-rpc");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_timeout_must_exceed_check_interval() {
        let config = RegistryConfig::default()
            .with_session_timeout(Duration::from_millis(500))
            .with_session_check_interval(Duration::from_millis(500));
        assert!(config.validate().is_err());

        let config = config.with_session_check_interval(Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = RegistryConfig::default().with_operation_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
