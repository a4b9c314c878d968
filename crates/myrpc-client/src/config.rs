use std::time::Duration;

use myrpc_common::transport::{ConnectionConfig, FrameConfig, DEFAULT_CONNECT_TIMEOUT};
use myrpc_common::{Result, RpcError};

/// Default per-call deadline (30 seconds)
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration.
///
/// # Default Configuration
///
/// - `call_timeout`: 30 seconds
/// - `connect_timeout`: 5 seconds
/// - `frame`: 16 MB maximum frame length
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use myrpc_client::ClientConfig;
///
/// let config = ClientConfig::default().with_call_timeout(Duration::from_secs(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for a single call, from send to response
    pub call_timeout: Duration,
    /// Timeout for establishing a connection to a provider
    pub connect_timeout: Duration,
    /// Framing limits
    pub frame: FrameConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            frame: FrameConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.call_timeout.is_zero() {
            return Err(RpcError::InvalidRequest(
                "call_timeout must be greater than 0".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(RpcError::InvalidRequest(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }
        self.frame.validate()
    }

    pub(crate) fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: self.connect_timeout,
            frame: self.frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_config_zero_timeout() {
        let config = ClientConfig::default().with_call_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_config() {
        let config = ClientConfig::default().with_connect_timeout(Duration::from_millis(250));
        assert_eq!(config.connection().connect_timeout, Duration::from_millis(250));
    }
}
