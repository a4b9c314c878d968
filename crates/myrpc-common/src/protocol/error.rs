use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    /// Malformed frame or undecodable payload. The connection that produced
    /// it is closed.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service not found: {interface}, version: {version}")]
    ServiceNotFound { interface: String, version: String },

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid service address format: {0}")]
    InvalidAddress(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The target method failed on the server. Only the message survives the
    /// wire.
    #[error("RPC Error: {0}")]
    RemoteInvocation(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Coordination error: {0}")]
    Coordination(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// Transport-level failures a caller may retry on another connection.
    ///
    /// Application errors (`ServiceNotFound`, `RemoteInvocation`, ...) are
    /// permanent for the request that produced them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RpcError::Connection(_) | RpcError::ConnectionClosed | RpcError::Timeout(_)
        )
    }

    pub fn service_not_found(interface: impl Into<String>, version: impl Into<String>) -> Self {
        RpcError::ServiceNotFound {
            interface: interface.into(),
            version: version.into(),
        }
    }
}

impl From<std::net::AddrParseError> for RpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        RpcError::InvalidAddress(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
