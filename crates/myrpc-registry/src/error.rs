use myrpc_common::RpcError;
use thiserror::Error;

/// Failures reported by a coordination backend.
///
/// These never escape discovery: an unreachable registry falls back to the
/// cached addresses. Registration failures surface as
/// [`RpcError::Coordination`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("coordination service unavailable: {0}")]
    Unavailable(String),

    #[error("no node: {0}")]
    NoNode(String),

    #[error("coordination operation timed out after {0}ms")]
    Timeout(u64),

    #[error("session expired")]
    SessionExpired,

    #[error("coordination protocol error: {0}")]
    Protocol(String),
}

impl CoordinationError {
    /// Errors that say nothing about the data, only about reachability.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoordinationError::Unavailable(_)
                | CoordinationError::Timeout(_)
                | CoordinationError::SessionExpired
        )
    }
}

impl From<CoordinationError> for RpcError {
    fn from(err: CoordinationError) -> Self {
        RpcError::Coordination(err.to_string())
    }
}

impl From<RpcError> for CoordinationError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Timeout(ms) => CoordinationError::Timeout(ms),
            RpcError::Protocol(msg) => CoordinationError::Protocol(msg),
            RpcError::Serialization(e) => CoordinationError::Protocol(e.to_string()),
            other => CoordinationError::Unavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordinationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(CoordinationError::Unavailable("down".into()).is_transient());
        assert!(CoordinationError::Timeout(10).is_transient());
        assert!(CoordinationError::SessionExpired.is_transient());
        assert!(!CoordinationError::NoNode("/x".into()).is_transient());
        assert!(!CoordinationError::Protocol("bad".into()).is_transient());
    }

    #[test]
    fn test_conversion_to_rpc_error() {
        let err: RpcError = CoordinationError::Unavailable("down".into()).into();
        assert!(matches!(err, RpcError::Coordination(_)));
    }

    #[test]
    fn test_conversion_from_rpc_error() {
        assert_eq!(
            CoordinationError::from(RpcError::Timeout(5)),
            CoordinationError::Timeout(5)
        );
        assert!(matches!(
            CoordinationError::from(RpcError::ConnectionClosed),
            CoordinationError::Unavailable(_)
        ));
    }
}
