//! Messages of the networked coordination backend.
//!
//! Each TCP connection is one session. Requests and replies are JSON payloads
//! in the same length-prefixed frames the RPC transport uses, strictly
//! alternating: one reply per request, in order.
//!
//! A client opens with `Connect`, naming its session timeout. The server
//! expires the session once it hears nothing for that long, so clients ping
//! well within it.

use serde::{Deserialize, Serialize};

use crate::error::CoordinationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CoordinationRequest {
    Connect { session_timeout_ms: u64 },
    CreateEphemeralSequential { path_prefix: String, data: Vec<u8> },
    GetChildren { path: String },
    GetData { path: String },
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unavailable,
    NoNode,
    Timeout,
    SessionExpired,
    Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CoordinationReply {
    Connected { session_timeout_ms: u64 },
    Created { path: String },
    Children { names: Vec<String> },
    Data { data: Vec<u8> },
    Pong,
    Error { kind: ErrorKind, message: String },
}

impl CoordinationReply {
    pub fn error(err: &CoordinationError) -> Self {
        let (kind, message) = match err {
            CoordinationError::Unavailable(msg) => (ErrorKind::Unavailable, msg.clone()),
            CoordinationError::NoNode(path) => (ErrorKind::NoNode, path.clone()),
            CoordinationError::Timeout(ms) => (ErrorKind::Timeout, ms.to_string()),
            CoordinationError::SessionExpired => (ErrorKind::SessionExpired, String::new()),
            CoordinationError::Protocol(msg) => (ErrorKind::Protocol, msg.clone()),
        };
        CoordinationReply::Error { kind, message }
    }

    /// Turns an `Error` reply back into the error it carries.
    pub fn into_result(self) -> Result<Self, CoordinationError> {
        match self {
            CoordinationReply::Error { kind, message } => Err(match kind {
                ErrorKind::Unavailable => CoordinationError::Unavailable(message),
                ErrorKind::NoNode => CoordinationError::NoNode(message),
                ErrorKind::Timeout => match message.parse() {
                    Ok(ms) => CoordinationError::Timeout(ms),
                    Err(_) => CoordinationError::Protocol(format!("malformed timeout reply: {:?}", message)),
                },
                ErrorKind::SessionExpired => CoordinationError::SessionExpired,
                ErrorKind::Protocol => CoordinationError::Protocol(message),
            }),
            reply => Ok(reply),
        }
    }
}

pub(crate) fn unexpected(reply: CoordinationReply) -> CoordinationError {
    CoordinationError::Protocol(format!("unexpected reply: {:?}", reply))
}
