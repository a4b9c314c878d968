//! MyRPC Response Types
//!
//! This module defines the RPC response structure.

use serde::{Deserialize, Serialize};
use super::RequestId;

/// RPC method result (JSON value)
pub type RpcResult = serde_json::Value;

/// An RPC response returned from a provider to the client.
///
/// # Response Flow
///
/// 1. Provider receives and dispatches a `Request`
/// 2. Provider creates a `Response` carrying the same `request_id`
/// 3. Response is serialized and written back on the same connection
/// 4. The client's correlator hands it to the waiting caller
///
/// # Fields
///
/// - `request_id`: The id of the originating request
/// - `result`: The return value, absent for void methods and failures
/// - `error`: Failure message, absent on success
///
/// Exactly one of `result` and `error` is meaningful. A response with neither
/// is a successful call to a method returning nothing.
///
/// # Example
///
/// ```
/// use myrpc_common::protocol::Response;
/// use serde_json::json;
///
/// let ok = Response::success("req-1", json!("Hello, World (3)"));
/// assert!(!ok.is_error());
///
/// let failed = Response::error("req-2", "service not found");
/// assert!(failed.is_error());
/// assert!(failed.result.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Request identifier this response corresponds to
    pub request_id: RequestId,
    /// Result value (present on non-void success)
    #[serde(default)]
    pub result: Option<RpcResult>,
    /// Error message (present on failure)
    #[serde(default)]
    pub error: Option<String>,
}

impl Response {
    /// Creates a successful response carrying a value.
    pub fn success(request_id: impl Into<RequestId>, result: RpcResult) -> Self {
        Response {
            request_id: request_id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Creates a successful response for a method that returns nothing.
    pub fn empty(request_id: impl Into<RequestId>) -> Self {
        Response {
            request_id: request_id.into(),
            result: None,
            error: None,
        }
    }

    /// Creates an error response.
    pub fn error(request_id: impl Into<RequestId>, error: impl Into<String>) -> Self {
        Response {
            request_id: request_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
