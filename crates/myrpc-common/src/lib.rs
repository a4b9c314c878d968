//! MyRPC Common Types and Transport
//!
//! This crate provides the protocol definitions and TCP transport layer shared
//! by every MyRPC component.
//!
//! # Overview
//!
//! MyRPC is a service-oriented RPC framework: providers register their
//! address under an interface and version in a coordination registry,
//! consumers discover an address, pick one at random and call methods on it
//! over a multiplexed TCP connection.
//!
//! - **Protocol Layer**: Request/Response, endpoints and the error taxonomy
//! - **Transport Layer**: framing, JSON serialization, correlation and TCP
//!
//! # Architecture
//!
//! - **Transport**: TCP, one long-lived connection per provider address
//! - **Serialization**: JSON
//! - **Message Format**: `[4-byte length as i32 big-endian] + [JSON data]`
//! - **Max Message Size**: 16 MB by default (configurable)
//!
//! # Components
//!
//! - [`protocol`] - Core protocol types (Request, Response, RpcError)
//! - [`transport`] - Codec, framing, correlator and TCP transport
//!
//! # Example
//!
//! ```
//! use myrpc_common::{Request, Response};
//! use serde_json::json;
//!
//! let request = Request::new("com.example.ExampleService", "sayHello")
//!     .with_arg("string", json!("World"))
//!     .with_arg("int", json!(3))
//!     .with_version("1.0");
//!
//! let response = Response::success(request.request_id.clone(), json!("Hello, World (3)"));
//! assert_eq!(response.request_id, request.request_id);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
