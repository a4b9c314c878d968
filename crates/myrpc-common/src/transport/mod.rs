//! MyRPC Transport Layer
//!
//! Length-prefixed TCP framing, payload serialization and request/response
//! correlation.
//!
//! # Architecture
//!
//! - **Transport**: long-lived TCP connections carrying many concurrent calls
//! - **Codec**: JSON serialization for protocol messages
//! - **Wire Format**: `[4-byte length as i32 big-endian] + [JSON data]`
//!
//! # Components
//!
//! - **[`Serializer`]** / **[`JsonCodec`]** / **[`Codec`]**: payload encoding
//! - **[`FrameDecoder`]** / **[`MessageCodec`]** / **[`FrameReader`]**: framing
//! - **[`Correlator`]** / **[`PendingCall`]**: matching responses to callers
//! - **[`Connection`]**: client-side multiplexed connection
//! - **[`TcpServer`]**: accept loop used by providers and the coordination server
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use myrpc_common::transport::{Connection, ConnectionConfig};
//! use myrpc_common::protocol::Request;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = Connection::connect("127.0.0.1:20880", ConnectionConfig::default()).await?;
//! let request = Request::new("com.example.ExampleService", "ping");
//! let response = conn.send(&request).await?.wait(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod correlator;
pub mod frame;
pub mod tcp;
pub mod tcp_server;

pub use codec::{Codec, JsonCodec, Serializer};
pub use correlator::{Correlator, PendingCall};
pub use frame::{
    encode_frame, write_frame, FrameConfig, FrameDecoder, FrameReader, MessageCodec,
    DEFAULT_MAX_FRAME_LENGTH, LENGTH_FIELD_LEN,
};
pub use tcp::{spawn_writer, Connection, ConnectionConfig, DEFAULT_CONNECT_TIMEOUT};
pub use tcp_server::TcpServer;
