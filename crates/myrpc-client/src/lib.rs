//! MyRPC Client
//!
//! - [`RpcClient`] sends requests over one cached, multiplexed connection per
//!   provider address
//! - [`ProxyFactory`] / [`ServiceProxy`] / [`RemoteService`] turn method calls
//!   on a typed adapter into discovery plus an RPC call

pub mod client;
pub mod config;
pub mod pool;
pub mod proxy;

pub use client::RpcClient;
pub use config::{ClientConfig, DEFAULT_CALL_TIMEOUT};
pub use pool::ConnectionCache;
pub use proxy::{ProxyFactory, RemoteService, ServiceProxy};
