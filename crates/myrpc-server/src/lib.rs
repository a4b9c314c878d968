//! MyRPC Server
//!
//! This crate provides the provider side of MyRPC: service definitions built
//! from typed closures, the `interface#version` dispatch table and the TCP
//! server that registers its services and answers framed requests.

pub mod config;
pub mod dispatch;
pub mod server;
pub mod service;

pub use config::{ServerConfig, DEFAULT_ADVERTISE_HOST, DEFAULT_BIND_ADDR, DEFAULT_WORKER_THREADS};
pub use dispatch::{DispatchTable, SERVICE_NOT_FOUND};
pub use server::{RpcServer, RpcServerBuilder};
pub use service::{MethodHandler, ServiceDefinition, ServiceError, ServiceResult};
