//! RPC Server for MyRPC Providers
//!
//! This module provides the provider side of MyRPC: it listens for framed
//! requests, runs them against the [`DispatchTable`] and writes the responses
//! back on the same connection.
//!
//! # Architecture
//!
//! The server:
//! - Binds its listener first, so the registered address carries the real port
//! - Registers one endpoint per service at `advertise_host:port`
//! - Spawns a task per connection that reads frames and decodes requests
//! - Runs each request on the blocking pool, bounded by `worker_threads` permits
//! - Queues responses on a per-connection writer, in completion order
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use myrpc_registry::{RegistryConfig, ServiceRegistry};
//! use myrpc_server::{RpcServer, ServerConfig, ServiceDefinition};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ServiceRegistry::connect("127.0.0.1:2181", RegistryConfig::default()).await?);
//! let service = ServiceDefinition::new("com.example.ExampleService", "1.0")
//!     .method("sayHello", &["string", "int"], |(name, times): (String, i32)| {
//!         Ok(format!("Hello, {} ({})", name, times))
//!     });
//!
//! let server = RpcServer::builder(ServerConfig::default())
//!     .service(service)
//!     .start(registry)
//!     .await?;
//! server.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use myrpc_common::transport::tcp::OUTBOUND_QUEUE_CAPACITY;
use myrpc_common::transport::{spawn_writer, FrameConfig, FrameReader, MessageCodec, Serializer, TcpServer};
use myrpc_common::{Request, Response, Result, ServiceAddress, ServiceEndpoint};
use myrpc_registry::ServiceRegistry;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};

use crate::config::ServerConfig;
use crate::dispatch::DispatchTable;
use crate::service::ServiceDefinition;

/// Collects service definitions before the server starts.
pub struct RpcServerBuilder {
    config: ServerConfig,
    services: Vec<ServiceDefinition>,
}

impl RpcServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            services: Vec::new(),
        }
    }

    /// Adds a service to serve and register.
    pub fn service(mut self, service: ServiceDefinition) -> Self {
        self.services.push(service);
        self
    }

    /// Binds the listener, builds the dispatch table and registers every
    /// service with `registry`.
    ///
    /// Connections are not accepted until [`RpcServer::run`] is called;
    /// until then they queue in the listen backlog.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an invalid config or a service defined twice
    /// - `Connection` if the listener cannot bind
    /// - `Coordination` if a registration fails
    pub async fn start(self, registry: Arc<ServiceRegistry>) -> Result<RpcServer> {
        self.config.validate()?;

        let mut table = DispatchTable::new();
        for service in self.services {
            table.insert(service)?;
        }
        if table.is_empty() {
            tracing::warn!("no services to register");
        }

        let listener = TcpServer::bind(&self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let advertised = ServiceAddress::new(self.config.advertise_host.as_str(), local_addr.port());

        let mut registrations = Vec::with_capacity(table.len());
        for service in table.services() {
            let endpoint = ServiceEndpoint::new(service.interface_name(), service.version(), advertised.clone());
            let path = registry.register(&endpoint).await?;
            tracing::debug!(
                interface = %service.interface_name(),
                version = %service.version(),
                address = %advertised,
                path = %path,
                "service registered"
            );
            registrations.push(path);
        }

        Ok(RpcServer {
            workers: Arc::new(Semaphore::new(self.config.worker_threads)),
            config: self.config,
            listener,
            local_addr,
            advertised,
            table: Arc::new(table),
            registry,
            registrations,
        })
    }
}

/// A started provider.
pub struct RpcServer {
    config: ServerConfig,
    listener: TcpServer,
    local_addr: SocketAddr,
    advertised: ServiceAddress,
    table: Arc<DispatchTable>,
    workers: Arc<Semaphore>,
    registry: Arc<ServiceRegistry>,
    registrations: Vec<String>,
}

impl RpcServer {
    pub fn builder(config: ServerConfig) -> RpcServerBuilder {
        RpcServerBuilder::new(config)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address published in the registry.
    pub fn advertised_address(&self) -> &ServiceAddress {
        &self.advertised
    }

    /// Registry paths created at startup, one per service.
    pub fn registrations(&self) -> &[String] {
        &self.registrations
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Executes `request` on the calling thread, bypassing the network.
    pub fn dispatch(&self, request: Request) -> Response {
        self.table.dispatch(request)
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Registrations stay in place; they disappear when the registry session
    /// is closed.
    pub async fn run<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        tracing::info!(
            addr = %self.local_addr,
            advertised = %self.advertised,
            services = self.table.len(),
            "RPC server listening"
        );

        let table = Arc::clone(&self.table);
        let workers = Arc::clone(&self.workers);
        let frame = self.config.frame;

        self.listener
            .run_with_handler(
                move |stream, peer| {
                    serve_connection(stream, peer, Arc::clone(&table), Arc::clone(&workers), frame)
                },
                shutdown,
            )
            .await
    }
}

/// Reads requests from one connection until it closes.
///
/// A frame that is not a valid request gets an error response with an empty
/// request id; a malformed frame length ends the connection.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    table: Arc<DispatchTable>,
    workers: Arc<Semaphore>,
    frame: FrameConfig,
) -> Result<()> {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
    }

    let (read_half, write_half) = stream.into_split();
    let codec = MessageCodec::new(frame);
    let mut frames = FrameReader::new(read_half, frame);
    let (outbound, writer) = spawn_writer(write_half, OUTBOUND_QUEUE_CAPACITY);

    let outcome = loop {
        let payload = match frames.next_frame().await {
            Ok(Some(payload)) => payload,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };

        let request: Request = match codec.serializer().deserialize(&payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "undecodable request");
                let response = Response::error(String::new(), format!("invalid request: {}", e));
                send_response(codec, &outbound, response).await;
                continue;
            }
        };

        // Waiting here stops reading this connection while every worker is busy.
        let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
            break Ok(());
        };

        let table = Arc::clone(&table);
        let outbound = outbound.clone();
        tokio::spawn(async move {
            let request_id = request.request_id.clone();
            let response = match tokio::task::spawn_blocking(move || {
                let _permit = permit;
                table.dispatch(request)
            })
            .await
            {
                Ok(response) => response,
                Err(e) => Response::error(request_id, format!("service call aborted: {}", e)),
            };
            send_response(codec, &outbound, response).await;
        });
    };

    match &outcome {
        Ok(()) => {
            tracing::debug!(peer = %peer, "connection closed by peer");
            // In-flight calls still hold senders; the writer drains them.
            drop(outbound);
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(peer = %peer, error = %e, "response write failed"),
                Err(e) => tracing::debug!(peer = %peer, error = %e, "writer task stopped"),
            }
        }
        Err(e) => {
            tracing::error!(peer = %peer, error = %e, "closing connection");
            writer.abort();
        }
    }
    outcome
}

async fn send_response(codec: MessageCodec, outbound: &mpsc::Sender<Bytes>, response: Response) {
    let frame = match codec.encode(&response) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(request_id = %response.request_id, error = %e, "failed to encode response");
            match codec.encode(&Response::error(response.request_id.clone(), e.to_string())) {
                Ok(frame) => frame,
                Err(_) => return,
            }
        }
    };

    if outbound.send(frame).await.is_err() {
        tracing::debug!(request_id = %response.request_id, "connection gone, dropping response");
    }
}
