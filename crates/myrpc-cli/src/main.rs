//! # MyRPC CLI Entry Point
//!
//! Main binary for MyRPC. Runs the coordination server, the demo provider and
//! the demo consumer.
//!
//! ## Usage
//!
//! ```bash
//! # Start the coordination server
//! myrpc registry -b 0.0.0.0:2181
//!
//! # Serve ExampleService 1.0 on port 20880
//! myrpc provider -r 127.0.0.1:2181 -p 20880 --version 1.0
//!
//! # Call sayHello through discovery (prints only the result)
//! myrpc call -r 127.0.0.1:2181 --version 1.0 --name World --times 3
//! ```
//!
//! ## Environment
//!
//! - `MYRPC_REGISTRY`: registry address when `-r` is not given
//! - `MYRPC_ADVERTISE_HOST`: provider host when `--advertise-host` is not given
//! - `RUST_LOG`: log filter (defaults to `info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use myrpc_cli::demo::{self, ExampleServiceClient, ExampleServiceImpl};
use myrpc_client::{ClientConfig, ProxyFactory, RpcClient};
use myrpc_registry::{CoordinationServer, CoordinationStore, RegistryConfig, ServiceRegistry};
use myrpc_server::{RpcServer, ServerConfig};

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// MyRPC - service-oriented RPC with registry-based discovery
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Registry**: Start the coordination server
/// - **Provider**: Serve the demo service
/// - **Call**: Call the demo service once
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Registry(RegistryArgs),
    Provider(ProviderArgs),
    Call(CallArgs),
}

/// Arguments for the coordination server.
///
/// Providers hold one session per connection; when a provider disconnects its
/// registrations are removed.
#[derive(FromArgs)]
#[argh(subcommand, name = "registry")]
/// start a MyRPC coordination server
struct RegistryArgs {
    /// address to bind the coordination server to
    #[argh(option, short = 'b', default = "\"0.0.0.0:2181\".into()")]
    bind: String,
}

/// Arguments for the demo provider.
///
/// # Example
///
/// ```bash
/// myrpc provider -r 127.0.0.1:2181 -p 0 --advertise-host 10.0.0.7
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "provider")]
/// serve the demo ExampleService
struct ProviderArgs {
    /// coordination server address
    ///
    /// Falls back to MYRPC_REGISTRY, then 127.0.0.1:2181.
    #[argh(option, short = 'r')]
    registry: Option<String>,

    /// port to listen on
    ///
    /// Defaults to 20880. Port 0 picks any free port; the bound port is what
    /// gets registered.
    #[argh(option, short = 'p', default = "20880")]
    port: u16,

    /// service version to register
    #[argh(option, default = "\"1.0\".into()")]
    version: String,

    /// host consumers should connect to
    ///
    /// Falls back to MYRPC_ADVERTISE_HOST, then 127.0.0.1.
    #[argh(option, long = "advertise-host")]
    advertise_host: Option<String>,

    /// number of service calls allowed to run at once
    #[argh(option, long = "worker-threads", default = "myrpc_server::DEFAULT_WORKER_THREADS")]
    worker_threads: usize,
}

/// Arguments for calling the demo service.
///
/// Prints the greeting to stdout and nothing else; errors go to stderr with a
/// non-zero exit code.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call ExampleService.sayHello through the registry
struct CallArgs {
    /// coordination server address
    ///
    /// Falls back to MYRPC_REGISTRY, then 127.0.0.1:2181.
    #[argh(option, short = 'r')]
    registry: Option<String>,

    /// service version to call
    #[argh(option, default = "\"1.0\".into()")]
    version: String,

    /// name to greet
    #[argh(option, default = "\"World\".into()")]
    name: String,

    /// greeting count passed to the service
    #[argh(option, default = "3")]
    times: i32,

    /// call deadline in milliseconds
    #[argh(option, long = "timeout-ms", default = "30000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep `call` output clean for scripting
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    match cli.command {
        Commands::Registry(args) => run_registry(args).await,
        Commands::Provider(args) => run_provider(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

async fn run_registry(args: RegistryArgs) -> Result<()> {
    tracing::info!("Starting MyRPC coordination server on {}", args.bind);
    let server = CoordinationServer::bind(&args.bind, CoordinationStore::new()).await?;
    server.run(shutdown_signal()).await?;
    Ok(())
}

async fn run_provider(args: ProviderArgs) -> Result<()> {
    let registry_addr = myrpc_cli::resolve_registry(args.registry);
    let advertise_host = myrpc_cli::resolve_advertise_host(args.advertise_host);
    tracing::info!("Starting MyRPC provider, registry: {}", registry_addr);

    let registry = Arc::new(ServiceRegistry::connect(&registry_addr, RegistryConfig::default()).await?);

    let config = ServerConfig::new()
        .with_bind_addr(format!("0.0.0.0:{}", args.port))
        .with_advertise_host(advertise_host)
        .with_worker_threads(args.worker_threads);

    let server = RpcServer::builder(config)
        .service(demo::definition(Arc::new(ExampleServiceImpl), &args.version))
        .start(Arc::clone(&registry))
        .await?;
    tracing::info!(
        "Serving {} {} at {}",
        demo::EXAMPLE_SERVICE,
        args.version,
        server.advertised_address()
    );

    server.run(shutdown_signal()).await?;

    tracing::info!("Deregistering");
    registry.close().await;
    Ok(())
}

/// Executes the `call` subcommand.
///
/// No tracing is initialized for this command, so stdout carries only the
/// result.
async fn run_call(args: CallArgs) -> Result<()> {
    let registry_addr = myrpc_cli::resolve_registry(args.registry);
    let registry = Arc::new(ServiceRegistry::connect(&registry_addr, RegistryConfig::default()).await?);

    let client = RpcClient::new(
        ClientConfig::default().with_call_timeout(Duration::from_millis(args.timeout_ms)),
    )?;
    let factory = ProxyFactory::new(Arc::clone(&registry), client);

    let example: ExampleServiceClient = factory.create(&args.version);
    let outcome = example.say_hello(&args.name, args.times).await;

    factory.client().close_all().await;
    registry.close().await;

    println!("{}", outcome?);
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
