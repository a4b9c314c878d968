use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use myrpc_common::transport::{write_frame, FrameConfig, FrameReader, MessageCodec, Serializer};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::config::RegistryConfig;
use crate::coordinator::{Coordinator, CoordinatorFactory};
use crate::error::{CoordinationError, Result};
use crate::protocol::{unexpected, CoordinationReply, CoordinationRequest};

/// Opens sessions on a [`CoordinationServer`](crate::CoordinationServer).
#[derive(Debug, Clone)]
pub struct RemoteConnector {
    addr: String,
    connect_timeout: Duration,
    session_timeout: Duration,
    frame: FrameConfig,
}

impl RemoteConnector {
    pub fn new(addr: impl Into<String>, config: &RegistryConfig) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: config.connect_timeout,
            session_timeout: config.session_timeout,
            frame: config.frame,
        }
    }
}

#[async_trait]
impl CoordinatorFactory for RemoteConnector {
    async fn connect(&self) -> Result<Arc<dyn Coordinator>> {
        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(CoordinationError::Unavailable(format!(
                    "failed to connect to {}: {}",
                    self.addr, e
                )))
            }
            Err(_) => return Err(CoordinationError::Timeout(self.connect_timeout.as_millis() as u64)),
        };
        let _ = stream.set_nodelay(true);

        let coordinator = RemoteCoordinator::new(stream, self.frame);
        // The server refuses sessions while its store is down; surface that now.
        let session_timeout = coordinator.handshake(self.session_timeout).await?;
        tracing::debug!(addr = %self.addr, ?session_timeout, "coordination session established");
        Ok(Arc::new(coordinator))
    }

    fn describe(&self) -> String {
        self.addr.clone()
    }
}

struct SessionIo {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// Set while a request awaits its reply. Still set on entry means an
    /// earlier call was abandoned mid-exchange and the stream is out of step.
    in_flight: bool,
}

/// A session over one TCP connection to a coordination server.
pub struct RemoteCoordinator {
    io: Mutex<SessionIo>,
    codec: MessageCodec,
    closed: AtomicBool,
}

impl RemoteCoordinator {
    fn new(stream: TcpStream, frame: FrameConfig) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            io: Mutex::new(SessionIo {
                reader: FrameReader::new(read_half, frame),
                writer: write_half,
                in_flight: false,
            }),
            codec: MessageCodec::new(frame),
            closed: AtomicBool::new(false),
        }
    }

    /// Announces the session timeout; returns the one the server applies.
    async fn handshake(&self, session_timeout: Duration) -> Result<Duration> {
        let request = CoordinationRequest::Connect {
            session_timeout_ms: session_timeout.as_millis() as u64,
        };
        match self.call(request).await? {
            CoordinationReply::Connected { session_timeout_ms } => Ok(Duration::from_millis(session_timeout_ms)),
            other => Err(unexpected(other)),
        }
    }

    async fn call(&self, request: CoordinationRequest) -> Result<CoordinationReply> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoordinationError::SessionExpired);
        }

        let mut io = self.io.lock().await;
        if io.in_flight {
            return Err(CoordinationError::Unavailable(
                "session out of step after an abandoned request".to_string(),
            ));
        }
        io.in_flight = true;

        let frame = self.codec.encode(&request)?;
        write_frame(&mut io.writer, &frame).await?;

        let payload = io.reader.next_frame().await?.ok_or_else(|| {
            CoordinationError::Unavailable("coordination server closed the session".to_string())
        })?;
        io.in_flight = false;

        let reply: CoordinationReply = self.codec.serializer().deserialize(&payload)?;
        reply.into_result()
    }
}

#[async_trait]
impl Coordinator for RemoteCoordinator {
    async fn create_ephemeral_sequential(&self, path_prefix: &str, data: &[u8]) -> Result<String> {
        let request = CoordinationRequest::CreateEphemeralSequential {
            path_prefix: path_prefix.to_string(),
            data: data.to_vec(),
        };
        match self.call(request).await? {
            CoordinationReply::Created { path } => Ok(path),
            other => Err(unexpected(other)),
        }
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        let request = CoordinationRequest::GetChildren {
            path: path.to_string(),
        };
        match self.call(request).await? {
            CoordinationReply::Children { names } => Ok(names),
            other => Err(unexpected(other)),
        }
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        let request = CoordinationRequest::GetData {
            path: path.to_string(),
        };
        match self.call(request).await? {
            CoordinationReply::Data { data } => Ok(data),
            other => Err(unexpected(other)),
        }
    }

    async fn ping(&self) -> Result<()> {
        match self.call(CoordinationRequest::Ping).await? {
            CoordinationReply::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut io = self.io.lock().await;
        io.writer
            .shutdown()
            .await
            .map_err(|e| CoordinationError::Unavailable(e.to_string()))
    }
}
