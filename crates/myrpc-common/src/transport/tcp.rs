use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::protocol::error::{Result, RpcError};
use crate::protocol::{Request, Response};
use crate::transport::codec::Serializer;
use crate::transport::correlator::{Correlator, PendingCall};
use crate::transport::frame::{write_frame, FrameConfig, FrameReader, MessageCodec};

/// Default timeout for establishing a connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames queued for writing before senders start waiting
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Settings for an outbound connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    pub frame: FrameConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            frame: FrameConfig::default(),
        }
    }
}

/// A client-side TCP connection carrying many concurrent calls.
///
/// The stream is split: a reader task decodes responses and hands them to the
/// connection's [`Correlator`], while a writer task drains a queue of encoded
/// frames so concurrent senders never interleave bytes.
///
/// When either task stops (EOF, I/O error, malformed frame) or [`close`] is
/// called, every pending call fails with `ConnectionClosed` and both halves of
/// the socket are released, even while handles to the connection remain.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use myrpc_common::transport::{Connection, ConnectionConfig};
/// use myrpc_common::protocol::Request;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let conn = Connection::connect("127.0.0.1:20880", ConnectionConfig::default()).await?;
///
/// let request = Request::new("com.example.ExampleService", "sayHello")
///     .with_arg("string", json!("World"))
///     .with_arg("int", json!(3));
/// let response = conn.send(&request).await?.wait(Duration::from_secs(30)).await?;
/// # Ok(())
/// # }
/// ```
///
/// [`close`]: Connection::close
pub struct Connection {
    peer: String,
    correlator: Arc<Correlator>,
    outbound: mpsc::Sender<Bytes>,
    codec: MessageCodec,
    reader: JoinHandle<()>,
    /// Owns the write half; aborting it releases the socket.
    writer: AbortHandle,
    /// Fails pending calls once the writer stops.
    writer_watch: JoinHandle<()>,
}

impl Connection {
    /// Connects to `addr`, trying every resolved socket address in turn.
    ///
    /// # Errors
    ///
    /// `Connection` if the address does not resolve or every attempt is
    /// refused, `Timeout` if connecting takes longer than the configured
    /// connect timeout.
    pub async fn connect(addr: &str, config: ConnectionConfig) -> Result<Self> {
        let socket_addrs = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| RpcError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(config.connect_timeout, TcpStream::connect(socket_addr)).await {
                Ok(Ok(stream)) => {
                    tracing::debug!(peer = %addr, "connection established");
                    return Ok(Self::from_stream(addr, stream, config.frame));
                }
                Ok(Err(e)) => last_err = Some(map_io_error(e, "connecting", config.connect_timeout)),
                Err(_) => last_err = Some(RpcError::Timeout(config.connect_timeout.as_millis() as u64)),
            }
        }

        Err(match last_err {
            Some(RpcError::Timeout(ms)) => RpcError::Timeout(ms),
            Some(e) => RpcError::Connection(format!("Failed to connect to {}: {}", addr, e)),
            None => RpcError::Connection(format!("Failed to connect to {}: no addresses resolved", addr)),
        })
    }

    /// Wraps an already connected stream.
    pub fn from_stream(peer: impl Into<String>, stream: TcpStream, frame: FrameConfig) -> Self {
        let peer = peer.into();
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        let correlator = Arc::new(Correlator::new());
        let codec = MessageCodec::new(frame);

        let (outbound, writer_done) = spawn_writer(write_half, OUTBOUND_QUEUE_CAPACITY);
        let writer = writer_done.abort_handle();
        let writer_watch = {
            let correlator = Arc::clone(&correlator);
            let peer = peer.clone();
            tokio::spawn(async move {
                match writer_done.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(peer = %peer, error = %e, "connection write failed"),
                    Err(e) => tracing::debug!(peer = %peer, error = %e, "writer task stopped"),
                }
                correlator.fail_all(|| RpcError::ConnectionClosed);
            })
        };

        let reader = {
            let correlator = Arc::clone(&correlator);
            let peer = peer.clone();
            let writer = writer.clone();
            let mut frames = FrameReader::new(read_half, frame);
            tokio::spawn(async move {
                loop {
                    match frames.next_frame().await {
                        Ok(Some(payload)) => match codec.serializer().deserialize::<Response>(&payload) {
                            Ok(response) => {
                                correlator.complete(response);
                            }
                            Err(e) => {
                                tracing::error!(peer = %peer, error = %e, "undecodable response, closing connection");
                                break;
                            }
                        },
                        Ok(None) => {
                            tracing::debug!(peer = %peer, "connection closed by peer");
                            break;
                        }
                        Err(e) => {
                            tracing::error!(peer = %peer, error = %e, "connection read failed");
                            break;
                        }
                    }
                }
                correlator.fail_all(|| RpcError::ConnectionClosed);
                writer.abort();
            })
        };

        Self {
            peer,
            correlator,
            outbound,
            codec,
            reader,
            writer,
            writer_watch,
        }
    }

    /// Registers the call and queues its frame.
    ///
    /// The returned [`PendingCall`] resolves when the matching response
    /// arrives; responses may come back in any order.
    pub async fn send(&self, request: &Request) -> Result<PendingCall> {
        let call = self.correlator.register(request.request_id.clone())?;
        let frame = self.codec.encode(request)?;

        self.outbound
            .send(frame)
            .await
            .map_err(|_| RpcError::ConnectionClosed)?;

        tracing::debug!(
            peer = %self.peer,
            request_id = %request.request_id,
            method = %request.method_name,
            "request sent"
        );
        Ok(call)
    }

    /// Tears the connection down, closing the socket, and fails all pending
    /// calls.
    pub fn close(&self) {
        self.correlator.fail_all(|| RpcError::ConnectionClosed);
        self.reader.abort();
        self.writer.abort();
        self.writer_watch.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.correlator.is_closed()
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn pending_count(&self) -> usize {
        self.correlator.pending_count()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Spawns a task that writes queued frames to `writer` in order.
///
/// The task ends when every sender is dropped or a write fails; its result is
/// the write error, if any.
pub fn spawn_writer<W>(mut writer: W, capacity: usize) -> (mpsc::Sender<Bytes>, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Bytes>(capacity);
    let handle = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            write_frame(&mut writer, &frame).await?;
        }
        Ok(())
    });
    (tx, handle)
}

/// Map IO errors to appropriate RpcError variants
///
/// - Timeouts/would block -> `Timeout`
/// - Connection errors -> `Connection`
/// - Other IO errors -> `Io`
pub fn map_io_error(err: std::io::Error, context: &str, timeout: Duration) -> RpcError {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            RpcError::Timeout(timeout.as_millis() as u64)
        }
        std::io::ErrorKind::ConnectionRefused
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected => {
            RpcError::Connection(format!("{}: {}", context, err))
        }
        _ => RpcError::Io(err),
    }
}
