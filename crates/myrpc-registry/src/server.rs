use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use myrpc_common::transport::{write_frame, FrameConfig, FrameReader, MessageCodec, Serializer, TcpServer};
use myrpc_common::Result;
use tokio::net::TcpStream;

use crate::config::DEFAULT_SESSION_TIMEOUT;
use crate::memory::CoordinationStore;
use crate::error::CoordinationError;
use crate::protocol::{CoordinationReply, CoordinationRequest};

/// Networked front end for a [`CoordinationStore`].
///
/// Every accepted connection opens one session. The session expires and its
/// ephemeral nodes are removed when the connection ends, or when the client
/// stays silent for longer than its session timeout (the one it sent in
/// `Connect`, else the server default).
///
/// # Example
///
/// ```no_run
/// use myrpc_registry::{CoordinationServer, CoordinationStore};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let server = CoordinationServer::bind("0.0.0.0:2181", CoordinationStore::new()).await?;
/// server.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
/// # Ok(())
/// # }
/// ```
pub struct CoordinationServer {
    store: CoordinationStore,
    server: TcpServer,
    frame: FrameConfig,
    session_timeout: Duration,
}

impl CoordinationServer {
    pub async fn bind(bind_addr: &str, store: CoordinationStore) -> Result<Self> {
        let server = TcpServer::bind(bind_addr).await?;
        Ok(Self {
            store,
            server,
            frame: FrameConfig::default(),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        })
    }

    /// Timeout applied to sessions until their client sends `Connect`.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    pub fn store(&self) -> &CoordinationStore {
        &self.store
    }

    /// Serves sessions until `shutdown` resolves.
    pub async fn run<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        tracing::info!(addr = %self.local_addr()?, "coordination server listening");

        let store = self.store.clone();
        let frame = self.frame;
        let session_timeout = self.session_timeout;
        self.server
            .run_with_handler(
                move |stream, peer| handle_session(store.clone(), stream, peer, frame, session_timeout),
                shutdown,
            )
            .await
    }
}

async fn handle_session(
    store: CoordinationStore,
    stream: TcpStream,
    peer: SocketAddr,
    frame: FrameConfig,
    session_timeout: Duration,
) -> Result<()> {
    let session = match store.open_session() {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "refusing session");
            return Ok(());
        }
    };
    tracing::info!(peer = %peer, session, "session opened");

    let result = serve_session(&store, session, stream, frame, session_timeout).await;

    let removed = store.expire_session(session);
    tracing::info!(peer = %peer, session, removed, "session closed");
    result
}

async fn serve_session(
    store: &CoordinationStore,
    session: u64,
    stream: TcpStream,
    frame: FrameConfig,
    mut session_timeout: Duration,
) -> Result<()> {
    let codec = MessageCodec::new(frame);
    let (read_half, mut write_half) = stream.into_split();
    let mut frames = FrameReader::new(read_half, frame);

    loop {
        let payload = match tokio::time::timeout(session_timeout, frames.next_frame()).await {
            Ok(next) => match next? {
                Some(payload) => payload,
                None => break,
            },
            Err(_) => {
                tracing::warn!(session, timeout = ?session_timeout, "session timed out");
                break;
            }
        };
        let request: CoordinationRequest = codec.serializer().deserialize(&payload)?;
        tracing::debug!(session, ?request, "coordination request");

        if let CoordinationRequest::Connect { session_timeout_ms } = &request {
            if *session_timeout_ms > 0 {
                session_timeout = Duration::from_millis(*session_timeout_ms);
            }
        }
        let reply = apply(store, session, request);
        write_frame(&mut write_half, &codec.encode(&reply)?).await?;
    }
    Ok(())
}

fn apply(store: &CoordinationStore, session: u64, request: CoordinationRequest) -> CoordinationReply {
    let outcome = match request {
        CoordinationRequest::Connect { session_timeout_ms: 0 } => Err(CoordinationError::Protocol(
            "session timeout must be greater than 0".to_string(),
        )),
        CoordinationRequest::Connect { session_timeout_ms } => store
            .check_session(session)
            .map(|_| CoordinationReply::Connected { session_timeout_ms }),
        CoordinationRequest::CreateEphemeralSequential { path_prefix, data } => store
            .create_ephemeral_sequential(session, &path_prefix, &data)
            .map(|path| CoordinationReply::Created { path }),
        CoordinationRequest::GetChildren { path } => store
            .check_session(session)
            .and_then(|_| store.get_children(&path))
            .map(|names| CoordinationReply::Children { names }),
        CoordinationRequest::GetData { path } => store
            .check_session(session)
            .and_then(|_| store.get_data(&path))
            .map(|data| CoordinationReply::Data { data }),
        CoordinationRequest::Ping => store
            .check_session(session)
            .map(|_| CoordinationReply::Pong),
    };
    outcome.unwrap_or_else(|e| CoordinationReply::error(&e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_create_and_list() {
        let store = CoordinationStore::new();
        let session = store.open_session().unwrap();

        let created = apply(
            &store,
            session,
            CoordinationRequest::CreateEphemeralSequential {
                path_prefix: "/my-rpc/svc/1.0/address-".to_string(),
                data: b"127.0.0.1:20880".to_vec(),
            },
        );
        assert_eq!(
            created,
            CoordinationReply::Created {
                path: "/my-rpc/svc/1.0/address-0000000000".to_string()
            }
        );

        let children = apply(
            &store,
            session,
            CoordinationRequest::GetChildren {
                path: "/my-rpc/svc/1.0".to_string(),
            },
        );
        assert_eq!(
            children,
            CoordinationReply::Children {
                names: vec!["address-0000000000".to_string()]
            }
        );
    }

    #[test]
    fn test_apply_connect() {
        let store = CoordinationStore::new();
        let session = store.open_session().unwrap();

        let reply = apply(&store, session, CoordinationRequest::Connect { session_timeout_ms: 300 });
        assert_eq!(reply, CoordinationReply::Connected { session_timeout_ms: 300 });

        let reply = apply(&store, session, CoordinationRequest::Connect { session_timeout_ms: 0 });
        assert!(matches!(reply.into_result(), Err(CoordinationError::Protocol(_))));
    }

    #[test]
    fn test_apply_on_expired_session() {
        let store = CoordinationStore::new();
        let session = store.open_session().unwrap();
        store.expire_session(session);

        let reply = apply(&store, session, CoordinationRequest::Ping);
        assert_eq!(reply.into_result(), Err(CoordinationError::SessionExpired));
    }
}
