//! Matching responses to in-flight requests.
//!
//! ```text
//!   caller                       correlator                     reader task
//!   ──────                       ──────────                     ───────────
//!   register(id) ──────────▶ pending[id] = tx
//!   write frame
//!   PendingCall::wait ◀───── rx ◀────────── complete(resp) ◀──── decode frame
//! ```
//!
//! Each connection owns one correlator. When the connection dies every
//! outstanding call is failed with `ConnectionClosed`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::protocol::error::{Result, RpcError};
use crate::protocol::{RequestId, Response};

type Completion = oneshot::Sender<Result<Response>>;

#[derive(Default)]
struct State {
    pending: HashMap<RequestId, Completion>,
    closed: bool,
}

/// Concurrent map from request id to the waiter for its response.
#[derive(Default)]
pub struct Correlator {
    state: Mutex<State>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `request_id`.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the id is already in flight, `ConnectionClosed` if
    /// the correlator has been failed.
    pub fn register(self: &Arc<Self>, request_id: impl Into<RequestId>) -> Result<PendingCall> {
        let request_id = request_id.into();
        let mut state = self.state.lock();

        if state.closed {
            return Err(RpcError::ConnectionClosed);
        }
        if state.pending.contains_key(&request_id) {
            return Err(RpcError::InvalidRequest(format!(
                "duplicate request id: {}",
                request_id
            )));
        }

        let (tx, rx) = oneshot::channel();
        state.pending.insert(request_id.clone(), tx);
        tracing::debug!(
            request_id = %request_id,
            pending = state.pending.len(),
            "registered pending call"
        );

        Ok(PendingCall {
            request_id,
            rx,
            correlator: Arc::clone(self),
        })
    }

    /// Hands `response` to its waiter.
    ///
    /// Returns false when no call with that id is pending, which covers
    /// late responses for calls that already timed out.
    pub fn complete(&self, response: Response) -> bool {
        let waiter = self.state.lock().pending.remove(&response.request_id);
        match waiter {
            Some(tx) => {
                // The caller may have given up between remove and send.
                let _ = tx.send(Ok(response));
                true
            }
            None => {
                tracing::warn!(
                    request_id = %response.request_id,
                    "received response for unknown request"
                );
                false
            }
        }
    }

    /// Drops the waiter for `request_id` without completing it.
    pub fn remove(&self, request_id: &str) -> bool {
        self.state.lock().pending.remove(request_id).is_some()
    }

    /// Fails every pending call and rejects further registrations.
    pub fn fail_all(&self, error: impl Fn() -> RpcError) {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending.drain().collect()
        };

        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "failing pending calls");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(error()));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Handle for one outstanding call.
///
/// Dropping it without waiting removes the entry from the correlator, so an
/// abandoned call never leaks.
pub struct PendingCall {
    request_id: RequestId,
    rx: oneshot::Receiver<Result<Response>>,
    correlator: Arc<Correlator>,
}

impl PendingCall {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Waits for the response until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// `Timeout` if no response arrived in time (the entry is removed),
    /// `ConnectionClosed` if the connection died first.
    pub async fn wait(mut self, timeout: Duration) -> Result<Response> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::ConnectionClosed),
            Err(_) => {
                self.correlator.remove(&self.request_id);
                tracing::debug!(request_id = %self.request_id, "call timed out");
                Err(RpcError::Timeout(timeout.as_millis() as u64))
            }
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.correlator.remove(&self.request_id);
    }
}
