//! In-process coordination store.
//!
//! Backs the networked coordination server and is used directly by tests.
//! Availability can be switched off to simulate an outage.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::coordinator::{split_parent, Coordinator, CoordinatorFactory};
use crate::error::{CoordinationError, Result};

pub type SessionId = u64;

struct Node {
    data: Vec<u8>,
    /// Owning session for ephemeral nodes, `None` for persistent ones.
    owner: Option<SessionId>,
}

#[derive(Default)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    /// Next sequence number per parent path.
    sequences: HashMap<String, u64>,
    sessions: HashSet<SessionId>,
}

impl Tree {
    fn exists(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }

    fn ensure_persistent(&mut self, path: &str) -> Result<()> {
        if path == "/" {
            return Ok(());
        }
        match self.nodes.get(path) {
            Some(node) if node.owner.is_some() => Err(CoordinationError::Protocol(format!(
                "ephemeral node cannot have children: {}",
                path
            ))),
            Some(_) => Ok(()),
            None => {
                let (parent, _) = split_parent(path);
                let parent = parent.to_string();
                self.ensure_persistent(&parent)?;
                self.nodes.insert(
                    path.to_string(),
                    Node {
                        data: Vec::new(),
                        owner: None,
                    },
                );
                Ok(())
            }
        }
    }
}

struct StoreInner {
    tree: Mutex<Tree>,
    available: AtomicBool,
    next_session: AtomicU64,
}

/// Shared in-memory node tree. Cloning yields another handle to the same
/// tree.
#[derive(Clone)]
pub struct CoordinationStore {
    inner: Arc<StoreInner>,
}

impl CoordinationStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                tree: Mutex::new(Tree::default()),
                available: AtomicBool::new(true),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Switches the simulated outage on or off. While unavailable every
    /// operation fails with `Unavailable`; sessions and nodes are kept.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
        tracing::info!(available, "coordination store availability changed");
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(CoordinationError::Unavailable("coordination store is down".to_string()))
        }
    }

    pub fn open_session(&self) -> Result<SessionId> {
        self.check_available()?;
        let id = self.inner.next_session.fetch_add(1, Ordering::SeqCst);
        self.inner.tree.lock().sessions.insert(id);
        tracing::debug!(session = id, "session opened");
        Ok(id)
    }

    /// Opens a session and wraps it in a [`MemoryCoordinator`].
    pub fn session(&self) -> Result<MemoryCoordinator> {
        let session = self.open_session()?;
        Ok(MemoryCoordinator {
            store: self.clone(),
            session,
            closed: AtomicBool::new(false),
        })
    }

    /// Ends a session and deletes its ephemeral nodes. Returns the number of
    /// nodes removed.
    pub fn expire_session(&self, session: SessionId) -> usize {
        let mut tree = self.inner.tree.lock();
        if !tree.sessions.remove(&session) {
            return 0;
        }
        let before = tree.nodes.len();
        tree.nodes.retain(|_, node| node.owner != Some(session));
        let removed = before - tree.nodes.len();
        tracing::debug!(session, removed, "session expired");
        removed
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.inner.tree.lock().sessions.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn check_session(&self, session: SessionId) -> Result<()> {
        self.check_available()?;
        if self.inner.tree.lock().sessions.contains(&session) {
            Ok(())
        } else {
            Err(CoordinationError::SessionExpired)
        }
    }

    pub fn create_ephemeral_sequential(
        &self,
        session: SessionId,
        path_prefix: &str,
        data: &[u8],
    ) -> Result<String> {
        self.check_available()?;
        if !path_prefix.starts_with('/') {
            return Err(CoordinationError::Protocol(format!(
                "path must be absolute: {}",
                path_prefix
            )));
        }

        let mut tree = self.inner.tree.lock();
        if !tree.sessions.contains(&session) {
            return Err(CoordinationError::SessionExpired);
        }

        let (parent, _) = split_parent(path_prefix);
        let parent = parent.to_string();
        tree.ensure_persistent(&parent)?;

        let sequence = tree.sequences.entry(parent).or_insert(0);
        let path = format!("{}{:010}", path_prefix, *sequence);
        *sequence += 1;

        tree.nodes.insert(
            path.clone(),
            Node {
                data: data.to_vec(),
                owner: Some(session),
            },
        );
        Ok(path)
    }

    pub fn get_children(&self, path: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let tree = self.inner.tree.lock();
        if !tree.exists(path) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }

        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        let children = tree
            .nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| &key[prefix.len()..])
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .map(str::to_string)
            .collect();
        Ok(children)
    }

    pub fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        self.check_available()?;
        self.inner
            .tree
            .lock()
            .nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))
    }
}

impl Default for CoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinatorFactory for CoordinationStore {
    async fn connect(&self) -> Result<Arc<dyn Coordinator>> {
        Ok(Arc::new(self.session()?))
    }

    fn describe(&self) -> String {
        "in-memory store".to_string()
    }
}

/// A session on a [`CoordinationStore`]. Dropping it ends the session.
pub struct MemoryCoordinator {
    store: CoordinationStore,
    session: SessionId,
    closed: AtomicBool,
}

impl MemoryCoordinator {
    pub fn session_id(&self) -> SessionId {
        self.session
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn create_ephemeral_sequential(&self, path_prefix: &str, data: &[u8]) -> Result<String> {
        self.store
            .create_ephemeral_sequential(self.session, path_prefix, data)
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        self.store.check_session(self.session)?;
        self.store.get_children(path)
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>> {
        self.store.check_session(self.session)?;
        self.store.get_data(path)
    }

    async fn ping(&self) -> Result<()> {
        self.store.check_session(self.session)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.store.expire_session(self.session);
        }
        Ok(())
    }
}

impl Drop for MemoryCoordinator {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.store.expire_session(self.session);
        }
    }
}
