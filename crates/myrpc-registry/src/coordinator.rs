//! Coordination service abstraction.
//!
//! A coordination service is a hierarchical key store with sessions:
//! ephemeral nodes belong to the session that created them and disappear
//! when it ends.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// One session with a coordination service.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Creates an ephemeral node named `path_prefix` followed by a
    /// zero-padded, monotonically increasing sequence number, creating any
    /// missing parents as persistent nodes. Returns the full path.
    async fn create_ephemeral_sequential(&self, path_prefix: &str, data: &[u8]) -> Result<String>;

    /// Names (not full paths) of the direct children of `path`, sorted.
    ///
    /// Returns `NoNode` if `path` does not exist.
    async fn get_children(&self, path: &str) -> Result<Vec<String>>;

    async fn get_data(&self, path: &str) -> Result<Vec<u8>>;

    /// Checks that the session is still alive.
    async fn ping(&self) -> Result<()>;

    /// Ends the session, removing its ephemeral nodes.
    async fn close(&self) -> Result<()>;
}

/// Opens new sessions. Used for the initial connection and for every
/// reconnection after a session is lost.
#[async_trait]
pub trait CoordinatorFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Coordinator>>;

    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}

/// Joins path segments with `/`, ignoring empty segments.
///
/// ```
/// use myrpc_registry::coordinator::join_path;
///
/// assert_eq!(join_path(&["/my-rpc", "com.example.Svc", "1.0"]), "/my-rpc/com.example.Svc/1.0");
/// assert_eq!(join_path(&["/my-rpc/", "/svc/"]), "/my-rpc/svc");
/// ```
pub fn join_path(segments: &[&str]) -> String {
    let mut path = String::new();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        path.push('/');
        path.push_str(segment);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// Splits `/a/b/c` into (`/a/b`, `c`). The parent of a top-level node is `/`.
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("/", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&["/my-rpc", "svc", "DEFAULT"]), "/my-rpc/svc/DEFAULT");
        assert_eq!(join_path(&[]), "/");
        assert_eq!(join_path(&["", "/"]), "/");
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("/my-rpc/svc/1.0/address-"), ("/my-rpc/svc/1.0", "address-"));
        assert_eq!(split_parent("/my-rpc"), ("/", "my-rpc"));
    }
}
