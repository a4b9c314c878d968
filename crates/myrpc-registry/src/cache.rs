//! Last-known address sets, used when the registry cannot be reached.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;

/// Snapshot of one service's registry nodes and the addresses they hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedService {
    /// Child node names the addresses were read from
    pub nodes: BTreeSet<String>,
    /// `host:port` strings, one per node that could be read
    pub addresses: Vec<String>,
}

impl CachedService {
    /// Picks one address uniformly at random.
    pub fn pick(&self) -> Option<&String> {
        self.addresses.choose(&mut rand::thread_rng())
    }
}

/// Copy-on-write map from `interface#version` to its [`CachedService`].
///
/// Readers clone an `Arc` under a short read lock; writers replace the whole
/// entry.
#[derive(Default)]
pub struct DiscoveryCache {
    entries: RwLock<HashMap<String, Arc<CachedService>>>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<CachedService>> {
        self.entries.read().get(key).cloned()
    }

    /// True if the cached node set for `key` equals `nodes`.
    pub fn is_current(&self, key: &str, nodes: &BTreeSet<String>) -> bool {
        self.entries
            .read()
            .get(key)
            .map(|cached| &cached.nodes == nodes)
            .unwrap_or(false)
    }

    pub fn replace(&self, key: &str, service: CachedService) -> Arc<CachedService> {
        let service = Arc::new(service);
        self.entries.write().insert(key.to_string(), Arc::clone(&service));
        service
    }

    pub fn remove(&self, key: &str) -> Option<Arc<CachedService>> {
        self.entries.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
