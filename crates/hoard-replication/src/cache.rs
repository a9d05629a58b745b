//! LRU cache of parsed metadata records.
//!
//! A project's member files are looked up twice per run: once to size the
//! run and once to replicate. The cache keeps the second lookup off the
//! network. It is owned by the engine and lives as long as it does.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use hoard_store::ObjectMetadata;
use hoard_types::ChunkHash;
use tracing::trace;

/// Thread-safe LRU cache keyed by object hash.
pub struct MetadataCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    /// Front = least recently used.
    order: VecDeque<ChunkHash>,
    entries: HashMap<ChunkHash, Arc<ObjectMetadata>>,
}

impl MetadataCache {
    /// A capacity of 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                order: VecDeque::new(),
                entries: HashMap::new(),
            }),
        }
    }

    pub fn put(&self, hash: ChunkHash, metadata: Arc<ObjectMetadata>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.entries.insert(hash, metadata).is_some() {
            inner.order.retain(|h| *h != hash);
        }
        inner.order.push_back(hash);
        while inner.entries.len() > self.capacity {
            let Some(evicted) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&evicted);
            trace!(%evicted, "evicted cached metadata");
        }
    }

    /// Look up a record and mark it most recently used.
    pub fn get(&self, hash: &ChunkHash) -> Option<Arc<ObjectMetadata>> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let metadata = inner.entries.get(hash)?.clone();
        inner.order.retain(|h| h != hash);
        inner.order.push_back(*hash);
        Some(metadata)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.entries.clear();
        inner.order.clear();
    }
}
