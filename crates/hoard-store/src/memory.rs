use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use bytes::Bytes;
use hoard_crypto::{ChunkSignature, VerifyingKey};
use hoard_types::{ChunkHash, ChunkKind, HashSpan};

use crate::error::{StoreError, StoreResult};
use crate::traits::{check_push, ChunkStore, PushOutcome, ServerConfiguration};

/// In-memory, HashMap-based chunk store.
///
/// Intended for tests and embedding. Faults can be injected at runtime:
/// taking the store offline, serving corrupted bytes, or refusing pushes.
pub struct InMemoryChunkStore {
    host: String,
    chunks: RwLock<HashMap<(ChunkHash, ChunkKind), Bytes>>,
    hash_spans: Vec<HashSpan>,
    online: AtomicBool,
    corrupt_reads: AtomicBool,
    reject_pushes: AtomicBool,
    push_count: AtomicUsize,
}

impl InMemoryChunkStore {
    /// Create an empty store that declares no hash spans.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            chunks: RwLock::new(HashMap::new()),
            hash_spans: Vec::new(),
            online: AtomicBool::new(true),
            corrupt_reads: AtomicBool::new(false),
            reject_pushes: AtomicBool::new(false),
            push_count: AtomicUsize::new(0),
        }
    }

    /// Declare the hash spans this store advertises.
    pub fn with_hash_spans(mut self, spans: Vec<HashSpan>) -> Self {
        self.hash_spans = spans;
        self
    }

    /// Seed a chunk directly, bypassing signature checks.
    pub fn insert(&self, hash: ChunkHash, kind: ChunkKind, data: impl Into<Bytes>) {
        self.chunks
            .write()
            .expect("lock poisoned")
            .insert((hash, kind), data.into());
    }

    /// Returns `true` if the chunk is held, regardless of fault flags.
    pub fn contains(&self, hash: &ChunkHash, kind: ChunkKind) -> bool {
        self.chunks
            .read()
            .expect("lock poisoned")
            .contains_key(&(*hash, kind))
    }

    /// Number of chunks held.
    pub fn len(&self) -> usize {
        self.chunks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.read().expect("lock poisoned").is_empty()
    }

    /// Number of `set_chunk` calls received, successful or not.
    pub fn push_count(&self) -> usize {
        self.push_count.load(Ordering::SeqCst)
    }

    /// Take the store offline (every call fails) or bring it back.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Serve flipped bytes from `get_chunk`.
    pub fn set_corrupt_reads(&self, corrupt: bool) {
        self.corrupt_reads.store(corrupt, Ordering::SeqCst);
    }

    /// Refuse every push.
    pub fn set_reject_pushes(&self, reject: bool) {
        self.reject_pushes.store(reject, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unreachable(self.host.clone()))
        }
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn host(&self) -> &str {
        &self.host
    }

    fn has_chunk(&self, hash: &ChunkHash, kind: ChunkKind) -> StoreResult<bool> {
        self.ensure_online()?;
        Ok(self.contains(hash, kind))
    }

    fn get_chunk(&self, hash: &ChunkHash, kind: ChunkKind) -> StoreResult<Bytes> {
        self.ensure_online()?;
        let data = self
            .chunks
            .read()
            .expect("lock poisoned")
            .get(&(*hash, kind))
            .cloned()
            .ok_or(StoreError::NotFound { hash: *hash, kind })?;
        if self.corrupt_reads.load(Ordering::SeqCst) {
            let mut flipped = data.to_vec();
            match flipped.first_mut() {
                Some(b) => *b ^= 0xff,
                None => flipped.push(0xff),
            }
            return Ok(Bytes::from(flipped));
        }
        Ok(data)
    }

    fn set_chunk(
        &self,
        signature: &ChunkSignature,
        hash: &ChunkHash,
        kind: ChunkKind,
        data: &Bytes,
    ) -> StoreResult<PushOutcome> {
        self.push_count.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        if self.reject_pushes.load(Ordering::SeqCst) {
            return Ok(PushOutcome::failed(StoreError::Rejected {
                host: self.host.clone(),
                reason: "store is read-only".into(),
            }));
        }
        if let Err(e) = check_push(signature, hash, kind, data) {
            return Ok(PushOutcome::failed(e));
        }
        self.insert(*hash, kind, data.clone());
        Ok(PushOutcome::ok())
    }

    fn configuration(&self, _identity: &VerifyingKey) -> StoreResult<ServerConfiguration> {
        self.ensure_online()?;
        Ok(ServerConfiguration {
            hash_spans: self.hash_spans.clone(),
        })
    }
}

impl std::fmt::Debug for InMemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChunkStore")
            .field("host", &self.host)
            .field("chunk_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_crypto::SigningKey;

    fn push(store: &InMemoryChunkStore, sk: &SigningKey, data: &'static [u8]) -> PushOutcome {
        let hash = ChunkHash::compute(data);
        let sig = sk.sign_chunk(&hash, ChunkKind::Data, data);
        store
            .set_chunk(&sig, &hash, ChunkKind::Data, &Bytes::from_static(data))
            .unwrap()
    }

    #[test]
    fn push_then_get() {
        let store = InMemoryChunkStore::new("a");
        let sk = SigningKey::generate();
        assert!(push(&store, &sk, b"hello").is_success());

        let hash = ChunkHash::compute(b"hello");
        assert!(store.has_chunk(&hash, ChunkKind::Data).unwrap());
        assert!(!store.has_chunk(&hash, ChunkKind::MetaData).unwrap());
        assert_eq!(store.get_chunk(&hash, ChunkKind::Data).unwrap(), &b"hello"[..]);
        assert_eq!(store.push_count(), 1);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = InMemoryChunkStore::new("a");
        let err = store
            .get_chunk(&ChunkHash::compute(b"missing"), ChunkKind::Data)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn offline_store_fails_every_call() {
        let store = InMemoryChunkStore::new("down");
        store.set_online(false);
        let hash = ChunkHash::compute(b"x");
        assert!(matches!(
            store.has_chunk(&hash, ChunkKind::Data),
            Err(StoreError::Unreachable(_))
        ));
        assert!(store.configuration(&SigningKey::generate().verifying_key()).is_err());
    }

    #[test]
    fn corrupt_reads_flip_bytes() {
        let store = InMemoryChunkStore::new("a");
        let hash = ChunkHash::compute(b"payload");
        store.insert(hash, ChunkKind::Data, &b"payload"[..]);
        store.set_corrupt_reads(true);
        let data = store.get_chunk(&hash, ChunkKind::Data).unwrap();
        assert!(!hash.verify(&data));
    }

    #[test]
    fn rejected_push_reports_in_outcome() {
        let store = InMemoryChunkStore::new("ro");
        store.set_reject_pushes(true);
        let outcome = push(&store, &SigningKey::generate(), b"data");
        assert!(!outcome.is_success());
        assert!(store.is_empty());
    }

    #[test]
    fn configuration_reports_spans() {
        let store = InMemoryChunkStore::new("a").with_hash_spans(vec![HashSpan::full()]);
        let config = store
            .configuration(&SigningKey::generate().verifying_key())
            .unwrap();
        assert_eq!(config.hash_spans, vec![HashSpan::full()]);
    }
}
