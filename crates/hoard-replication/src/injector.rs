//! Per-chunk replication protocol.
//!
//! 1. Acquire a verified copy from the write set. Metadata chunks are
//!    verified by parsing, data chunks by recomputing their hash.
//! 2. Survey the write set for servers already holding the chunk.
//! 3. Skip if enough servers already hold it.
//! 4. Shuffle the servers whose declared hash spans cover the chunk and the
//!    remaining servers, independently.
//! 5. Push to covering servers first, then to the rest, until enough
//!    copies exist or candidates run out.
//! 6. Report the chunk replicated or failed.
//!
//! Unreachable servers and bad copies are skipped in favour of the next
//! server; nothing is retried within one call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use hoard_crypto::SigningKey;
use hoard_store::{ChunkStore, ObjectMetadata};
use hoard_types::{ChunkHash, ChunkKind, HashSpan};
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::listener::EventSink;

/// What a chunk is to the run being replicated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkRole {
    /// Bytes of a member file.
    Data,
    /// A metadata record, for a file or a project.
    MetaData,
    /// Bytes of a project's encoded manifest.
    Manifest,
}

impl ChunkRole {
    /// Namespace the chunk is stored in.
    pub fn kind(self) -> ChunkKind {
        match self {
            Self::MetaData => ChunkKind::MetaData,
            Self::Data | Self::Manifest => ChunkKind::Data,
        }
    }
}

/// Hash spans declared by each server, fetched on first use.
///
/// Failed fetches are not remembered. Until a fetch succeeds the server is
/// routed by the spans its peer descriptor declared, if any, and is asked
/// again next time.
#[derive(Default)]
pub struct SpanCache {
    spans: Mutex<HashMap<String, Arc<[HashSpan]>>>,
    declared: Mutex<HashMap<String, Arc<[HashSpan]>>>,
}

impl SpanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record spans known from the topology for `host`.
    pub fn declare(&self, host: impl Into<String>, spans: Vec<HashSpan>) {
        self.declared
            .lock()
            .expect("lock poisoned")
            .insert(host.into(), spans.into());
    }

    pub fn spans_for(&self, server: &dyn ChunkStore, signer: &SigningKey) -> Arc<[HashSpan]> {
        if let Some(spans) = self.spans.lock().expect("lock poisoned").get(server.host()) {
            return spans.clone();
        }
        match server.configuration(&signer.verifying_key()) {
            Ok(config) => {
                let spans: Arc<[HashSpan]> = config.hash_spans.into();
                self.spans
                    .lock()
                    .expect("lock poisoned")
                    .insert(server.host().to_owned(), spans.clone());
                spans
            }
            Err(error) => {
                warn!(host = server.host(), %error, "could not fetch server configuration");
                self.declared
                    .lock()
                    .expect("lock poisoned")
                    .get(server.host())
                    .cloned()
                    .unwrap_or_else(|| Arc::from(Vec::new()))
            }
        }
    }
}

/// Brings single chunks up to the required number of copies.
pub struct ChunkInjector<'a> {
    signer: &'a SigningKey,
    servers: &'a [Arc<dyn ChunkStore>],
    spans: &'a SpanCache,
    events: &'a EventSink,
    required: usize,
}

impl<'a> ChunkInjector<'a> {
    pub fn new(
        signer: &'a SigningKey,
        servers: &'a [Arc<dyn ChunkStore>],
        spans: &'a SpanCache,
        events: &'a EventSink,
        required: usize,
    ) -> Self {
        Self {
            signer,
            servers,
            spans,
            events,
            required,
        }
    }

    pub fn required(&self) -> usize {
        self.required
    }

    /// Replicate one chunk. Returns `false` if it ends up with fewer than
    /// the required copies.
    pub fn inject(&self, hash: &ChunkHash, role: ChunkRole) -> bool {
        if self.required == 0 {
            debug!(%hash, ?role, "no copies required");
            self.events.chunk_skipped(role, hash);
            return true;
        }

        let Some(data) = self.acquire(hash, role) else {
            warn!(%hash, ?role, "no verified copy available");
            self.events.chunk_failed(role, hash);
            return false;
        };

        let kind = role.kind();
        let mut holders = 0usize;
        let mut in_range = Vec::new();
        let mut out_of_range = Vec::new();
        for server in self.servers {
            match server.has_chunk(hash, kind) {
                Ok(true) => holders += 1,
                Ok(false) => {
                    let spans = self.spans.spans_for(server.as_ref(), self.signer);
                    if HashSpan::any_contains(&spans, hash) {
                        in_range.push(server);
                    } else {
                        out_of_range.push(server);
                    }
                }
                Err(error) => {
                    debug!(host = server.host(), %hash, %error, "existence probe failed");
                }
            }
        }

        if holders >= self.required {
            debug!(%hash, ?role, holders, "already replicated");
            self.events.chunk_skipped(role, hash);
            return true;
        }

        let mut rng = rand::thread_rng();
        in_range.shuffle(&mut rng);
        out_of_range.shuffle(&mut rng);

        let signature = self.signer.sign_chunk(hash, kind, &data);
        let mut copies = holders;
        for server in in_range.into_iter().chain(out_of_range) {
            if copies >= self.required {
                break;
            }
            match server.set_chunk(&signature, hash, kind, &data) {
                Ok(outcome) if outcome.is_success() => {
                    copies += 1;
                    debug!(host = server.host(), %hash, ?role, "pushed chunk");
                }
                Ok(outcome) => {
                    for error in &outcome.errors {
                        warn!(host = server.host(), %hash, %error, "push attempt failed");
                    }
                }
                Err(error) => warn!(host = server.host(), %hash, %error, "push failed"),
            }
        }

        if copies >= self.required {
            self.events.chunk_replicated(role, hash);
            true
        } else {
            warn!(%hash, ?role, copies, required = self.required, "chunk under-replicated");
            self.events.chunk_failed(role, hash);
            false
        }
    }

    fn acquire(&self, hash: &ChunkHash, role: ChunkRole) -> Option<Bytes> {
        for server in self.servers {
            let data = match server.get_chunk(hash, role.kind()) {
                Ok(data) => data,
                Err(error) => {
                    debug!(host = server.host(), %hash, %error, "fetch failed");
                    continue;
                }
            };
            let verified = match role {
                ChunkRole::MetaData => ObjectMetadata::from_bytes(&data).is_ok(),
                ChunkRole::Data | ChunkRole::Manifest => hash.verify(&data),
            };
            if verified {
                return Some(data);
            }
            warn!(host = server.host(), %hash, ?role, "discarding unverifiable copy");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_store::InMemoryChunkStore;

    use crate::listener::ReplicationListener;

    struct Fixture {
        signer: SigningKey,
        stores: Vec<Arc<InMemoryChunkStore>>,
        servers: Vec<Arc<dyn ChunkStore>>,
        spans: SpanCache,
        events: EventSink,
        log: Arc<Log>,
    }

    #[derive(Default)]
    struct Log(Mutex<Vec<&'static str>>);

    impl ReplicationListener for Log {
        fn data_chunk_replicated(&self, _: &ChunkHash) {
            self.0.lock().unwrap().push("replicated");
        }
        fn data_chunk_skipped(&self, _: &ChunkHash) {
            self.0.lock().unwrap().push("skipped");
        }
        fn data_chunk_failed(&self, _: &ChunkHash) {
            self.0.lock().unwrap().push("failed");
        }
        fn meta_data_chunk_replicated(&self, _: &ChunkHash) {
            self.0.lock().unwrap().push("meta-replicated");
        }
        fn meta_data_chunk_failed(&self, _: &ChunkHash) {
            self.0.lock().unwrap().push("meta-failed");
        }
    }

    impl Fixture {
        fn new(stores: Vec<InMemoryChunkStore>) -> Self {
            let stores: Vec<_> = stores.into_iter().map(Arc::new).collect();
            let servers = stores
                .iter()
                .map(|s| s.clone() as Arc<dyn ChunkStore>)
                .collect();
            let log = Arc::new(Log::default());
            Self {
                signer: SigningKey::generate(),
                stores,
                servers,
                spans: SpanCache::new(),
                events: EventSink::new(vec![log.clone() as Arc<dyn ReplicationListener>]),
                log,
            }
        }

        fn plain(n: usize) -> Self {
            Self::new((0..n).map(|i| InMemoryChunkStore::new(format!("w{i}"))).collect())
        }

        fn injector(&self, required: usize) -> ChunkInjector<'_> {
            ChunkInjector::new(&self.signer, &self.servers, &self.spans, &self.events, required)
        }

        fn pushes(&self) -> Vec<usize> {
            self.stores.iter().map(|s| s.push_count()).collect()
        }

        fn events(&self) -> Vec<&'static str> {
            self.log.0.lock().unwrap().clone()
        }
    }

    fn chunk(content: &'static [u8]) -> (ChunkHash, Bytes) {
        (ChunkHash::compute(content), Bytes::from_static(content))
    }

    #[test]
    fn skips_when_enough_copies_exist() {
        let fx = Fixture::plain(4);
        let (hash, data) = chunk(b"already everywhere");
        for store in &fx.stores[..3] {
            store.insert(hash, ChunkKind::Data, data.clone());
        }

        assert!(fx.injector(3).inject(&hash, ChunkRole::Data));
        assert_eq!(fx.pushes(), [0, 0, 0, 0]);
        assert_eq!(fx.events(), ["skipped"]);
        assert_eq!(fx.events.stats().snapshot().data.skipped, 1);
    }

    #[test]
    fn pushes_until_required_count() {
        let fx = Fixture::plain(5);
        let (hash, data) = chunk(b"one copy");
        fx.stores[0].insert(hash, ChunkKind::Data, data);

        assert!(fx.injector(3).inject(&hash, ChunkRole::Data));
        let holders = fx.stores.iter().filter(|s| s.contains(&hash, ChunkKind::Data)).count();
        assert_eq!(holders, 3);
        assert_eq!(fx.pushes().iter().sum::<usize>(), 2);
        assert_eq!(fx.events(), ["replicated"]);
    }

    #[test]
    fn under_supply_pushes_everything_then_fails() {
        let fx = Fixture::plain(4);
        let (hash, data) = chunk(b"scarce");
        fx.stores[0].insert(hash, ChunkKind::Data, data);
        fx.stores[2].set_online(false);
        fx.stores[3].set_reject_pushes(true);

        assert!(!fx.injector(4).inject(&hash, ChunkRole::Data));
        assert!(fx.stores[1].contains(&hash, ChunkKind::Data));
        assert_eq!(fx.stores[1].push_count(), 1);
        assert_eq!(fx.stores[2].push_count(), 0);
        assert_eq!(fx.stores[3].push_count(), 1);
        assert_eq!(fx.events(), ["failed"]);
        assert_eq!(fx.events.stats().snapshot().data.failed, 1);
    }

    #[test]
    fn in_range_servers_are_preferred() {
        let fx = Fixture::new(vec![
            InMemoryChunkStore::new("source"),
            InMemoryChunkStore::new("outside"),
            InMemoryChunkStore::new("owner").with_hash_spans(vec![HashSpan::full()]),
        ]);
        let (hash, data) = chunk(b"routed");
        fx.stores[0].insert(hash, ChunkKind::Data, data);

        assert!(fx.injector(2).inject(&hash, ChunkRole::Data));
        assert_eq!(fx.stores[1].push_count(), 0);
        assert_eq!(fx.stores[2].push_count(), 1);
    }

    #[test]
    fn corrupt_source_falls_through_to_next_server() {
        let fx = Fixture::plain(3);
        let (hash, data) = chunk(b"good bytes");
        fx.stores[0].insert(hash, ChunkKind::Data, data.clone());
        fx.stores[0].set_corrupt_reads(true);
        fx.stores[1].insert(hash, ChunkKind::Data, data);

        assert!(fx.injector(3).inject(&hash, ChunkRole::Data));
        let pushed = fx.stores[2].get_chunk(&hash, ChunkKind::Data).unwrap();
        assert!(hash.verify(&pushed));
    }

    #[test]
    fn no_verified_copy_fails_without_pushing() {
        let fx = Fixture::plain(3);
        let (hash, data) = chunk(b"bad everywhere");
        fx.stores[0].insert(hash, ChunkKind::Data, data);
        fx.stores[0].set_corrupt_reads(true);

        assert!(!fx.injector(2).inject(&hash, ChunkRole::Data));
        assert_eq!(fx.pushes(), [0, 0, 0]);
    }

    #[test]
    fn metadata_is_verified_by_parsing() {
        let fx = Fixture::plain(3);
        let hash = ChunkHash::compute(b"described object");
        let record = ObjectMetadata::file("f", vec![hash]).to_bytes().unwrap();
        fx.stores[0].insert(hash, ChunkKind::MetaData, &b"not a record"[..]);
        fx.stores[1].insert(hash, ChunkKind::MetaData, record.clone());

        assert!(fx.injector(3).inject(&hash, ChunkRole::MetaData));
        assert_eq!(fx.stores[2].get_chunk(&hash, ChunkKind::MetaData).unwrap(), record);
        assert_eq!(fx.events(), ["meta-replicated"]);
    }

    #[test]
    fn manifest_role_is_tallied_separately() {
        let fx = Fixture::plain(2);
        let (hash, data) = chunk(b"4\n0\nproject\n\n\n");
        fx.stores[0].insert(hash, ChunkKind::Data, data);

        assert!(fx.injector(2).inject(&hash, ChunkRole::Manifest));
        let snap = fx.events.stats().snapshot();
        assert_eq!(snap.manifest.replicated, 1);
        assert_eq!(snap.data.replicated, 0);
        assert_eq!(fx.events(), ["replicated"]);
    }

    #[test]
    fn zero_required_always_skips() {
        let fx = Fixture::plain(0);
        let (hash, _) = chunk(b"nowhere");
        assert!(fx.injector(0).inject(&hash, ChunkRole::Data));
        assert_eq!(fx.events(), ["skipped"]);
    }

    #[test]
    fn span_fetch_failures_are_not_cached() {
        let store = InMemoryChunkStore::new("flaky").with_hash_spans(vec![HashSpan::full()]);
        let signer = SigningKey::generate();
        let cache = SpanCache::new();

        store.set_online(false);
        assert!(cache.spans_for(&store, &signer).is_empty());

        store.set_online(true);
        assert_eq!(&*cache.spans_for(&store, &signer), &[HashSpan::full()]);

        store.set_online(false);
        assert_eq!(&*cache.spans_for(&store, &signer), &[HashSpan::full()]);
    }

    #[test]
    fn declared_spans_cover_for_unreachable_servers() {
        let store = InMemoryChunkStore::new("quiet");
        let signer = SigningKey::generate();
        let cache = SpanCache::new();
        cache.declare("quiet", vec![HashSpan::full()]);

        store.set_online(false);
        assert_eq!(&*cache.spans_for(&store, &signer), &[HashSpan::full()]);

        // The server's own answer wins once it is reachable.
        store.set_online(true);
        assert!(cache.spans_for(&store, &signer).is_empty());
    }
}
