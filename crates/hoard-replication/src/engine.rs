use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use hoard_crypto::SigningKey;
use hoard_project::ManifestCodec;
use hoard_store::{ChunkStore, Connector, ObjectMetadata, Topology};
use hoard_types::{ChunkHash, ChunkKind};
use tracing::{debug, info, warn};

use crate::cache::MetadataCache;
use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, ReplicationResult};
use crate::injector::{ChunkInjector, ChunkRole, SpanCache};
use crate::listener::{EventSink, ReplicationListener};
use crate::stats::ReplicationStats;

/// Replicates a project or file to the required number of write servers.
///
/// Metadata is read from the read servers. Chunk copies are sourced from
/// and pushed to the write servers. An engine can run any number of times;
/// each [`execute`](Self::execute) starts with fresh counters while the
/// metadata and hash-span caches carry over.
pub struct ReplicationEngine {
    config: ReplicationConfig,
    signer: Arc<SigningKey>,
    read_servers: Vec<Arc<dyn ChunkStore>>,
    write_servers: Vec<Arc<dyn ChunkStore>>,
    listeners: Vec<Arc<dyn ReplicationListener>>,
    metadata: MetadataCache,
    spans: SpanCache,
    last_stats: Mutex<Arc<ReplicationStats>>,
}

impl ReplicationEngine {
    pub fn new(
        config: ReplicationConfig,
        signer: Arc<SigningKey>,
        read_servers: Vec<Arc<dyn ChunkStore>>,
        write_servers: Vec<Arc<dyn ChunkStore>>,
    ) -> Self {
        Self {
            metadata: MetadataCache::new(config.metadata_cache_capacity),
            config,
            signer,
            read_servers,
            write_servers,
            listeners: Vec::new(),
            spans: SpanCache::new(),
            last_stats: Mutex::new(Arc::new(ReplicationStats::default())),
        }
    }

    /// Build an engine whose servers come from the network topology.
    ///
    /// Read servers are the online core peers; write servers are those that
    /// are also writable. Peers that cannot be connected to are left out.
    /// Spans a peer declares are used for routing whenever its own
    /// configuration cannot be fetched.
    pub fn discover(
        config: ReplicationConfig,
        signer: Arc<SigningKey>,
        topology: &dyn Topology,
        connector: &dyn Connector,
    ) -> Self {
        let mut read_servers = Vec::new();
        let mut write_servers = Vec::new();
        let mut declared = Vec::new();
        for peer in topology.peers() {
            if !peer.is_readable() {
                continue;
            }
            let store = match connector.connect(&peer.host) {
                Ok(store) => store,
                Err(error) => {
                    warn!(host = %peer.host, %error, "skipping unreachable peer");
                    continue;
                }
            };
            if peer.is_writable() {
                write_servers.push(store.clone());
            }
            read_servers.push(store);
            if !peer.hash_spans.is_empty() {
                declared.push((peer.host, peer.hash_spans));
            }
        }
        info!(
            read = read_servers.len(),
            write = write_servers.len(),
            "discovered servers"
        );
        let engine = Self::new(config, signer, read_servers, write_servers);
        for (host, spans) in declared {
            engine.spans.declare(host, spans);
        }
        engine
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ReplicationListener>) {
        self.listeners.push(listener);
    }

    pub fn read_servers(&self) -> &[Arc<dyn ChunkStore>] {
        &self.read_servers
    }

    pub fn write_servers(&self) -> &[Arc<dyn ChunkStore>] {
        &self.write_servers
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Counters of the current or most recent run.
    pub fn stats(&self) -> Arc<ReplicationStats> {
        self.last_stats.lock().expect("lock poisoned").clone()
    }

    /// The configured copy count, lowered to the number of write servers.
    pub fn effective_replications(&self) -> usize {
        let configured = self.config.required_replications;
        let available = self.write_servers.len();
        if configured > available {
            warn!(
                configured,
                available, "fewer write servers than required copies; lowering requirement"
            );
        }
        configured.min(available)
    }

    /// Replicate the project or file stored under `root`.
    ///
    /// Fires exactly one of `finished` or `failed`. Chunks that could not
    /// reach the required copy count do not stop the run; they are reported
    /// at the end as [`ReplicationError::Incomplete`].
    pub fn execute(&self, root: &ChunkHash) -> ReplicationResult<()> {
        let events = EventSink::new(self.listeners.clone());
        *self.last_stats.lock().expect("lock poisoned") = events.stats().clone();

        let required = self.effective_replications();
        let run = Run {
            engine: self,
            injector: ChunkInjector::new(
                &self.signer,
                &self.write_servers,
                &self.spans,
                &events,
                required,
            ),
            events: &events,
            claimed: Mutex::new(HashSet::new()),
            sizes: Mutex::new(HashMap::new()),
            cancel: AtomicBool::new(false),
        };

        info!(%root, required, workers = self.config.workers, "replication started");
        events.started();

        let (tx, rx) = crossbeam_channel::bounded(self.config.queue_capacity.max(1));
        let outcome = thread::scope(|scope| {
            let run = &run;
            let workers: Vec<_> = (0..self.config.workers.max(1))
                .map(|_| {
                    let rx = rx.clone();
                    scope.spawn(move || run.work(rx))
                })
                .collect();
            drop(rx);

            let walked = run.walk(root, &tx);
            if walked.is_err() {
                run.cancel.store(true, Ordering::SeqCst);
            }
            drop(tx);

            let mut lost = false;
            for worker in workers {
                lost |= worker.join().is_err();
            }
            match walked {
                Ok(()) if lost => Err(ReplicationError::WorkerLost),
                other => other,
            }
        });

        if let Err(error) = outcome {
            warn!(%root, %error, "replication aborted");
            events.failed();
            return Err(error);
        }

        let snap = events.stats().snapshot();
        if snap.any_failed() {
            warn!(
                %root,
                data_failed = snap.data.failed,
                meta_data_failed = snap.meta_data.failed,
                manifest_failed = snap.manifest.failed,
                "replication incomplete"
            );
            events.failed();
            return Err(ReplicationError::Incomplete {
                data_failed: snap.data.failed,
                meta_data_failed: snap.meta_data.failed,
                manifest_failed: snap.manifest.failed,
            });
        }
        info!(%root, "replication finished");
        events.finished();
        Ok(())
    }

    /// Parsed metadata record for `hash`, from the cache or the first read
    /// server that returns a parseable one.
    fn metadata(&self, hash: &ChunkHash) -> ReplicationResult<Arc<ObjectMetadata>> {
        if let Some(metadata) = self.metadata.get(hash) {
            return Ok(metadata);
        }
        for server in &self.read_servers {
            let raw = match server.get_chunk(hash, ChunkKind::MetaData) {
                Ok(raw) => raw,
                Err(error) => {
                    debug!(host = server.host(), %hash, %error, "metadata fetch failed");
                    continue;
                }
            };
            match ObjectMetadata::from_bytes(&raw) {
                Ok(metadata) => {
                    let metadata = Arc::new(metadata);
                    self.metadata.put(*hash, metadata.clone());
                    return Ok(metadata);
                }
                Err(error) => warn!(host = server.host(), %hash, %error, "unparseable metadata"),
            }
        }
        Err(ReplicationError::MetadataUnavailable(*hash))
    }

    /// Reassemble an object's bytes from verified data chunks.
    fn payload(&self, metadata: &ObjectMetadata) -> ReplicationResult<Vec<u8>> {
        let mut payload = Vec::new();
        for part in &metadata.parts {
            let chunk = self
                .read_servers
                .iter()
                .find_map(|server| match server.get_chunk(part, ChunkKind::Data) {
                    Ok(data) if part.verify(&data) => Some(data),
                    Ok(_) => {
                        warn!(host = server.host(), hash = %part, "discarding corrupt chunk");
                        None
                    }
                    Err(_) => None,
                })
                .ok_or(ReplicationError::ChunkUnavailable(*part))?;
            payload.extend_from_slice(&chunk);
        }
        Ok(payload)
    }
}

/// State shared by the driving thread and the workers for one run.
struct Run<'e> {
    engine: &'e ReplicationEngine,
    injector: ChunkInjector<'e>,
    events: &'e EventSink,
    claimed: Mutex<HashSet<ChunkHash>>,
    /// Declared size of every distinct file, from the sizing pass.
    sizes: Mutex<HashMap<ChunkHash, u64>>,
    cancel: AtomicBool,
}

impl Run<'_> {
    fn walk(&self, root: &ChunkHash, queue: &Sender<ChunkHash>) -> ReplicationResult<()> {
        let metadata = self.engine.metadata(root)?;
        if !metadata.is_project() {
            self.events.stats().set_total_bytes(metadata.size);
            self.sizes.lock().expect("lock poisoned").insert(*root, metadata.size);
            self.replicate_file(root);
            return Ok(());
        }
        if metadata.is_encrypted() {
            return Err(ReplicationError::EncryptedProject(*root));
        }

        let payload = self.engine.payload(&metadata)?;
        let mut manifest = ManifestCodec::decode_slice(&payload)?;
        info!(project = %manifest.name(), files = manifest.part_count(), "replicating project");

        // Sizes come from peers; saturate rather than trust them to fit.
        let mut sizes = HashMap::new();
        for part in manifest.parts()? {
            let part = part?;
            if let Entry::Vacant(slot) = sizes.entry(*part.hash()) {
                slot.insert(self.engine.metadata(part.hash())?.size);
            }
        }
        let total = sizes.values().fold(0u64, |sum, size| sum.saturating_add(*size));
        *self.sizes.lock().expect("lock poisoned") = sizes;
        self.events.stats().set_total_bytes(total);

        self.injector.inject(root, ChunkRole::MetaData);
        for chunk in &metadata.parts {
            self.injector.inject(chunk, ChunkRole::Manifest);
        }

        for part in manifest.parts()? {
            let part = part?;
            queue
                .send(*part.hash())
                .map_err(|_| ReplicationError::WorkerLost)?;
            self.replicate_file(part.hash());
        }
        manifest.close()?;
        Ok(())
    }

    fn work(&self, queue: Receiver<ChunkHash>) {
        while let Ok(hash) = queue.recv() {
            if self.cancel.load(Ordering::SeqCst) {
                break;
            }
            self.replicate_file(&hash);
        }
    }

    /// Replicate one member file from either thread. A file whose metadata
    /// cannot be fetched counts as a failed metadata chunk and a failed file
    /// of its known size; the run carries on.
    fn replicate_file(&self, hash: &ChunkHash) {
        if let Err(error) = self.replicate_single_file(hash) {
            warn!(%hash, %error, "could not replicate file");
            let size = self
                .sizes
                .lock()
                .expect("lock poisoned")
                .get(hash)
                .copied()
                .unwrap_or(0);
            self.events.chunk_failed(ChunkRole::MetaData, hash);
            self.events.file_failed(hash, size);
        }
    }

    /// Replicate a file's metadata chunk, then its data chunks. Each file is
    /// handled once per run by whichever thread reaches it first.
    fn replicate_single_file(&self, hash: &ChunkHash) -> ReplicationResult<()> {
        if !self.claimed.lock().expect("lock poisoned").insert(*hash) {
            return Ok(());
        }
        let metadata = self.engine.metadata(hash)?;

        let mut complete = self.injector.inject(hash, ChunkRole::MetaData);
        for chunk in &metadata.parts {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(());
            }
            complete &= self.injector.inject(chunk, ChunkRole::Data);
        }

        if complete {
            debug!(%hash, name = %metadata.name, "file replicated");
            self.events.file_finished(hash, metadata.size);
        } else {
            warn!(%hash, name = %metadata.name, "file incomplete");
            self.events.file_failed(hash, metadata.size);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hoard_crypto::{ChunkSignature, VerifyingKey};
    use hoard_project::{ChunkReference, ProjectManifest, ProjectPublisher};
    use hoard_store::{
        Encoding, InMemoryChunkStore, PeerDescriptor, PushOutcome, ServerConfiguration,
        StaticTopology, StoreError, StoreResult,
    };
    use hoard_types::HashSpan;

    #[derive(Default)]
    struct Terminal(Mutex<Vec<&'static str>>);

    impl ReplicationListener for Terminal {
        fn finished(&self) {
            self.0.lock().unwrap().push("finished");
        }
        fn failed(&self) {
            self.0.lock().unwrap().push("failed");
        }
    }

    fn memory_stores(names: &[&str]) -> (Vec<Arc<InMemoryChunkStore>>, Vec<Arc<dyn ChunkStore>>) {
        let concrete: Vec<_> = names.iter().map(|n| Arc::new(InMemoryChunkStore::new(*n))).collect();
        let dynamic = concrete.iter().map(|s| s.clone() as Arc<dyn ChunkStore>).collect();
        (concrete, dynamic)
    }

    fn engine_with(
        required: usize,
        read: Vec<Arc<dyn ChunkStore>>,
        write: Vec<Arc<dyn ChunkStore>>,
    ) -> (ReplicationEngine, Arc<Terminal>) {
        let config = ReplicationConfig::default()
            .with_required_replications(required)
            .with_workers(2);
        let mut engine = ReplicationEngine::new(config, Arc::new(SigningKey::generate()), read, write);
        let terminal = Arc::new(Terminal::default());
        engine.add_listener(terminal.clone());
        (engine, terminal)
    }

    #[test]
    fn single_file_root() {
        let (stores, servers) = memory_stores(&["a", "b", "c"]);
        let key = SigningKey::generate();
        let hash = ProjectPublisher::new(vec![servers[0].clone()], &key)
            .with_chunk_size(8)
            .publish_file("notes.txt", b"a file split in three")
            .unwrap();

        let (engine, terminal) = engine_with(3, servers.clone(), servers);
        engine.execute(&hash).unwrap();

        for store in &stores {
            assert!(store.contains(&hash, ChunkKind::MetaData));
        }
        let snap = engine.stats().snapshot();
        assert_eq!(snap.meta_data.replicated, 1);
        assert_eq!(snap.data.replicated, 3);
        assert_eq!(snap.handled_bytes, snap.total_bytes);
        assert_eq!(*terminal.0.lock().unwrap(), ["finished"]);
    }

    #[test]
    fn second_run_skips_everything() {
        let (_stores, servers) = memory_stores(&["a", "b"]);
        let key = SigningKey::generate();
        let hash = ProjectPublisher::new(servers.clone(), &key)
            .publish_file("f", b"content")
            .unwrap();

        let (engine, _) = engine_with(2, servers.clone(), servers);
        engine.execute(&hash).unwrap();
        let snap = engine.stats().snapshot();
        assert_eq!(snap.meta_data.skipped, 1);
        assert_eq!(snap.data.skipped, 1);
        assert_eq!(snap.data.replicated, 0);
    }

    #[test]
    fn required_count_is_clamped() {
        let (_stores, servers) = memory_stores(&["only"]);
        let (engine, _) = engine_with(3, Vec::new(), servers);
        assert_eq!(engine.effective_replications(), 1);
    }

    #[test]
    fn missing_root_metadata_fails_run() {
        let (_stores, servers) = memory_stores(&["a"]);
        let (engine, terminal) = engine_with(1, servers.clone(), servers);
        let err = engine.execute(&ChunkHash::compute(b"unknown")).unwrap_err();
        assert!(matches!(err, ReplicationError::MetadataUnavailable(_)));
        assert_eq!(*terminal.0.lock().unwrap(), ["failed"]);
    }

    #[test]
    fn encrypted_project_is_refused() {
        let (stores, servers) = memory_stores(&["a"]);
        let root = ChunkHash::compute(b"sealed manifest");
        let mut metadata = ObjectMetadata::project("secret", vec![root]);
        metadata.encoding = Encoding::Encrypted;
        stores[0].insert(root, ChunkKind::MetaData, metadata.to_bytes().unwrap());

        let (engine, terminal) = engine_with(1, servers.clone(), servers);
        let err = engine.execute(&root).unwrap_err();
        assert!(matches!(err, ReplicationError::EncryptedProject(_)));
        assert_eq!(*terminal.0.lock().unwrap(), ["failed"]);
    }

    #[test]
    fn unreplicable_chunk_makes_run_incomplete() {
        let (stores, servers) = memory_stores(&["reader", "writer"]);
        let key = SigningKey::generate();
        let hash = ProjectPublisher::new(vec![servers[0].clone()], &key)
            .publish_file("f", b"only on the reader")
            .unwrap();
        // The writer knows the file but has none of its data to copy from.
        let record = stores[0].get_chunk(&hash, ChunkKind::MetaData).unwrap();
        stores[1].insert(hash, ChunkKind::MetaData, record);

        let (engine, terminal) = engine_with(1, vec![servers[0].clone()], vec![servers[1].clone()]);
        let err = engine.execute(&hash).unwrap_err();
        match err {
            ReplicationError::Incomplete {
                data_failed,
                meta_data_failed,
                manifest_failed,
            } => assert_eq!((data_failed, meta_data_failed, manifest_failed), (1, 0, 0)),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*terminal.0.lock().unwrap(), ["failed"]);
    }

    #[test]
    fn duplicate_members_are_replicated_once() {
        let (stores, servers) = memory_stores(&["a", "b"]);
        let key = SigningKey::generate();
        let publisher = ProjectPublisher::new(vec![servers[0].clone()], &key);
        let file = publisher.publish_file("same", b"identical bytes").unwrap();
        let mut manifest = ProjectManifest::new("twins", "").unwrap();
        manifest.add_part(ChunkReference::new("one", file, vec![])).unwrap();
        manifest.add_part(ChunkReference::new("two", file, vec![])).unwrap();
        let root = publisher.publish_project(&mut manifest).unwrap();

        let (engine, _) = engine_with(2, servers.clone(), servers);
        engine.execute(&root).unwrap();
        let snap = engine.stats().snapshot();
        assert_eq!(snap.meta_data.replicated, 2);
        assert_eq!(snap.data.replicated, 1);
        assert_eq!(snap.handled_bytes, snap.total_bytes);
        assert!(stores[1].contains(&file, ChunkKind::Data));
    }

    #[test]
    fn oversized_declared_sizes_saturate() {
        let (stores, servers) = memory_stores(&["a", "b"]);
        let key = SigningKey::generate();
        let publisher = ProjectPublisher::new(servers.clone(), &key);
        let mut manifest = ProjectManifest::new("huge", "").unwrap();
        for name in ["left", "right"] {
            let file = publisher.publish_file(name, name.as_bytes()).unwrap();
            manifest.add_part(ChunkReference::new(name, file, vec![])).unwrap();
            for store in &stores {
                let raw = store.get_chunk(&file, ChunkKind::MetaData).unwrap();
                let mut record = ObjectMetadata::from_bytes(&raw).unwrap();
                record.size = u64::MAX / 2 + 1;
                store.insert(file, ChunkKind::MetaData, record.to_bytes().unwrap());
            }
        }
        let root = publisher.publish_project(&mut manifest).unwrap();

        let (engine, terminal) = engine_with(2, servers.clone(), servers);
        engine.execute(&root).unwrap();

        let snap = engine.stats().snapshot();
        assert_eq!(snap.total_bytes, u64::MAX);
        assert_eq!(snap.handled_bytes, u64::MAX);
        assert_eq!(*terminal.0.lock().unwrap(), ["finished"]);
    }

    /// Serves one metadata record once, then claims not to have it.
    struct ForgetfulReader {
        inner: Arc<InMemoryChunkStore>,
        forget: ChunkHash,
        served: AtomicBool,
    }

    impl ChunkStore for ForgetfulReader {
        fn host(&self) -> &str {
            self.inner.host()
        }

        fn has_chunk(&self, hash: &ChunkHash, kind: ChunkKind) -> StoreResult<bool> {
            self.inner.has_chunk(hash, kind)
        }

        fn get_chunk(&self, hash: &ChunkHash, kind: ChunkKind) -> StoreResult<Bytes> {
            if *hash == self.forget
                && kind == ChunkKind::MetaData
                && self.served.swap(true, Ordering::SeqCst)
            {
                return Err(StoreError::NotFound { hash: *hash, kind });
            }
            self.inner.get_chunk(hash, kind)
        }

        fn set_chunk(
            &self,
            signature: &ChunkSignature,
            hash: &ChunkHash,
            kind: ChunkKind,
            data: &Bytes,
        ) -> StoreResult<PushOutcome> {
            self.inner.set_chunk(signature, hash, kind, data)
        }

        fn configuration(&self, identity: &VerifyingKey) -> StoreResult<ServerConfiguration> {
            self.inner.configuration(identity)
        }
    }

    #[test]
    fn lost_member_metadata_fails_only_that_file() {
        let (stores, servers) = memory_stores(&["reader", "writer"]);
        let key = SigningKey::generate();
        let publisher = ProjectPublisher::new(servers.clone(), &key);
        let kept = publisher.publish_file("kept", b"still listed").unwrap();
        let lost = publisher.publish_file("lost", b"listed only once").unwrap();
        let mut manifest = ProjectManifest::new("pair", "").unwrap();
        manifest.add_part(ChunkReference::new("kept", kept, vec![])).unwrap();
        manifest.add_part(ChunkReference::new("lost", lost, vec![])).unwrap();
        let root = publisher.publish_project(&mut manifest).unwrap();

        let reader: Arc<dyn ChunkStore> = Arc::new(ForgetfulReader {
            inner: stores[0].clone(),
            forget: lost,
            served: AtomicBool::new(false),
        });
        let mut config = ReplicationConfig::default()
            .with_required_replications(1)
            .with_workers(2);
        config.metadata_cache_capacity = 0;
        let mut engine = ReplicationEngine::new(
            config,
            Arc::new(SigningKey::generate()),
            vec![reader],
            vec![servers[1].clone()],
        );
        let terminal = Arc::new(Terminal::default());
        engine.add_listener(terminal.clone());

        let err = engine.execute(&root).unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::Incomplete {
                data_failed: 0,
                meta_data_failed: 1,
                manifest_failed: 0,
            }
        ));
        let snap = engine.stats().snapshot();
        assert_eq!(snap.meta_data.skipped, 2);
        assert_eq!(snap.data.skipped, 1);
        assert_eq!(snap.handled_bytes, snap.total_bytes);
        assert_eq!(*terminal.0.lock().unwrap(), ["failed"]);
    }

    struct FixedConnector(Vec<(String, Arc<dyn ChunkStore>)>);

    impl Connector for FixedConnector {
        fn connect(&self, host: &str) -> StoreResult<Arc<dyn ChunkStore>> {
            self.0
                .iter()
                .find(|(h, _)| h == host)
                .map(|(_, s)| s.clone())
                .ok_or_else(|| hoard_store::StoreError::Unreachable(host.to_owned()))
        }
    }

    #[test]
    fn discovery_splits_read_and_write_sets() {
        let (stores, servers) = memory_stores(&["core", "readonly", "offline"]);
        let connector = FixedConnector(
            ["core", "readonly", "offline"]
                .iter()
                .map(|h| h.to_string())
                .zip(servers)
                .collect(),
        );
        let mut readonly = PeerDescriptor::new("readonly");
        readonly.writable = false;
        let mut offline = PeerDescriptor::new("offline");
        offline.online = false;
        let mut core = PeerDescriptor::new("core");
        core.hash_spans = vec![HashSpan::full()];
        let topology = StaticTopology::new(vec![
            core,
            readonly,
            offline,
            PeerDescriptor::new("vanished"),
        ]);

        let engine = ReplicationEngine::discover(
            ReplicationConfig::default(),
            Arc::new(SigningKey::generate()),
            &topology,
            &connector,
        );
        let hosts = |servers: &[Arc<dyn ChunkStore>]| {
            servers.iter().map(|s| s.host().to_owned()).collect::<Vec<_>>()
        };
        assert_eq!(hosts(engine.read_servers()), ["core", "readonly"]);
        assert_eq!(hosts(engine.write_servers()), ["core"]);

        stores[0].set_online(false);
        let spans = engine
            .spans
            .spans_for(engine.write_servers()[0].as_ref(), &SigningKey::generate());
        assert_eq!(&*spans, &[HashSpan::full()]);
    }
}
