use std::sync::Arc;

use hoard_types::ChunkHash;

use crate::injector::ChunkRole;
use crate::stats::{Outcome, ReplicationStats};

/// Observer of a replication run.
///
/// Every method has an empty default. Chunk and file events arrive from
/// several threads at once.
#[allow(unused_variables)]
pub trait ReplicationListener: Send + Sync {
    /// A run began. `stats` stays live for the whole run.
    fn started(&self, stats: Arc<ReplicationStats>) {}

    fn failed(&self) {}

    fn finished(&self) {}

    fn data_chunk_replicated(&self, hash: &ChunkHash) {}

    fn data_chunk_skipped(&self, hash: &ChunkHash) {}

    fn data_chunk_failed(&self, hash: &ChunkHash) {}

    fn meta_data_chunk_replicated(&self, hash: &ChunkHash) {}

    fn meta_data_chunk_skipped(&self, hash: &ChunkHash) {}

    fn meta_data_chunk_failed(&self, hash: &ChunkHash) {}

    fn file_finished(&self, hash: &ChunkHash) {}

    fn file_failed(&self, hash: &ChunkHash) {}
}

/// Fans events out to listeners while keeping the run's counters.
///
/// Manifest chunks are stored as data, so they reach listeners as data
/// events but are counted separately.
pub struct EventSink {
    stats: Arc<ReplicationStats>,
    listeners: Vec<Arc<dyn ReplicationListener>>,
}

impl EventSink {
    pub fn new(listeners: Vec<Arc<dyn ReplicationListener>>) -> Self {
        Self {
            stats: Arc::new(ReplicationStats::default()),
            listeners,
        }
    }

    pub fn stats(&self) -> &Arc<ReplicationStats> {
        &self.stats
    }

    pub(crate) fn started(&self) {
        for l in &self.listeners {
            l.started(self.stats.clone());
        }
    }

    pub(crate) fn finished(&self) {
        for l in &self.listeners {
            l.finished();
        }
    }

    pub(crate) fn failed(&self) {
        for l in &self.listeners {
            l.failed();
        }
    }

    pub(crate) fn chunk_replicated(&self, role: ChunkRole, hash: &ChunkHash) {
        self.stats.record(role, Outcome::Replicated);
        for l in &self.listeners {
            match role {
                ChunkRole::MetaData => l.meta_data_chunk_replicated(hash),
                ChunkRole::Data | ChunkRole::Manifest => l.data_chunk_replicated(hash),
            }
        }
    }

    pub(crate) fn chunk_skipped(&self, role: ChunkRole, hash: &ChunkHash) {
        self.stats.record(role, Outcome::Skipped);
        for l in &self.listeners {
            match role {
                ChunkRole::MetaData => l.meta_data_chunk_skipped(hash),
                ChunkRole::Data | ChunkRole::Manifest => l.data_chunk_skipped(hash),
            }
        }
    }

    pub(crate) fn chunk_failed(&self, role: ChunkRole, hash: &ChunkHash) {
        self.stats.record(role, Outcome::Failed);
        for l in &self.listeners {
            match role {
                ChunkRole::MetaData => l.meta_data_chunk_failed(hash),
                ChunkRole::Data | ChunkRole::Manifest => l.data_chunk_failed(hash),
            }
        }
    }

    pub(crate) fn file_finished(&self, hash: &ChunkHash, size: u64) {
        self.stats.add_handled_bytes(size);
        for l in &self.listeners {
            l.file_finished(hash);
        }
    }

    pub(crate) fn file_failed(&self, hash: &ChunkHash, size: u64) {
        self.stats.add_handled_bytes(size);
        for l in &self.listeners {
            l.file_failed(hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ReplicationListener for Recorder {
        fn data_chunk_replicated(&self, hash: &ChunkHash) {
            self.0.lock().unwrap().push(format!("data {}", hash.short_hex()));
        }

        fn meta_data_chunk_failed(&self, hash: &ChunkHash) {
            self.0.lock().unwrap().push(format!("meta-failed {}", hash.short_hex()));
        }
    }

    #[test]
    fn manifest_chunks_look_like_data_to_listeners() {
        let recorder = Arc::new(Recorder::default());
        let sink = EventSink::new(vec![recorder.clone() as Arc<dyn ReplicationListener>]);
        let hash = ChunkHash::compute(b"manifest bytes");

        sink.chunk_replicated(ChunkRole::Manifest, &hash);
        sink.chunk_failed(ChunkRole::MetaData, &hash);

        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(
            events,
            [format!("data {}", hash.short_hex()), format!("meta-failed {}", hash.short_hex())]
        );
        let snap = sink.stats().snapshot();
        assert_eq!(snap.manifest.replicated, 1);
        assert_eq!(snap.data.replicated, 0);
        assert_eq!(snap.meta_data.failed, 1);
    }

    #[test]
    fn file_events_advance_progress() {
        let sink = EventSink::new(Vec::new());
        sink.stats().set_total_bytes(10);
        sink.file_finished(&ChunkHash::compute(b"a"), 4);
        sink.file_failed(&ChunkHash::compute(b"b"), 6);
        assert_eq!(sink.stats().handled_bytes(), 10);
    }
}
