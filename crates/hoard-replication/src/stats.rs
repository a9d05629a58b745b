use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one run. Shared with listeners and updated concurrently by
/// the engine's threads.
#[derive(Debug, Default)]
pub struct ReplicationStats {
    data: ChunkTally,
    meta_data: ChunkTally,
    manifest: ChunkTally,
    handled_bytes: AtomicU64,
    total_bytes: AtomicU64,
}

#[derive(Debug, Default)]
struct ChunkTally {
    replicated: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl ChunkTally {
    fn snapshot(&self) -> TallySnapshot {
        TallySnapshot {
            replicated: self.replicated.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Outcome counts for one class of chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TallySnapshot {
    pub replicated: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Point-in-time copy of [`ReplicationStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub data: TallySnapshot,
    pub meta_data: TallySnapshot,
    /// Data chunks holding a project manifest's bytes.
    pub manifest: TallySnapshot,
    pub handled_bytes: u64,
    pub total_bytes: u64,
}

impl StatsSnapshot {
    pub fn any_failed(&self) -> bool {
        self.data.failed + self.meta_data.failed + self.manifest.failed > 0
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Outcome {
    Replicated,
    Skipped,
    Failed,
}

impl ReplicationStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            data: self.data.snapshot(),
            meta_data: self.meta_data.snapshot(),
            manifest: self.manifest.snapshot(),
            handled_bytes: self.handled_bytes(),
            total_bytes: self.total_bytes(),
        }
    }

    pub fn handled_bytes(&self) -> u64 {
        self.handled_bytes.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Percentage of the run's bytes handled so far. Zero-size runs report
    /// 100.
    pub fn progress_percent(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 100.0;
        }
        self.handled_bytes() as f64 / total as f64 * 100.0
    }

    pub(crate) fn set_total_bytes(&self, bytes: u64) {
        self.total_bytes.store(bytes, Ordering::Relaxed);
    }

    /// Saturates at `u64::MAX`; sizes are declared by peers.
    pub(crate) fn add_handled_bytes(&self, bytes: u64) {
        let _ = self
            .handled_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |handled| {
                Some(handled.saturating_add(bytes))
            });
    }

    pub(crate) fn record(&self, role: crate::injector::ChunkRole, outcome: Outcome) {
        use crate::injector::ChunkRole;
        let tally = match role {
            ChunkRole::Data => &self.data,
            ChunkRole::MetaData => &self.meta_data,
            ChunkRole::Manifest => &self.manifest,
        };
        let counter = match outcome {
            Outcome::Replicated => &tally.replicated,
            Outcome::Skipped => &tally.skipped,
            Outcome::Failed => &tally.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
