use std::io::Write;
use std::sync::{Arc, Mutex};

use colored::Colorize;
use hoard_replication::{ReplicationListener, ReplicationStats, StatsSnapshot, TallySnapshot};
use hoard_types::ChunkHash;

/// Prints per-file progress and a closing summary table.
///
/// Output errors are ignored; a broken pipe must not abort replication.
pub struct CommandLineListener<W: Write + Send> {
    out: Mutex<W>,
    stats: Mutex<Option<Arc<ReplicationStats>>>,
}

impl CommandLineListener<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> CommandLineListener<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            stats: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().expect("lock poisoned")
    }

    fn line(&self, text: &str) {
        let mut out = self.out.lock().expect("lock poisoned");
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
    }

    fn progress(&self) -> String {
        let percent = self
            .stats
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|s| s.progress_percent())
            .unwrap_or(0.0);
        format_percent(percent)
    }

    fn summary(&self) {
        let snapshot = self
            .stats
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|s| s.snapshot())
            .unwrap_or_default();
        self.line(&render_summary(&snapshot));
    }
}

impl<W: Write + Send> ReplicationListener for CommandLineListener<W> {
    fn started(&self, stats: Arc<ReplicationStats>) {
        *self.stats.lock().expect("lock poisoned") = Some(stats);
        self.line(&format!("{}", "Replication started".bold()));
    }

    fn failed(&self) {
        self.summary();
        self.line(&format!("{} Replication failed", "✗".red().bold()));
    }

    fn finished(&self) {
        self.summary();
        self.line(&format!("{} Replication finished", "✓".green().bold()));
    }

    fn file_finished(&self, hash: &ChunkHash) {
        self.line(&format!("{} {} {}", self.progress(), "done  ".green(), hash.short_hex()));
    }

    fn file_failed(&self, hash: &ChunkHash) {
        self.line(&format!("{} {} {}", self.progress(), "failed".red(), hash.short_hex()));
    }
}

/// `[ 42.13%]`: two decimals, fixed width.
pub fn format_percent(percent: f64) -> String {
    format!("[{percent:>6.2}%]")
}

/// Fixed-width table of chunk outcomes.
pub fn render_summary(snapshot: &StatsSnapshot) -> String {
    let row = |label: &str, t: &TallySnapshot| {
        format!("{label:<10}{:>12}{:>12}{:>12}", t.replicated, t.skipped, t.failed)
    };
    [
        format!("{:<10}{:>12}{:>12}{:>12}", "", "replicated", "skipped", "failed"),
        row("data", &snapshot.data),
        row("meta-data", &snapshot.meta_data),
        row("manifest", &snapshot.manifest),
    ]
    .join("\n")
}
