use crate::collector::buffer::CollectionBuffer;
use crate::collector::classify::classify;
use crate::collector::flusher::{FlushReport, Flusher};
use crate::config::types::{CollectorConfig, ReadStart};
use crate::pipeline::{lock, PeriodicTask, Scheduler};
use crate::source::reader::{commit, LogReader};
use crate::source::tracker::FileOffsetTracker;
use crate::stats::{host_name, CollectionStats, StatsReporter, COLLECTION_STATS_FILE};
use crate::storage::checkpoint::{CheckpointManager, OffsetCheckpoint};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list {path}: {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of one pass over the logs directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub files_seen: usize,
    pub lines_read: usize,
    pub entries_buffered: usize,
    pub files_failed: usize,
}

/// Everything the collector's periodic tasks share.
pub struct CollectorState {
    config: CollectorConfig,
    tracker: Mutex<FileOffsetTracker>,
    buffer: Mutex<CollectionBuffer>,
    flusher: Flusher,
    checkpoint: Option<CheckpointManager>,
    initial_scan_done: AtomicBool,
}

impl CollectorState {
    /// Prepare the output directory and restore saved offsets.
    pub fn new(config: CollectorConfig) -> Result<Self, CollectorError> {
        std::fs::create_dir_all(&config.output_dir).map_err(|source| {
            CollectorError::OutputDir {
                path: config.output_dir.clone(),
                source,
            }
        })?;

        let checkpoint = config
            .checkpoint
            .then(|| CheckpointManager::new(&config.output_dir));
        let tracker = match &checkpoint {
            Some(manager) => manager.restore_tracker(),
            None => FileOffsetTracker::new(),
        };
        if !tracker.is_empty() {
            info!(files = tracker.len(), "Resuming from saved offsets");
        }

        Ok(Self {
            flusher: Flusher::new(&config.output_dir),
            tracker: Mutex::new(tracker),
            buffer: Mutex::new(CollectionBuffer::new()),
            checkpoint,
            initial_scan_done: AtomicBool::new(false),
            config,
        })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Mutex<CollectionBuffer> {
        &self.buffer
    }

    pub fn tracker(&self) -> &Mutex<FileOffsetTracker> {
        &self.tracker
    }

    /// Watched files in the logs directory, sorted by path.
    pub fn discover_files(&self) -> Result<Vec<PathBuf>, CollectorError> {
        let logs_dir = &self.config.logs_dir;
        let list_err = |source| CollectorError::ListDir {
            path: logs_dir.clone(),
            source,
        };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(logs_dir).map_err(list_err)? {
            let entry = entry.map_err(list_err)?;
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&self.config.file_suffix));
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read new lines from every watched file into the buffer.
    ///
    /// Offsets are committed only after a file's entries are in the buffer.
    /// `read_start: end` applies to the files present at the first scan;
    /// files that appear later are read from the beginning.
    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();

        let files = match self.discover_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Logs directory scan failed");
                return report;
            }
        };

        let reader = if self.initial_scan_done.swap(true, Ordering::SeqCst) {
            LogReader::new(ReadStart::Beginning)
        } else {
            LogReader::new(self.config.read_start)
        };

        let mut advanced = false;
        for path in &files {
            report.files_seen += 1;
            match self.scan_file(&reader, path) {
                Some((lines, entries, changed)) => {
                    report.lines_read += lines;
                    report.entries_buffered += entries;
                    advanced |= changed;
                }
                None => report.files_failed += 1,
            }
        }

        if advanced {
            self.save_checkpoint();
        }
        if report.entries_buffered > 0 {
            debug!(
                files = report.files_seen,
                entries = report.entries_buffered,
                "Scan buffered new entries"
            );
        }
        report
    }

    fn scan_file(&self, reader: &LogReader, path: &Path) -> Option<(usize, usize, bool)> {
        // Scans are the only writer of the tracker, so peeking with a
        // released lock and committing afterwards cannot race.
        let pending = {
            let tracker = lock(&self.tracker);
            reader.peek(path, &tracker)
        };
        let pending = match pending {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to read log file");
                return None;
            }
        };

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let entries: Vec<_> = pending
            .lines
            .iter()
            .filter_map(|line| classify(line, &source))
            .collect();
        let buffered = entries.len();

        if buffered > 0 {
            lock(&self.buffer).extend(&source, entries);
        }
        let changed = commit(&mut lock(&self.tracker), &pending);

        Some((pending.lines.len(), buffered, changed))
    }

    fn save_checkpoint(&self) {
        let Some(manager) = &self.checkpoint else {
            return;
        };
        let snapshot = OffsetCheckpoint::capture(&lock(&self.tracker));
        if let Err(e) = manager.save(&snapshot) {
            warn!(error = %e, "Failed to save offset checkpoint");
        }
    }

    pub fn flush(&self) -> FlushReport {
        self.flusher.flush(&self.buffer)
    }

    pub fn stats_snapshot(&self) -> CollectionStats {
        let (monitored_files, file_positions) = {
            let tracker = lock(&self.tracker);
            (tracker.len(), tracker.offsets_by_path())
        };
        let (pending_logs, stats) = {
            let buffer = lock(&self.buffer);
            (buffer.pending_by_source(), buffer.stats())
        };

        CollectionStats {
            timestamp: Utc::now(),
            host: host_name(),
            monitored_files,
            file_positions,
            pending_logs,
            total_pending: stats.total_pending,
            total_collected: stats.total_appended,
            total_flushed: stats.total_drained,
        }
    }
}

struct ScanTask(Arc<CollectorState>);

#[async_trait]
impl PeriodicTask for ScanTask {
    fn name(&self) -> &str {
        "collector-scan"
    }

    async fn tick(&self, _cancel: &CancellationToken) {
        let state = Arc::clone(&self.0);
        if let Err(e) = tokio::task::spawn_blocking(move || state.scan()).await {
            error!(error = %e, "Scan task panicked");
        }
    }
}

struct FlushTask(Arc<CollectorState>);

impl FlushTask {
    async fn flush(&self) -> Option<FlushReport> {
        let state = Arc::clone(&self.0);
        match tokio::task::spawn_blocking(move || state.flush()).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Flush task panicked");
                None
            }
        }
    }
}

#[async_trait]
impl PeriodicTask for FlushTask {
    fn name(&self) -> &str {
        "collector-flush"
    }

    async fn tick(&self, _cancel: &CancellationToken) {
        if let Some(report) = self.flush().await {
            if report.entries_written > 0 {
                info!(
                    sources = report.sources_written,
                    entries = report.entries_written,
                    "Flushed collected logs"
                );
            }
        }
    }

    async fn shutdown(&self) {
        if let Some(report) = self.flush().await {
            info!(
                entries = report.entries_written,
                failed_sources = report.sources_failed,
                "Final flush complete"
            );
        }
    }
}

struct CollectorStatsTask {
    state: Arc<CollectorState>,
    reporter: StatsReporter,
}

#[async_trait]
impl PeriodicTask for CollectorStatsTask {
    fn name(&self) -> &str {
        "collector-stats"
    }

    async fn tick(&self, _cancel: &CancellationToken) {
        let snapshot = self.state.stats_snapshot();
        match self.reporter.write(&snapshot) {
            Ok(()) => info!(
                monitored_files = snapshot.monitored_files,
                total_pending = snapshot.total_pending,
                total_collected = snapshot.total_collected,
                "Collection stats"
            ),
            Err(e) => warn!(error = %e, "Failed to write collection stats"),
        }
    }
}

pub struct CollectorRunner;

impl CollectorRunner {
    /// Build the collector state and register its tasks with `scheduler`.
    pub fn start(
        config: CollectorConfig,
        scheduler: &mut Scheduler,
    ) -> Result<Arc<CollectorState>, CollectorError> {
        info!(
            logs_dir = %config.logs_dir.display(),
            output_dir = %config.output_dir.display(),
            suffix = %config.file_suffix,
            "Starting collector"
        );

        let scan_interval = config.scan_interval;
        let flush_interval = config.flush_interval;
        let stats_interval = config.stats_interval;
        let reporter = StatsReporter::new(config.output_dir.join(COLLECTION_STATS_FILE));
        let state = Arc::new(CollectorState::new(config)?);

        scheduler.spawn(Arc::new(ScanTask(Arc::clone(&state))), scan_interval);
        scheduler.spawn(Arc::new(FlushTask(Arc::clone(&state))), flush_interval);
        scheduler.spawn(
            Arc::new(CollectorStatsTask {
                state: Arc::clone(&state),
                reporter,
            }),
            stats_interval,
        );

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn config_for(logs: &Path, out: &Path) -> CollectorConfig {
        CollectorConfig {
            logs_dir: logs.to_path_buf(),
            output_dir: out.to_path_buf(),
            ..CollectorConfig::default()
        }
    }

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_discover_filters_by_suffix() {
        let logs = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        append(&logs.path().join("b.log"), "x\n");
        append(&logs.path().join("a.log"), "x\n");
        append(&logs.path().join("notes.txt"), "x\n");
        std::fs::create_dir(logs.path().join("dir.log")).unwrap();

        let state = CollectorState::new(config_for(logs.path(), out.path())).unwrap();
        let files = state.discover_files().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.log", "b.log"]);
    }

    #[test]
    fn test_scan_buffers_and_advances() {
        let logs = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let log = logs.path().join("error.log");
        append(&log, "boom\nbang\npartial");

        let state = CollectorState::new(config_for(logs.path(), out.path())).unwrap();
        let report = state.scan();
        assert_eq!(report.entries_buffered, 2);
        assert_eq!(lock(state.buffer()).pending("error.log"), 2);
        assert_eq!(lock(state.tracker()).offset(&log), 10);

        assert_eq!(state.scan().entries_buffered, 0);

        append(&log, " line\n");
        assert_eq!(state.scan().entries_buffered, 1);
    }

    #[test]
    fn test_missing_logs_dir_is_not_fatal() {
        let out = TempDir::new().unwrap();
        let state =
            CollectorState::new(config_for(Path::new("/nonexistent/logs"), out.path())).unwrap();
        assert_eq!(state.scan(), ScanReport::default());
    }

    #[test]
    fn test_read_start_end_only_applies_to_initial_files() {
        let logs = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        append(&logs.path().join("old.log"), "history\n");

        let mut config = config_for(logs.path(), out.path());
        config.read_start = ReadStart::End;
        let state = CollectorState::new(config).unwrap();

        assert_eq!(state.scan().entries_buffered, 0);

        append(&logs.path().join("new.log"), "fresh\n");
        append(&logs.path().join("old.log"), "appended\n");
        state.scan();

        let buffer = lock(state.buffer());
        assert_eq!(buffer.pending("new.log"), 1);
        assert_eq!(buffer.pending("old.log"), 1);
    }

    #[test]
    fn test_checkpoint_prevents_reread_after_restart() {
        let logs = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        append(&logs.path().join("app.log"), "one\ntwo\n");

        let first = CollectorState::new(config_for(logs.path(), out.path())).unwrap();
        assert_eq!(first.scan().entries_buffered, 2);
        first.flush();
        drop(first);

        append(&logs.path().join("app.log"), "three\n");
        let second = CollectorState::new(config_for(logs.path(), out.path())).unwrap();
        assert_eq!(second.scan().entries_buffered, 1);
    }

    #[test]
    fn test_stats_snapshot_counts() {
        let logs = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        append(&logs.path().join("a.log"), "1\n2\n");
        append(&logs.path().join("b.log"), "3\n");

        let state = CollectorState::new(config_for(logs.path(), out.path())).unwrap();
        state.scan();
        state.flush();
        append(&logs.path().join("b.log"), "4\n");
        state.scan();

        let stats = state.stats_snapshot();
        assert_eq!(stats.monitored_files, 2);
        assert_eq!(stats.total_collected, 4);
        assert_eq!(stats.total_flushed, 3);
        assert_eq!(stats.total_pending, 1);
        assert_eq!(stats.pending_logs.get("a.log"), Some(&0));
        assert_eq!(stats.pending_logs.get("b.log"), Some(&1));
    }

    #[tokio::test]
    async fn test_runner_final_flush_on_shutdown() {
        let logs = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        append(&logs.path().join("job.log"), "{\"status\":\"started\"}\n");

        let mut config = config_for(logs.path(), out.path());
        config.scan_interval = std::time::Duration::from_millis(10);
        config.flush_interval = std::time::Duration::from_secs(3600);
        config.stats_interval = std::time::Duration::from_secs(3600);

        let mut scheduler = Scheduler::new(CancellationToken::new());
        let state = CollectorRunner::start(config, &mut scheduler).unwrap();

        for _ in 0..100 {
            if lock(state.buffer()).pending("job.log") == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        scheduler.shutdown().await;

        let collected = std::fs::read_to_string(out.path().join("collected_job.log")).unwrap();
        assert_eq!(collected.lines().count(), 1);
        assert!(out.path().join(COLLECTION_STATS_FILE).exists());
    }

    #[tokio::test]
    async fn test_shutdown_during_scan_flushes_everything_read() {
        let logs = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let body: String = (0..200_000).map(|i| format!("request {} ok\n", i)).collect();
        append(&logs.path().join("big.log"), &body);

        let mut config = config_for(logs.path(), out.path());
        config.scan_interval = std::time::Duration::from_millis(10);
        config.flush_interval = std::time::Duration::from_secs(3600);
        config.stats_interval = std::time::Duration::from_secs(3600);

        let mut scheduler = Scheduler::new(CancellationToken::new());
        let state = CollectorRunner::start(config, &mut scheduler).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        scheduler.shutdown().await;

        let stats = state.stats_snapshot();
        assert_eq!(stats.total_pending, 0);
        let written = std::fs::read_to_string(out.path().join("collected_big.log"))
            .map(|text| text.lines().count() as u64)
            .unwrap_or(0);
        assert_eq!(written, stats.total_collected);
        assert_eq!(stats.total_flushed, stats.total_collected);
    }
}
