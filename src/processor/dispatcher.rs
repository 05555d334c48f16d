use crate::config::types::ProcessorConfig;
use crate::processor::category::Router;
use crate::processor::enrich::enrich;
use crate::storage::jsonl::append_durable;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Suffix a collected file gets while the processor owns it.
pub const CLAIM_SUFFIX: &str = ".processing";
pub const PROCESSED_PREFIX: &str = "processed_";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to list {path}: {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is still claimed by an unfinished run")]
    AlreadyClaimed { path: PathBuf },

    #[error("failed to claim {path}: {source}")]
    Claim {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode processed entry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove processed input {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchTotals {
    pub total_processed: u64,
    pub files_processed: u64,
    pub files_failed: u64,
}

/// Turns collected files into processed files, one file at a time.
#[derive(Debug)]
pub struct ProcessingDispatcher {
    input_dir: PathBuf,
    output_dir: PathBuf,
    input_prefix: String,
    router: Router,
    total_processed: AtomicU64,
    files_processed: AtomicU64,
    files_failed: AtomicU64,
}

impl ProcessingDispatcher {
    pub fn new(config: &ProcessorConfig) -> Self {
        Self {
            input_dir: config.input_dir.clone(),
            output_dir: config.output_dir.clone(),
            input_prefix: config.input_prefix.clone(),
            router: Router::new(config.routes.clone()),
            total_processed: AtomicU64::new(0),
            files_processed: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn totals(&self) -> DispatchTotals {
        DispatchTotals {
            total_processed: self.total_processed.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
        }
    }

    pub fn processed_path(&self, collected_name: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}{}", PROCESSED_PREFIX, collected_name))
    }

    /// Collected files waiting in the input directory. Files left claimed by
    /// an earlier failed attempt come first, then fresh files, each group in
    /// name order.
    pub fn pending_files(&self) -> Result<Vec<PathBuf>, DispatchError> {
        let list_err = |source| DispatchError::ListDir {
            path: self.input_dir.clone(),
            source,
        };

        let mut claimed = Vec::new();
        let mut fresh = Vec::new();
        for entry in std::fs::read_dir(&self.input_dir).map_err(list_err)? {
            let path = entry.map_err(list_err)?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&self.input_prefix) || !path.is_file() {
                continue;
            }
            if name.ends_with(CLAIM_SUFFIX) {
                claimed.push(path);
            } else {
                fresh.push(path);
            }
        }

        claimed.sort();
        fresh.sort();
        claimed.extend(fresh);
        Ok(claimed)
    }

    /// Process one collected (or previously claimed) file.
    ///
    /// Returns the number of entries written. On failure the error is logged,
    /// 0 is returned and the input stays in the input directory (under its
    /// claimed name once the claim succeeded) to be retried.
    pub fn process_file(&self, path: &Path) -> usize {
        match self.try_process_file(path) {
            Ok(count) => {
                self.total_processed.fetch_add(count as u64, Ordering::Relaxed);
                self.files_processed.fetch_add(1, Ordering::Relaxed);
                count
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to process collected file");
                self.files_failed.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Process every pending file, stopping early between files once
    /// `cancel` fires. Returns the number of entries written.
    pub fn process_pending(&self, cancel: &CancellationToken) -> usize {
        let files = match self.pending_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Could not list collected files");
                return 0;
            }
        };

        let mut total = 0;
        for path in files {
            if cancel.is_cancelled() {
                debug!("Cancelled between files");
                break;
            }
            total += self.process_file(&path);
        }
        total
    }

    fn try_process_file(&self, path: &Path) -> Result<usize, DispatchError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (claimed, collected_name) = match file_name.strip_suffix(CLAIM_SUFFIX) {
            Some(base) => {
                info!(path = %path.display(), "Resuming previously claimed file");
                (path.to_path_buf(), base.to_string())
            }
            None => (self.claim(path, &file_name)?, file_name.clone()),
        };

        let category = self.router.route(&collected_name);
        let bytes = std::fs::read(&claimed).map_err(|source| DispatchError::Read {
            path: claimed.clone(),
            source,
        })?;
        let content = String::from_utf8_lossy(&bytes);

        let mut lines = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(fields)) => {
                    lines.push(serde_json::to_string(&enrich(category, fields))?);
                }
                Ok(_) => {
                    warn!(file = %collected_name, line = idx + 1, "Skipping non-object line")
                }
                Err(e) => warn!(
                    file = %collected_name,
                    line = idx + 1,
                    error = %e,
                    "Skipping malformed line"
                ),
            }
        }

        let output = self.processed_path(&collected_name);
        append_durable(&output, &lines).map_err(|source| DispatchError::Write {
            path: output.clone(),
            source,
        })?;
        std::fs::remove_file(&claimed).map_err(|source| DispatchError::Remove {
            path: claimed.clone(),
            source,
        })?;

        info!(
            file = %collected_name,
            category = %category,
            entries = lines.len(),
            output = %output.display(),
            "Processed collected file"
        );
        Ok(lines.len())
    }

    fn claim(&self, path: &Path, file_name: &str) -> Result<PathBuf, DispatchError> {
        let claimed = path.with_file_name(format!("{}{}", file_name, CLAIM_SUFFIX));
        if claimed.exists() {
            return Err(DispatchError::AlreadyClaimed { path: claimed });
        }
        std::fs::rename(path, &claimed).map_err(|source| DispatchError::Claim {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Dirs {
        input: TempDir,
        output: TempDir,
    }

    fn setup() -> (Dirs, ProcessingDispatcher) {
        let dirs = Dirs {
            input: TempDir::new().unwrap(),
            output: TempDir::new().unwrap(),
        };
        let config = ProcessorConfig {
            input_dir: dirs.input.path().to_path_buf(),
            output_dir: dirs.output.path().to_path_buf(),
            ..ProcessorConfig::default()
        };
        let dispatcher = ProcessingDispatcher::new(&config);
        (dirs, dispatcher)
    }

    fn read_records(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_process_file_enriches_and_removes_input() {
        let (dirs, dispatcher) = setup();
        let input = dirs.input.path().join("collected_error.log");
        std::fs::write(
            &input,
            "{\"message\":\"Database connection refused\",\"log_level\":\"INFO\"}\n\n\
             {\"message\":\"upstream timeout\"}\n",
        )
        .unwrap();

        assert_eq!(dispatcher.process_file(&input), 2);
        assert!(!input.exists());
        assert!(!dirs.input.path().join("collected_error.log.processing").exists());

        let records = read_records(&dispatcher.processed_path("collected_error.log"));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["error_type"], "connection");
        assert_eq!(records[1]["error_type"], "timeout");
        assert_eq!(records[0]["log_level"], "ERROR");

        let totals = dispatcher.totals();
        assert_eq!(totals.total_processed, 2);
        assert_eq!(totals.files_processed, 1);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let (dirs, dispatcher) = setup();
        let input = dirs.input.path().join("collected_job-execution.log");
        std::fs::write(
            &input,
            "{\"status\":\"failed\"}\nnot json\n[1,2]\n{\"status\":\"ok\"}\n",
        )
        .unwrap();

        assert_eq!(dispatcher.process_file(&input), 2);
        let records = read_records(&dispatcher.processed_path("collected_job-execution.log"));
        assert_eq!(records[0]["log_level"], "ERROR");
        assert_eq!(records[1]["log_level"], "INFO");
    }

    #[test]
    fn test_output_is_appended_across_batches() {
        let (dirs, dispatcher) = setup();
        let input = dirs.input.path().join("collected_app.log");

        let output = dispatcher.processed_path("collected_app.log");

        std::fs::write(&input, "{\"message\":\"one\"}\n").unwrap();
        dispatcher.process_file(&input);
        let first = std::fs::metadata(&output).unwrap();
        std::fs::write(&input, "{\"message\":\"two\"}\n").unwrap();
        dispatcher.process_file(&input);

        let records = read_records(&output);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["message"], "one");
        assert_eq!(records[1]["message"], "two");
        assert_eq!(records[0]["log_category"], "unknown");

        // Later batches extend the same file rather than replacing it.
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            assert_eq!(std::fs::metadata(&output).unwrap().ino(), first.ino());
        }
        #[cfg(not(unix))]
        let _ = first;
    }

    #[test]
    fn test_write_failure_leaves_input() {
        let input_dir = TempDir::new().unwrap();
        let config = ProcessorConfig {
            input_dir: input_dir.path().to_path_buf(),
            output_dir: input_dir.path().join("missing"),
            ..ProcessorConfig::default()
        };
        let dispatcher = ProcessingDispatcher::new(&config);
        let input = input_dir.path().join("collected_access.log");
        std::fs::write(&input, "{\"status_code\":200}\n").unwrap();

        assert_eq!(dispatcher.process_file(&input), 0);
        assert_eq!(dispatcher.totals().files_failed, 1);

        let pending = dispatcher.pending_files().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            std::fs::read_to_string(&pending[0]).unwrap(),
            "{\"status_code\":200}\n"
        );
    }

    #[test]
    fn test_leftover_claim_is_resumed_first() {
        let (dirs, dispatcher) = setup();
        std::fs::write(
            dirs.input.path().join("collected_access.log.processing"),
            "{\"path\":\"/old\"}\n",
        )
        .unwrap();
        std::fs::write(
            dirs.input.path().join("collected_access.log"),
            "{\"path\":\"/new\"}\n",
        )
        .unwrap();
        std::fs::write(dirs.input.path().join(".collected_access.log.tmp"), "x\n").unwrap();
        std::fs::write(dirs.input.path().join("collection_stats.json"), "{}").unwrap();

        let pending = dispatcher.pending_files().unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].to_string_lossy().ends_with(CLAIM_SUFFIX));

        assert_eq!(dispatcher.process_pending(&CancellationToken::new()), 2);
        let records = read_records(&dispatcher.processed_path("collected_access.log"));
        assert_eq!(records[0]["endpoint"], "/old");
        assert_eq!(records[1]["endpoint"], "/new");
        assert!(dispatcher.pending_files().unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_processes_nothing() {
        let (dirs, dispatcher) = setup();
        std::fs::write(dirs.input.path().join("collected_a.log"), "{}\n").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(dispatcher.process_pending(&cancel), 0);
        assert_eq!(dispatcher.pending_files().unwrap().len(), 1);
    }
}
