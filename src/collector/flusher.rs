use crate::collector::buffer::CollectionBuffer;
use crate::collector::entry::LogEntry;
use crate::pipeline::lock;
use crate::storage::jsonl::append_lines;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error};

pub const COLLECTED_PREFIX: &str = "collected_";

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("failed to encode entry from {source_name}: {error}")]
    Encode {
        source_name: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("failed to write {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

/// Outcome of one flush pass over the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sources_written: usize,
    pub entries_written: usize,
    pub sources_failed: usize,
}

/// Moves buffered entries into `collected_<source>` files.
#[derive(Debug, Clone)]
pub struct Flusher {
    output_dir: PathBuf,
}

impl Flusher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn collected_path(&self, source: &str) -> PathBuf {
        self.output_dir.join(format!("{}{}", COLLECTED_PREFIX, source))
    }

    /// Append `entries` to the source's collected file. Nothing is written
    /// unless every entry encodes.
    pub fn write_batch(&self, source: &str, entries: &[LogEntry]) -> Result<usize, FlushError> {
        let lines = entries
            .iter()
            .map(|entry| {
                entry.to_json_line().map_err(|error| FlushError::Encode {
                    source_name: source.to_string(),
                    error,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let path = self.collected_path(source);
        append_lines(&path, &lines).map_err(|error| FlushError::Io { path, error })?;
        Ok(lines.len())
    }

    /// Drain the buffer and write every non-empty source.
    ///
    /// The buffer lock is only held while draining and restoring; a source
    /// whose write fails gets its entries back at the front of its bucket.
    pub fn flush(&self, buffer: &Mutex<CollectionBuffer>) -> FlushReport {
        let drained = lock(buffer).drain_all();
        let mut report = FlushReport::default();

        for (source, entries) in drained {
            match self.write_batch(&source, &entries) {
                Ok(count) => {
                    debug!(
                        source = %source,
                        count,
                        path = %self.collected_path(&source).display(),
                        "Flushed collected entries"
                    );
                    report.sources_written += 1;
                    report.entries_written += count;
                }
                Err(e) => {
                    error!(
                        source = %source,
                        pending = entries.len(),
                        error = %e,
                        "Flush failed, keeping entries for retry"
                    );
                    report.sources_failed += 1;
                    lock(buffer).restore(&source, entries);
                }
            }
        }

        report
    }
}
