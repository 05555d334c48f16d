//! Periodic JSON snapshots describing the collector and processor.
//!
//! Snapshots are overwritten in place (via an atomic rename) so a reader
//! only ever sees the latest complete document.

use crate::storage::jsonl::write_atomic;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const COLLECTION_STATS_FILE: &str = "collection_stats.json";
pub const PROCESSING_STATS_FILE: &str = "processing_stats.json";

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("failed to encode stats: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write stats to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub monitored_files: usize,
    pub file_positions: BTreeMap<String, u64>,
    pub pending_logs: BTreeMap<String, usize>,
    pub total_pending: usize,
    pub total_collected: u64,
    pub total_flushed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingStats {
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub total_processed: u64,
    pub files_processed: u64,
    pub files_failed: u64,
    pub processing_rate_per_minute: f64,
    pub active_processors: usize,
    pub uptime_seconds: u64,
}

/// Writes one kind of snapshot to a fixed path.
#[derive(Debug, Clone)]
pub struct StatsReporter {
    path: PathBuf,
}

impl StatsReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write<T: Serialize>(&self, snapshot: &T) -> Result<(), StatsError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path, &bytes).map_err(|source| StatsError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Name of this machine, or "unknown" when it can't be determined.
pub fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Entries per minute over `uptime_seconds`, 0 until a full second has passed.
pub fn rate_per_minute(total: u64, uptime_seconds: u64) -> f64 {
    if uptime_seconds == 0 {
        return 0.0;
    }
    total as f64 * 60.0 / uptime_seconds as f64
}
