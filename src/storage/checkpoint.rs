use crate::source::tracker::{FileOffsetTracker, FilePosition};
use crate::storage::jsonl::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_FILE: &str = "offsets.json";
const CURRENT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint at {path} is not valid JSON: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Persisted collector offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffsetCheckpoint {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub files: HashMap<PathBuf, FilePosition>,
}

impl OffsetCheckpoint {
    pub fn capture(tracker: &FileOffsetTracker) -> Self {
        Self {
            version: CURRENT_VERSION,
            timestamp: Utc::now(),
            files: tracker.positions().clone(),
        }
    }

    pub fn into_tracker(self) -> FileOffsetTracker {
        FileOffsetTracker::from_positions(self.files)
    }
}

/// Loads and saves the offset checkpoint kept next to the collected files.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(CHECKPOINT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when no checkpoint exists or its version is unknown.
    pub fn load(&self) -> Result<Option<OffsetCheckpoint>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No offset checkpoint found");
                return Ok(None);
            }
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let checkpoint: OffsetCheckpoint =
            serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Decode {
                path: self.path.clone(),
                source,
            })?;

        if checkpoint.version != CURRENT_VERSION {
            tracing::warn!(
                "Checkpoint version mismatch: {} vs {}, ignoring checkpoint",
                checkpoint.version,
                CURRENT_VERSION
            );
            return Ok(None);
        }

        tracing::info!(
            files = checkpoint.files.len(),
            saved_at = %checkpoint.timestamp,
            "Loaded offset checkpoint"
        );
        Ok(Some(checkpoint))
    }

    pub fn save(&self, checkpoint: &OffsetCheckpoint) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        write_atomic(&self.path, &bytes).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(files = checkpoint.files.len(), "Offset checkpoint saved");
        Ok(())
    }

    /// Load the tracker, falling back to an empty one when the checkpoint is
    /// missing or unusable.
    pub fn restore_tracker(&self) -> FileOffsetTracker {
        match self.load() {
            Ok(Some(checkpoint)) => checkpoint.into_tracker(),
            Ok(None) => FileOffsetTracker::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable offset checkpoint");
                FileOffsetTracker::new()
            }
        }
    }
}
