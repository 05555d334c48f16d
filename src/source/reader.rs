use crate::config::types::ReadStart;
use crate::source::tracker::{FileOffsetTracker, FilePosition};
use std::fs::{File, Metadata};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lines read from a file but not yet acknowledged in the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRead {
    pub path: PathBuf,
    pub start_offset: u64,
    pub end_offset: u64,
    pub inode: u64,
    /// True when the read restarted at 0 after a rotation or truncation
    pub reset: bool,
    pub lines: Vec<String>,
}

impl PendingRead {
    pub fn position(&self) -> FilePosition {
        FilePosition {
            offset: self.end_offset,
            inode: self.inode,
        }
    }

    /// Nothing new was consumed and the tracker needs no update
    pub fn is_noop(&self) -> bool {
        self.end_offset == self.start_offset && !self.reset
    }
}

/// Upper bound on the bytes one read pulls from a single file.
pub const DEFAULT_MAX_READ_BYTES: u64 = 8 * 1024 * 1024;

/// Reads complete lines appended to a file since the tracked offset.
///
/// A trailing line without its newline is left in the file for the next read
/// so a producer caught mid-write is never split in two. Each read stops
/// after `max_read_bytes`; the rest is picked up by later reads.
#[derive(Debug, Clone, Copy)]
pub struct LogReader {
    start_unseen: ReadStart,
    max_read_bytes: u64,
}

impl Default for LogReader {
    fn default() -> Self {
        Self::new(ReadStart::Beginning)
    }
}

impl LogReader {
    pub fn new(start_unseen: ReadStart) -> Self {
        Self {
            start_unseen,
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
        }
    }

    pub fn with_max_read_bytes(mut self, max_read_bytes: u64) -> Self {
        self.max_read_bytes = max_read_bytes.max(1);
        self
    }

    /// Read new lines and advance the tracker in one step.
    ///
    /// I/O failures are logged and reported as no new lines; the tracker is
    /// left untouched so the next call retries.
    pub fn read_new_lines(&self, path: &Path, tracker: &mut FileOffsetTracker) -> Vec<String> {
        match self.peek(path, tracker) {
            Ok(pending) => {
                commit(tracker, &pending);
                pending.lines
            }
            Err(e) => {
                warn!(error = %e, "Failed to read log file");
                Vec::new()
            }
        }
    }

    /// Read new lines without touching the tracker. Pass the result to
    /// [`commit`] once the lines have been handed off.
    pub fn peek(
        &self,
        path: &Path,
        tracker: &FileOffsetTracker,
    ) -> Result<PendingRead, ReaderError> {
        let io_err = |source| ReaderError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let metadata = file.metadata().map_err(io_err)?;
        let inode = get_inode(&metadata);
        let len = metadata.len();

        let (start_offset, reset) = match tracker.get(path) {
            None => match self.start_unseen {
                ReadStart::Beginning => (0, false),
                ReadStart::End => (len, false),
            },
            Some(known) if known.inode != 0 && known.inode != inode => {
                warn!(path = %path.display(), "File identity changed, reading from the start");
                (0, true)
            }
            Some(known) if len < known.offset => {
                warn!(
                    path = %path.display(),
                    offset = known.offset,
                    len,
                    "File shrank below tracked offset, reading from the start"
                );
                (0, true)
            }
            Some(known) => (known.offset, false),
        };

        let mut pending = PendingRead {
            path: path.to_path_buf(),
            start_offset,
            end_offset: start_offset,
            inode,
            reset,
            lines: Vec::new(),
        };

        if len <= start_offset {
            return Ok(pending);
        }

        file.seek(SeekFrom::Start(start_offset)).map_err(io_err)?;
        let limit = (len - start_offset).min(self.max_read_bytes);
        let mut buf = Vec::with_capacity(usize::try_from(limit).unwrap_or(0));
        file.take(limit).read_to_end(&mut buf).map_err(io_err)?;

        let complete = match buf.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => &buf[..=last_newline],
            // A line longer than the cap would otherwise stall the file forever
            None if buf.len() as u64 >= self.max_read_bytes => {
                warn!(
                    path = %path.display(),
                    bytes = buf.len(),
                    "Line exceeds read limit, emitting it in pieces"
                );
                &buf[..]
            }
            None => {
                debug!(path = %path.display(), "Only a partial line available");
                return Ok(pending);
            }
        };

        pending.end_offset = start_offset + complete.len() as u64;
        pending.lines = split_lines(complete);

        Ok(pending)
    }
}

/// Acknowledge a pending read. Returns true if the tracked position changed.
pub fn commit(tracker: &mut FileOffsetTracker, pending: &PendingRead) -> bool {
    if pending.is_noop() && tracker.get(&pending.path).is_some() {
        return false;
    }
    tracker.advance(&pending.path, pending.position(), pending.reset)
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .filter(|line| !line.trim().is_empty())
        .collect()
}

#[cfg(unix)]
fn get_inode(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn get_inode(_metadata: &Metadata) -> u64 {
    // No stable identity available; rotation falls back to the length check
    0
}
