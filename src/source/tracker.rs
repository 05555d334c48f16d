use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Position of the collector inside one watched file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePosition {
    /// Byte offset up to which lines have been handed to the buffer
    pub offset: u64,
    /// File identity at the time of the last read, 0 when unknown
    pub inode: u64,
}

/// Remembers, per watched file, how far the collector has read.
///
/// Offsets only move forward, except when the reader detected a rotation or
/// truncation and restarted the file at 0.
#[derive(Debug, Default)]
pub struct FileOffsetTracker {
    positions: HashMap<PathBuf, FilePosition>,
}

impl FileOffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore positions, e.g. from a checkpoint
    pub fn from_positions(positions: HashMap<PathBuf, FilePosition>) -> Self {
        Self { positions }
    }

    pub fn get(&self, path: &Path) -> Option<FilePosition> {
        self.positions.get(path).copied()
    }

    /// Tracked offset, 0 for a file never read
    pub fn offset(&self, path: &Path) -> u64 {
        self.get(path).map(|p| p.offset).unwrap_or(0)
    }

    /// Record a new position for `path`.
    ///
    /// Returns false and leaves the tracker untouched when the move would go
    /// backwards within the same file without `reset` being set.
    pub fn advance(&mut self, path: &Path, position: FilePosition, reset: bool) -> bool {
        if let Some(current) = self.positions.get(path) {
            let same_file = current.inode == position.inode || current.inode == 0;
            if !reset && same_file && position.offset < current.offset {
                return false;
            }
            if *current == position {
                return false;
            }
        }
        self.positions.insert(path.to_path_buf(), position);
        true
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &HashMap<PathBuf, FilePosition> {
        &self.positions
    }

    /// Offsets keyed by display path, ordered for stable output
    pub fn offsets_by_path(&self) -> BTreeMap<String, u64> {
        self.positions
            .iter()
            .map(|(path, pos)| (path.display().to_string(), pos.offset))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(offset: u64, inode: u64) -> FilePosition {
        FilePosition { offset, inode }
    }

    #[test]
    fn test_unseen_file_has_zero_offset() {
        let tracker = FileOffsetTracker::new();
        assert_eq!(tracker.offset(Path::new("/logs/a.log")), 0);
        assert!(tracker.get(Path::new("/logs/a.log")).is_none());
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut tracker = FileOffsetTracker::new();
        let path = Path::new("/logs/a.log");

        assert!(tracker.advance(path, pos(10, 7), false));
        assert!(tracker.advance(path, pos(25, 7), false));
        assert!(!tracker.advance(path, pos(5, 7), false));
        assert_eq!(tracker.offset(path), 25);
    }

    #[test]
    fn test_reset_allows_rewind() {
        let mut tracker = FileOffsetTracker::new();
        let path = Path::new("/logs/a.log");

        tracker.advance(path, pos(100, 7), false);
        assert!(tracker.advance(path, pos(12, 7), true));
        assert_eq!(tracker.offset(path), 12);
    }

    #[test]
    fn test_new_inode_replaces_position() {
        let mut tracker = FileOffsetTracker::new();
        let path = Path::new("/logs/a.log");

        tracker.advance(path, pos(100, 7), false);
        assert!(tracker.advance(path, pos(3, 8), false));
        assert_eq!(tracker.get(path), Some(pos(3, 8)));
    }

    #[test]
    fn test_offsets_by_path_sorted() {
        let mut tracker = FileOffsetTracker::new();
        tracker.advance(Path::new("/logs/b.log"), pos(2, 1), false);
        tracker.advance(Path::new("/logs/a.log"), pos(1, 2), false);

        let offsets: Vec<_> = tracker.offsets_by_path().into_iter().collect();
        assert_eq!(
            offsets,
            vec![("/logs/a.log".to_string(), 1), ("/logs/b.log".to_string(), 2)]
        );
    }
}
