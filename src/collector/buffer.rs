use crate::collector::entry::LogEntry;
use std::collections::BTreeMap;

/// Per-source entries waiting for the next flush.
///
/// Entries keep arrival order within a source. A source's bucket survives
/// being drained so it keeps showing up (with 0 pending) in stats.
#[derive(Debug, Default)]
pub struct CollectionBuffer {
    buckets: BTreeMap<String, Vec<LogEntry>>,
    total_appended: u64,
    total_drained: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub sources: usize,
    pub total_pending: usize,
    pub total_appended: u64,
    pub total_drained: u64,
}

impl CollectionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: &str, entry: LogEntry) {
        self.bucket_mut(source).push(entry);
        self.total_appended += 1;
    }

    pub fn extend(&mut self, source: &str, entries: impl IntoIterator<Item = LogEntry>) {
        let bucket = self.bucket_mut(source);
        let before = bucket.len();
        bucket.extend(entries);
        let added = bucket.len() - before;
        self.total_appended += added as u64;
    }

    /// Take every non-empty bucket, leaving them empty
    pub fn drain_all(&mut self) -> Vec<(String, Vec<LogEntry>)> {
        let drained: Vec<(String, Vec<LogEntry>)> = self
            .buckets
            .iter_mut()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(source, entries)| (source.clone(), std::mem::take(entries)))
            .collect();
        self.total_drained += drained.iter().map(|(_, e)| e.len() as u64).sum::<u64>();
        drained
    }

    /// Put entries back in front of anything that arrived since they were drained
    pub fn restore(&mut self, source: &str, mut entries: Vec<LogEntry>) {
        self.total_drained = self.total_drained.saturating_sub(entries.len() as u64);
        let bucket = self.bucket_mut(source);
        entries.append(bucket);
        *bucket = entries;
    }

    pub fn pending(&self, source: &str) -> usize {
        self.buckets.get(source).map(Vec::len).unwrap_or(0)
    }

    pub fn pending_by_source(&self) -> BTreeMap<String, usize> {
        self.buckets
            .iter()
            .map(|(source, entries)| (source.clone(), entries.len()))
            .collect()
    }

    pub fn total_pending(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_pending() == 0
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            sources: self.buckets.len(),
            total_pending: self.total_pending(),
            total_appended: self.total_appended,
            total_drained: self.total_drained,
        }
    }

    fn bucket_mut(&mut self, source: &str) -> &mut Vec<LogEntry> {
        self.buckets.entry(source.to_string()).or_default()
    }
}
