pub mod buffer;
pub mod classify;
pub mod entry;
pub mod flusher;
pub mod runner;

pub use buffer::{BufferStats, CollectionBuffer};
pub use classify::classify;
pub use entry::{LogEntry, LogLevel};
pub use flusher::{FlushError, FlushReport, Flusher, COLLECTED_PREFIX};
pub use runner::{CollectorError, CollectorRunner, CollectorState, ScanReport};
