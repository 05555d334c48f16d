pub mod reader;
pub mod tracker;

pub use reader::{commit, LogReader, PendingRead, ReaderError};
pub use tracker::{FileOffsetTracker, FilePosition};
