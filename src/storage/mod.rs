pub mod checkpoint;
pub mod jsonl;

pub use checkpoint::{CheckpointError, CheckpointManager, OffsetCheckpoint};
