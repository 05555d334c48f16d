pub mod category;
pub mod dispatcher;
pub mod enrich;
pub mod runner;

pub use category::{LogCategory, Router};
pub use dispatcher::{
    DispatchError, DispatchTotals, ProcessingDispatcher, CLAIM_SUFFIX, PROCESSED_PREFIX,
};
pub use enrich::{enrich, EnrichError, ProcessedEntry};
pub use runner::{ProcessorError, ProcessorRunner, ProcessorState};
