pub mod cli;
pub mod collector;
pub mod config;
pub mod pipeline;
pub mod processor;
pub mod source;
pub mod stats;
pub mod storage;
