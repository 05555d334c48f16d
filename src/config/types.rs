use crate::processor::category::LogCategory;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Directory scanned for watched log files
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    /// Directory receiving `collected_<source>` files and collector stats
    #[serde(default = "default_collection_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,
    #[serde(default = "default_read_start")]
    pub read_start: ReadStart,
    #[serde(default = "default_scan_interval", with = "humantime_serde")]
    pub scan_interval: Duration,
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,
    #[serde(default = "default_collector_stats_interval", with = "humantime_serde")]
    pub stats_interval: Duration,
    /// Persist file offsets so a restart resumes where the last scan stopped
    #[serde(default = "default_checkpoint")]
    pub checkpoint: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            output_dir: default_collection_dir(),
            file_suffix: default_file_suffix(),
            read_start: default_read_start(),
            scan_interval: default_scan_interval(),
            flush_interval: default_flush_interval(),
            stats_interval: default_collector_stats_interval(),
            checkpoint: default_checkpoint(),
        }
    }
}

/// Where to begin reading a file the collector has never seen before
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStart {
    Beginning,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Directory holding `collected_*` files
    #[serde(default = "default_collection_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_processed_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_input_prefix")]
    pub input_prefix: String,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_processor_stats_interval", with = "humantime_serde")]
    pub stats_interval: Duration,
    /// Ordered filename routes; the first matching pattern wins
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            input_dir: default_collection_dir(),
            output_dir: default_processed_dir(),
            input_prefix: default_input_prefix(),
            poll_interval: default_poll_interval(),
            stats_interval: default_processor_stats_interval(),
            routes: default_routes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub pattern: String,
    pub category: LogCategory,
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("/logs")
}

fn default_collection_dir() -> PathBuf {
    PathBuf::from("/collected-logs")
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("/processed-logs")
}

fn default_file_suffix() -> String {
    ".log".to_string()
}

fn default_input_prefix() -> String {
    "collected_".to_string()
}

fn default_read_start() -> ReadStart {
    ReadStart::Beginning
}

fn default_scan_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_collector_stats_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_processor_stats_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_checkpoint() -> bool {
    true
}

pub fn default_routes() -> Vec<RouteConfig> {
    [
        ("access.log", LogCategory::Access),
        ("error.log", LogCategory::Error),
        ("application.log", LogCategory::Application),
        ("database-queries.log", LogCategory::Database),
        ("job-execution.log", LogCategory::Job),
    ]
    .into_iter()
    .map(|(pattern, category)| RouteConfig {
        pattern: pattern.to_string(),
        category,
    })
    .collect()
}
