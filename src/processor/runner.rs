use crate::config::types::ProcessorConfig;
use crate::pipeline::{PeriodicTask, Scheduler};
use crate::processor::dispatcher::ProcessingDispatcher;
use crate::stats::{
    host_name, rate_per_minute, ProcessingStats, StatsReporter, PROCESSING_STATS_FILE,
};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the processor's periodic tasks share.
pub struct ProcessorState {
    dispatcher: ProcessingDispatcher,
    started: Instant,
}

impl ProcessorState {
    pub fn new(config: &ProcessorConfig) -> Result<Self, ProcessorError> {
        std::fs::create_dir_all(&config.output_dir).map_err(|source| {
            ProcessorError::OutputDir {
                path: config.output_dir.clone(),
                source,
            }
        })?;

        Ok(Self {
            dispatcher: ProcessingDispatcher::new(config),
            started: Instant::now(),
        })
    }

    pub fn dispatcher(&self) -> &ProcessingDispatcher {
        &self.dispatcher
    }

    pub fn stats_snapshot(&self) -> ProcessingStats {
        let totals = self.dispatcher.totals();
        let uptime_seconds = self.started.elapsed().as_secs();

        ProcessingStats {
            timestamp: Utc::now(),
            host: host_name(),
            total_processed: totals.total_processed,
            files_processed: totals.files_processed,
            files_failed: totals.files_failed,
            processing_rate_per_minute: rate_per_minute(totals.total_processed, uptime_seconds),
            active_processors: self.dispatcher.router().len(),
            uptime_seconds,
        }
    }
}

struct ProcessTask(Arc<ProcessorState>);

#[async_trait]
impl PeriodicTask for ProcessTask {
    fn name(&self) -> &str {
        "processor-dispatch"
    }

    async fn tick(&self, cancel: &CancellationToken) {
        let state = Arc::clone(&self.0);
        let cancel = cancel.clone();
        match tokio::task::spawn_blocking(move || state.dispatcher.process_pending(&cancel)).await {
            Ok(0) => {}
            Ok(entries) => info!(entries, "Processed pending files"),
            Err(e) => error!(error = %e, "Dispatch task panicked"),
        }
    }
}

struct ProcessorStatsTask {
    state: Arc<ProcessorState>,
    reporter: StatsReporter,
}

#[async_trait]
impl PeriodicTask for ProcessorStatsTask {
    fn name(&self) -> &str {
        "processor-stats"
    }

    async fn tick(&self, _cancel: &CancellationToken) {
        let snapshot = self.state.stats_snapshot();
        match self.reporter.write(&snapshot) {
            Ok(()) => info!(
                total_processed = snapshot.total_processed,
                files_processed = snapshot.files_processed,
                files_failed = snapshot.files_failed,
                "Processing stats"
            ),
            Err(e) => warn!(error = %e, "Failed to write processing stats"),
        }
    }
}

pub struct ProcessorRunner;

impl ProcessorRunner {
    /// Build the processor state and register its tasks with `scheduler`.
    pub fn start(
        config: &ProcessorConfig,
        scheduler: &mut Scheduler,
    ) -> Result<Arc<ProcessorState>, ProcessorError> {
        info!(
            input_dir = %config.input_dir.display(),
            output_dir = %config.output_dir.display(),
            routes = config.routes.len(),
            "Starting processor"
        );

        let state = Arc::new(ProcessorState::new(config)?);
        let reporter = StatsReporter::new(config.output_dir.join(PROCESSING_STATS_FILE));

        scheduler.spawn(Arc::new(ProcessTask(Arc::clone(&state))), config.poll_interval);
        scheduler.spawn(
            Arc::new(ProcessorStatsTask {
                state: Arc::clone(&state),
                reporter,
            }),
            config.stats_interval,
        );

        Ok(state)
    }
}
