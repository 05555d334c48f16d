use crate::collector::runner::{CollectorError, CollectorRunner};
use crate::config::parse::{load_config, ConfigError};
use crate::config::types::Config;
use crate::pipeline::Scheduler;
use crate::processor::runner::{ProcessorError, ProcessorRunner};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),

    #[error("processor error: {0}")]
    Processor(#[from] ProcessorError),
}

/// Which services to start in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    All,
    Collect,
    Process,
}

impl Mode {
    fn collects(self) -> bool {
        matches!(self, Mode::All | Mode::Collect)
    }

    fn processes(self) -> bool {
        matches!(self, Mode::All | Mode::Process)
    }
}

pub async fn run(
    config_path: Option<PathBuf>,
    mode: Mode,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_or_default(config_path.as_deref())?;
    run_services(config, mode, shutdown_signal()).await?;
    Ok(())
}

fn load_or_default(config_path: Option<&Path>) -> Result<Config, RunError> {
    match config_path {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            Ok(load_config(path)?)
        }
        None => {
            info!("No config file found, using built-in defaults");
            Ok(Config::default())
        }
    }
}

/// Start the services for `mode` and run them until `shutdown` resolves.
///
/// In-flight ticks finish and the collector flushes once more before this
/// returns.
pub async fn run_services<F>(config: Config, mode: Mode, shutdown: F) -> Result<(), RunError>
where
    F: std::future::Future<Output = ()>,
{
    let cancel = CancellationToken::new();
    let mut scheduler = Scheduler::new(cancel.clone());

    if mode.collects() {
        CollectorRunner::start(config.collector, &mut scheduler)?;
    }
    if mode.processes() {
        if let Err(e) = ProcessorRunner::start(&config.processor, &mut scheduler) {
            scheduler.shutdown().await;
            return Err(e.into());
        }
    }

    info!(tasks = ?scheduler.task_names(), "Services started, press Ctrl+C to shutdown");

    tokio::select! {
        _ = shutdown => info!("Shutdown signal received"),
        _ = cancel.cancelled() => warn!("Services cancelled"),
    }

    scheduler.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
