use clap::{Parser, Subcommand};
use logrelay::cli::run::Mode;
use logrelay::config::resolve_config_path;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "logrelay")]
#[command(about = "Log collection and processing pipeline", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collector and the processor in one process
    Run,
    /// Run only the collector
    Collect,
    /// Run only the processor
    Process,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logrelay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run) | None => logrelay::cli::run::run(config_path, Mode::All).await?,
        Some(Commands::Collect) => logrelay::cli::run::run(config_path, Mode::Collect).await?,
        Some(Commands::Process) => logrelay::cli::run::run(config_path, Mode::Process).await?,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => logrelay::cli::config::init(stdout)?,
            ConfigAction::Validate => logrelay::cli::config::validate(config_path)?,
        },
    }

    Ok(())
}
