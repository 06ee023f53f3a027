//! Sales KPI CLI
//!
//! Runs the KPI engine, validates configuration and inspects checkpoints.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use commands::{CheckpointsCommand, RunCommand, ValidateCommand};
use sales_kpi_config::{AppConfig, LogFormat};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "sales-kpi",
    version,
    about = "Event-time KPI aggregation over a stream of sales invoices"
)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(
        short,
        long,
        global = true,
        env = "SALES_KPI_CONFIG",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `processor=trace,info`
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured pipeline until Ctrl-C or source end
    #[command(name = "run")]
    Run(RunCommand),

    /// Load and validate the configuration
    #[command(name = "validate")]
    Validate(ValidateCommand),

    /// Show the stored checkpoint of every pipeline
    #[command(name = "checkpoints")]
    Checkpoints(CheckpointsCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    let explicit_level = cli.log_level.is_some();
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.observability.log_format = format.into();
    }

    init_tracing(&config, explicit_level)?;

    match cli.command {
        Commands::Run(command) => command.execute(config).await,
        Commands::Validate(command) => command.execute(&config),
        Commands::Checkpoints(command) => command.execute(&config).await,
    }
}

/// Initialize tracing
///
/// Filter precedence: `--log-level`, then `RUST_LOG`, then the configured level.
fn init_tracing(config: &AppConfig, explicit_level: bool) -> anyhow::Result<()> {
    let configured = || EnvFilter::try_new(&config.observability.log_level);
    let filter = if explicit_level {
        configured()?
    } else {
        EnvFilter::try_from_default_env().or_else(|_| configured())?
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.observability.log_format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }
    Ok(())
}
