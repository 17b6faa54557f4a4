use clap::{Parser, Subcommand, builder::styling};
use dataflow::cli::{RunOptions, list_entities, run_pipeline, validate_config};
use dataflow::etl::RetryMode;
use dataflow::logger::{FacadeSink, FileSink, LogSink, Logger, TeeSink};
use eyre::{Context, Result};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// CLI Styling
const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::BrightWhite.on_default())
    .usage(styling::AnsiColor::BrightWhite.on_default())
    .literal(styling::AnsiColor::Green.on_default())
    .placeholder(styling::AnsiColor::Cyan.on_default());

/// DataFlow: declarative pipelines that move tables between databases and files
#[derive(Parser)]
#[command(name = "dataflow", version, styles = STYLES)]
struct Cli {
    /// The dotenv file to source connection settings from
    #[arg(short, long, global = true, default_value = ".env")]
    env: String,

    /// Console log level (overridden by LOG_LEVEL)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write every log record to a timestamped file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline
    Run {
        /// Path to the YAML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Pipeline name to use instead of the one in the configuration
        #[arg(short, long)]
        pipeline_name: Option<String>,

        /// 'restart' reruns every mapping, 'continue' resumes after the last successful one
        #[arg(long, default_value = "restart")]
        retry_mode: RetryMode,

        /// Directory for run logs used by --retry-mode continue
        #[arg(long, default_value = ".dataflow")]
        state_dir: PathBuf,

        /// Validate and show the execution plan without moving any data
        #[arg(long)]
        dry_run: bool,
    },

    /// Check a configuration file for errors
    Validate {
        /// Path to the YAML configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show configured entities and what the stores contain
    Entities {
        /// Path to the YAML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Only list store entities matching this regex
        #[arg(short, long)]
        include: Option<String>,

        /// Hide store entities matching this regex
        #[arg(short = 'x', long)]
        exclude: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if Path::new(&cli.env).exists() {
        dotenvy::from_filename(&cli.env)
            .with_context(|| format!("Failed to load environment file: {}", cli.env))?;
    }

    let env = env_logger::Env::default().filter_or("LOG_LEVEL", cli.log_level.to_lowercase());
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    let logger = build_logger(cli.log_dir.as_deref())?;
    logger.info(format!("Starting DataFlow {}", env!("CARGO_PKG_VERSION")));

    let success = match cli.command {
        Commands::Run {
            config,
            pipeline_name,
            retry_mode,
            state_dir,
            dry_run,
        } => {
            let options = RunOptions {
                config,
                pipeline_name,
                retry_mode,
                state_dir: Some(state_dir),
                dry_run,
            };
            run_pipeline(options, &logger).await?
        }
        Commands::Validate { config } => validate_config(&config, &logger)?,
        Commands::Entities {
            config,
            include,
            exclude,
        } => {
            let missing = list_entities(&config, include.as_deref(), exclude.as_deref(), &logger)?;
            if missing > 0 {
                logger.warn(format!(
                    "{} configured entit{} missing from the source",
                    missing.yellow(),
                    if missing == 1 { "y is" } else { "ies are" }
                ));
            }
            true
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Console logging through `env_logger`, plus a log file when requested
fn build_logger(log_dir: Option<&Path>) -> Result<Logger> {
    let Some(log_dir) = log_dir else {
        return Ok(Logger::default());
    };
    let file = FileSink::create(log_dir)
        .with_context(|| format!("Failed to create log file in {}", log_dir.display()))?;
    log::info!("Logging to {}", file.path().display().bright_black());
    let sinks: Vec<Arc<dyn LogSink>> = vec![Arc::new(FacadeSink), Arc::new(file)];
    Ok(Logger::new(Arc::new(TeeSink::new(sinks))))
}
