//! Whatsupdoc CLI
//!
//! Main entry point for the whatsupdoc binary.
//! Runs the Slack bot or the web chat API, and offers admin commands for
//! trying questions and checking connectivity.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, CheckCommand, SlackCommand, WebCommand};
use std::path::PathBuf;
use whatsupdoc_core::{config::AppConfig, logging, logging::LogFormat, AppResult};

/// Whatsupdoc - answers questions from your documents
#[derive(Parser, Debug)]
#[command(name = "whatsupdoc")]
#[command(about = "Document Q&A over Slack and the web, grounded in a RAG corpus", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, global = true, env = "WHATSUPDOC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log line format (pretty, json)
    #[arg(long, global = true, env = "LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve Slack events and slash commands
    Slack(SlackCommand),

    /// Serve the web chat API
    Web(WebCommand),

    /// Ask one question through the full pipeline
    Ask(AskCommand),

    /// Check connectivity to retrieval and generation
    Check(CheckCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load configuration: YAML file, then environment
    let config = AppConfig::load(cli.config.as_deref())?;

    // Apply CLI overrides
    let config = config.with_overrides(cli.log_level, cli.log_format, cli.verbose, cli.no_color);

    logging::init_logging(
        config.logging.level.as_deref(),
        config.logging.format,
        config.logging.no_color,
    )?;

    tracing::info!("Whatsupdoc {} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Config file: {:?}", config.config_file);
    tracing::debug!("Corpus: {}", config.rag_corpus_name());
    tracing::debug!("Model: {}", config.generation.model);

    let command_name = match &cli.command {
        Commands::Slack(_) => "slack",
        Commands::Web(_) => "web",
        Commands::Ask(_) => "ask",
        Commands::Check(_) => "check",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Slack(cmd) => cmd.execute(&config).await,
        Commands::Web(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Check(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
