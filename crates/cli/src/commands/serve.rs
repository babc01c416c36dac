//! Server command handlers.

use clap::Args;
use whatsupdoc_core::{config::AppConfig, AppResult};

fn with_port(config: &AppConfig, port: Option<u16>) -> AppConfig {
    let mut config = config.clone();
    if let Some(port) = port {
        config.web.port = port;
    }
    config
}

/// Serve Slack events and slash commands
#[derive(Args, Debug)]
pub struct SlackCommand {
    /// Port to listen on (default: PORT or 8080)
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl SlackCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Starting {} on Slack", config.slack.bot_name);
        whatsupdoc_server::run_slack(&with_port(config, self.port)).await
    }
}

/// Serve the web chat API
#[derive(Args, Debug)]
pub struct WebCommand {
    /// Port to listen on (default: PORT or 8080)
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl WebCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Starting web chat API");
        whatsupdoc_server::run_web(&with_port(config, self.port)).await
    }
}
