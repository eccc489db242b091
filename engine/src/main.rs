// Trellis project-tracking assistant
// Main entry point for the trellis binary

use clap::Parser;
use trellis_engine::cli::{Cli, Command};
use trellis_engine::config::Config;
use trellis_engine::handlers::{
    handle_activity, handle_chat, handle_history, handle_items, OutputFormat,
};
use trellis_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Basic telemetry first, before config is loaded
    init_telemetry();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Re-initialize telemetry with the configured log level
    // (only takes effect if RUST_LOG env var is not set)
    let log_level = cli.log.clone().unwrap_or_else(|| config.core.log_level.clone());
    init_telemetry_with_level(&log_level);

    match cli.command {
        Command::Chat { project, message } => handle_chat(project, message, &config, format).await,

        Command::Items { project } => handle_items(project, &config, format).await,

        Command::History { project, limit } => {
            handle_history(project, limit, &config, format).await
        }

        Command::Activity { project, limit } => {
            handle_activity(project, limit, &config, format).await
        }
    }
}
