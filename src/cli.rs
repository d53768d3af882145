use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use relaybot::config::{ConfigError, load_config, validate_credentials};
use relaybot::gateway::run_gateway;

#[derive(Parser, Debug)]
#[command(name = "relaybot")]
#[command(about = "relaybot - Telegram bot streaming Gemini replies")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Telegram bot token
    #[arg(value_name = "TG_TOKEN", env = "TELEGRAM_BOT_API_KEY", hide_env_values = true)]
    pub tg_token: Option<String>,

    /// Gemini API key
    #[arg(value_name = "GEMINI_API_KEY", env = "GOOGLE_GEMINI_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Loads the configuration and runs the gateway to completion.
///
/// Configuration problems are reported as usage errors (exit code 2).
pub fn run(cli: Cli) -> Result<()> {
    let config = match load_config(cli.tg_token, cli.gemini_api_key) {
        Ok(config) => config,
        Err(e) => usage_error(&e),
    };
    if let Err(e) = validate_credentials(&config) {
        usage_error(&e);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(run_gateway(&config))
}

fn usage_error(error: &ConfigError) -> ! {
    let kind = match error {
        ConfigError::MissingCredential(_) => ErrorKind::MissingRequiredArgument,
        ConfigError::InvalidValue { .. } => ErrorKind::InvalidValue,
    };
    Cli::command().error(kind, error).exit()
}
