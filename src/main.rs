mod cli;

use clap::Parser;
use relaybot::config::load_dotenv;
use relaybot::utils::BotError;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log filter env var, checked before `RUST_LOG`.
const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));
    let filter = if verbose {
        filter.add_directive(Level::DEBUG.into())
    } else {
        filter
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true) // Show module path
        .with_level(true) // Show log level
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::time())
        .init();
}

fn main() {
    // .env must be loaded before clap reads env fallbacks
    load_dotenv();

    match cli::Cli::try_parse() {
        Ok(cli) => {
            init_logging(cli.verbose);

            tracing::debug!("Verbose mode enabled");
            tracing::info!("Starting relaybot v{}", env!("CARGO_PKG_VERSION"));

            if let Err(e) = cli::run(cli) {
                tracing::error!(error = %e, "relaybot stopped with an error");
                eprintln!("error: {e:#}");
                if let Some(suggestion) = e.downcast_ref::<BotError>().and_then(BotError::suggestion) {
                    eprintln!("hint: {suggestion}");
                }
                std::process::exit(1);
            }
        }
        Err(e) => {
            use clap::error::ErrorKind;

            match e.kind() {
                ErrorKind::DisplayVersion | ErrorKind::DisplayHelp => {
                    // Print version or help and exit successfully
                    e.print().ok();
                    std::process::exit(0);
                }
                _ => {
                    e.print().ok();
                    std::process::exit(2);
                }
            }
        }
    }
}
