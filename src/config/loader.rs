use std::time::Duration;

use crate::config::schema::Config;
use crate::utils::WhitelistChecker;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing credential: {0} must be provided via arguments or environment variables")]
    MissingCredential(&'static str),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Builds the runtime configuration.
///
/// Layers, lowest precedence first: built-in defaults, environment variables,
/// CLI arguments. Call [`load_dotenv`] beforehand to pick up a `.env` file.
pub fn load_config(
    cli_token: Option<String>,
    cli_api_key: Option<String>,
) -> Result<Config, ConfigError> {
    tracing::debug!("Loading configuration");

    let config = merge_env_variables(Config::default(), |key| std::env::var(key).ok())?;
    let config = apply_cli_overrides(config, cli_token, cli_api_key);

    let summary = config.get_safe_summary();
    tracing::debug!(
        telegram_configured = summary.telegram_configured,
        gemini_configured = summary.gemini_configured,
        model = %summary.model,
        allow_from_count = summary.allow_from_count,
        session_ttl_secs = summary.session_ttl_secs,
        rpm_limit = summary.rpm_limit,
        tpm_limit = summary.tpm_limit,
        "Configuration loaded successfully"
    );

    Ok(config)
}

/// Loads `.env` from the working directory if present.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load .env file"),
    }
}

/// Ensures both credentials are present.
pub fn validate_credentials(config: &Config) -> Result<(), ConfigError> {
    if config.telegram_token.is_none() {
        return Err(ConfigError::MissingCredential("TELEGRAM_BOT_API_KEY"));
    }
    if config.gemini_api_key.is_none() {
        return Err(ConfigError::MissingCredential("GOOGLE_GEMINI_KEY"));
    }
    Ok(())
}

fn apply_cli_overrides(
    mut config: Config,
    cli_token: Option<String>,
    cli_api_key: Option<String>,
) -> Config {
    if let Some(token) = cli_token.filter(|t| !t.is_empty()) {
        config.telegram_token = Some(token);
    }
    if let Some(key) = cli_api_key.filter(|k| !k.is_empty()) {
        config.gemini_api_key = Some(key);
    }
    config
}

/// Applies environment overrides read through `lookup`.
///
/// Empty values are treated as unset.
pub(crate) fn merge_env_variables(
    mut config: Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(token) = get("TELEGRAM_BOT_API_KEY") {
        config.telegram_token = Some(token);
    }
    if let Some(key) = get("GOOGLE_GEMINI_KEY").or_else(|| get("GEMINI_API_KEYS")) {
        config.gemini_api_key = Some(key);
    }
    if let Some(model) = get("GEMINI_MODEL") {
        config.model = model;
    }
    if let Some(model) = get("GEMINI_PRO_MODEL") {
        config.pro_model = model;
    }
    if let Some(instruction) = get("SYSTEM_INSTRUCTION") {
        config.system_instruction = Some(instruction);
    }
    if let Some(url) = get("GEMINI_BASE_URL") {
        config.gemini_base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(raw) = get("SESSION_TTL") {
        config.session_ttl_secs = parse_number("SESSION_TTL", &raw)?;
    }
    if let Some(raw) = get("RPM_LIMIT") {
        config.rpm_limit = parse_number("RPM_LIMIT", &raw)?;
    }
    if let Some(raw) = get("TPM_LIMIT") {
        config.tpm_limit = parse_number("TPM_LIMIT", &raw)?;
    }
    if let Some(raw) = get("STREAMING_UPDATE_INTERVAL") {
        let interval: f64 = parse_number("STREAMING_UPDATE_INTERVAL", &raw)?;
        if let Err(e) = Duration::try_from_secs_f64(interval) {
            return Err(ConfigError::InvalidValue {
                key: "STREAMING_UPDATE_INTERVAL",
                value: raw,
                reason: format!("must be a non-negative number of seconds ({})", e),
            });
        }
        config.streaming_update_interval = interval;
    }
    if let Some(raw) = get("AUTHORIZED_USER_IDS") {
        config.authorized_user_ids =
            WhitelistChecker::parse_list(&raw).map_err(|reason| ConfigError::InvalidValue {
                key: "AUTHORIZED_USER_IDS",
                value: raw.clone(),
                reason,
            })?;
    }
    if let Some(raw) = get("GEMINI_SEARCH") {
        config.enable_search = parse_bool("GEMINI_SEARCH", &raw)?;
    }

    Ok(config)
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
