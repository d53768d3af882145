//! Centralized error types and conversions for relaybot
//!
//! This module provides structured error types using `thiserror` for library code.
//! The binary uses `anyhow` for easy context.

use thiserror::Error;

/// Error type for bot-level operations outside the relay itself
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// External service errors (Telegram, Gemini)
    #[error("External service error ({service}): {message}")]
    ExternalService { service: String, message: String },

    /// Attachment could not be fetched from the chat platform
    #[error("Download failed: {message}")]
    Download { message: String },
}

impl BotError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an external service error
    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a download error
    pub fn download(message: impl Into<String>) -> Self {
        Self::Download {
            message: message.into(),
        }
    }

    /// Returns a hint for the operator, when one applies
    pub fn suggestion(&self) -> Option<String> {
        match self {
            BotError::Config { .. } => {
                Some("Check your .env file or environment variables.".to_string())
            }
            BotError::ExternalService { service, .. } => {
                if service == "telegram" {
                    Some("Check your TELEGRAM_BOT_API_KEY and network connection.".to_string())
                } else if service == "gemini" {
                    Some("Verify your GOOGLE_GEMINI_KEY and model name.".to_string())
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Result type alias using BotError
pub type Result<T> = std::result::Result<T, BotError>;

impl From<crate::config::ConfigError> for BotError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}
