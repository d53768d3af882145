//! Error types for model backend operations
//!
//! Errors are categorized so the relay can tell a structured rejection from
//! the backend apart from transport trouble.

use thiserror::Error;

/// Errors that can occur when interacting with the model backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network-related errors (connection issues, DNS failures, broken streams)
    #[error("Network error: {message}")]
    Network {
        /// Error message
        message: String,
    },

    /// Timeout errors (request took too long)
    #[error("Request timeout after {seconds} seconds")]
    Timeout {
        /// Timeout duration in seconds
        seconds: u64,
    },

    /// The backend rejected the request with a structured error
    #[error("API error {code} ({status}): {message}")]
    Api {
        /// HTTP-style error code reported by the backend
        code: u16,
        /// Symbolic status, e.g. `INVALID_ARGUMENT`
        status: String,
        /// Message from the backend
        message: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// Configuration errors (missing API key, unusable base URL)
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },
}

impl ProviderError {
    /// Returns true if the backend itself rejected the request
    pub fn is_api_error(&self) -> bool {
        matches!(self, ProviderError::Api { .. })
    }

    /// Returns true if the backend reported a quota or rate problem
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::Api { code: 429, .. })
    }

    /// Creates a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a timeout error
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    /// Creates a backend API error
    pub fn api(code: u16, status: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            status: status.into(),
            message: message.into(),
        }
    }

    /// Creates a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ProviderError::api(400, "INVALID_ARGUMENT", "Request contains an invalid argument.");
        assert_eq!(
            err.to_string(),
            "API error 400 (INVALID_ARGUMENT): Request contains an invalid argument."
        );
        assert!(err.is_api_error());
        assert!(!err.is_rate_limit());
    }

    #[test]
    fn test_rate_limit_detection() {
        let err = ProviderError::api(429, "RESOURCE_EXHAUSTED", "Quota exceeded");
        assert!(err.is_rate_limit());
        assert!(!ProviderError::network("down").is_rate_limit());
    }

    #[test]
    fn test_transport_errors_are_not_api_errors() {
        assert!(!ProviderError::network("Connection refused").is_api_error());
        assert!(!ProviderError::timeout(30).is_api_error());
        assert!(!ProviderError::serialization("bad json").is_api_error());
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let provider_err: ProviderError = json_err.into();
        assert!(matches!(provider_err, ProviderError::Serialization { .. }));
    }

    #[test]
    fn test_error_display_messages() {
        let err = ProviderError::network("Connection refused");
        assert!(err.to_string().contains("Network error"));
        assert!(err.to_string().contains("Connection refused"));

        let err = ProviderError::timeout(30);
        assert_eq!(err.to_string(), "Request timeout after 30 seconds");
    }
}
