//! Core error types for configuration and startup.

use thiserror::Error;

/// Core error type for configuration and startup operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A required identifier or credential is absent. Fatal at startup.
    #[error("Missing required configuration: {0}")]
    ConfigMissing(&'static str),

    /// A configuration value is present but unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Path error (e.g., home directory not found)
    #[error("Path error: {0}")]
    Path(String),
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_missing_names_the_field() {
        let err = CoreError::ConfigMissing("telegram_bot_token");
        assert_eq!(
            err.to_string(),
            "Missing required configuration: telegram_bot_token"
        );
    }
}
