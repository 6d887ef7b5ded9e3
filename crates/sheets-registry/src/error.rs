//! Error types for Google Sheets registry operations.

use access_reconciler::RegistryError;
use thiserror::Error;

/// Errors raised while talking to the Sheets API or its token endpoint.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// Network or transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The Sheets API returned a non-success HTTP status.
    #[error("Sheets API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Credentials could not be loaded, signed, or exchanged.
    #[error("Auth error: {0}")]
    Auth(String),

    /// Signing the service-account assertion failed.
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading the key file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured sheet layout cannot be expressed in A1 notation.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// The configured range holds no values.
    #[error("Range is empty")]
    EmptyRange,
}

/// Result type alias using SheetsError.
pub type SheetsResult<T> = Result<T, SheetsError>;

impl From<SheetsError> for RegistryError {
    fn from(err: SheetsError) -> Self {
        match err {
            SheetsError::Http(err) => RegistryError::Transport(err.to_string()),
            SheetsError::Api { status, message } => RegistryError::Api { status, message },
            SheetsError::Auth(message) => RegistryError::Auth(message),
            SheetsError::Jwt(err) => RegistryError::Auth(err.to_string()),
            SheetsError::Io(err) => RegistryError::Auth(err.to_string()),
            SheetsError::Json(err) => RegistryError::Malformed(err.to_string()),
            SheetsError::InvalidRange(range) => RegistryError::Malformed(range),
            SheetsError::EmptyRange => RegistryError::EmptyRange,
        }
    }
}
