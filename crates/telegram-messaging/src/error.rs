//! Error types for the Telegram Bot API client.

use access_reconciler::MessagingError;
use thiserror::Error;

/// Errors that can occur while calling the Bot API.
#[derive(Error, Debug)]
pub enum TelegramError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The Bot API answered `{"ok": false, ...}`
    #[error("Telegram API error: {code} - {description}")]
    Api { code: i64, description: String },

    /// Response did not follow the Bot API envelope
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

/// Result type alias using TelegramError.
pub type TelegramResult<T> = Result<T, TelegramError>;

impl From<TelegramError> for MessagingError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::Api { code, description } => {
                MessagingError::Rejected { code, description }
            }
            other => MessagingError::Unavailable(other.to_string()),
        }
    }
}
