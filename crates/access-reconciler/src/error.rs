//! Error types for the reconciler and its two ports.

use thiserror::Error;

/// Failure reported by a registry adapter.
///
/// Every variant means the same thing to the reconciler: the registry is
/// unavailable for this event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Transport-level failure (connect, TLS, timeout).
    #[error("registry transport error: {0}")]
    Transport(String),

    /// The store rejected our credentials or we could not obtain any.
    #[error("registry auth error: {0}")]
    Auth(String),

    /// Non-success response from the store.
    #[error("registry API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The configured range returned no rows at all.
    #[error("registry range is empty")]
    EmptyRange,

    /// The response could not be interpreted as subscriber rows.
    #[error("registry returned malformed data: {0}")]
    Malformed(String),
}

/// Result type alias using RegistryError.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Failure reported by a messaging adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// The platform could not be reached.
    #[error("messaging platform unavailable: {0}")]
    Unavailable(String),

    /// The platform answered with a well-formed API error.
    #[error("messaging platform rejected the call: {code} - {description}")]
    Rejected { code: i64, description: String },
}

/// Result type alias using MessagingError.
pub type MessagingResult<T> = Result<T, MessagingError>;

/// Failure that aborts handling of a single event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(#[from] RegistryError),
}

/// Result type alias using ReconcileError.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
