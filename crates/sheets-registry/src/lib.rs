//! Google Sheets adapter for the subscriber registry.
//!
//! Reads the subscriber table through the Sheets v4 values API and writes
//! single cells back. Authentication uses a service-account key.

mod auth;
mod client;
mod error;
mod range;
mod rows;

pub use auth::{
    AccessTokenSource, ServiceAccountKey, ServiceAccountTokens, StaticToken, DEFAULT_TOKEN_URI,
    SPREADSHEETS_SCOPE,
};
pub use client::{SheetsRegistry, SHEETS_API_BASE};
pub use error::{SheetsError, SheetsResult};
pub use range::RangeLayout;
pub use rows::parse_rows;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Summarize an upstream body for logs without echoing its content.
pub(crate) fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}
