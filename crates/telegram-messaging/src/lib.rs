//! Telegram Bot API adapter.
//!
//! Implements the reconciler's messaging port and decodes webhook updates
//! into inbound events.

mod client;
mod error;
pub mod update;

pub use client::{TelegramClient, ALLOWED_UPDATES, TELEGRAM_API_BASE};
pub use error::{TelegramError, TelegramResult};
pub use update::{decode_update, Update};
