//! Configuration, paths, logging and shared error types for the gatekeeper bot.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, SheetLayout, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_LISTEN_ADDR, DEFAULT_LOG_LEVEL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, LogFormat};
pub use paths::Paths;
