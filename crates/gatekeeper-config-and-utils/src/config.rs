//! Configuration management for the gatekeeper bot.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default bind address for the webhook server.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default timeout applied to every outbound HTTP request.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

const DEFAULT_SHEET_NAME: &str = "Subscribers";
const DEFAULT_FIRST_ROW: u32 = 2;

/// Where the subscriber columns live inside the registry spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetLayout {
    /// Sheet (tab) name.
    pub name: String,
    /// First data row; rows above it are headers.
    pub first_row: u32,
    pub email_column: String,
    pub active_column: String,
    pub identity_column: String,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            name: DEFAULT_SHEET_NAME.to_string(),
            first_row: DEFAULT_FIRST_ROW,
            email_column: "A".to_string(),
            active_column: "B".to_string(),
            identity_column: "C".to_string(),
        }
    }
}

/// Main gatekeeper configuration.
///
/// Required identifiers are optional at the type level so a partially
/// written config file still loads; [`Config::validate`] is the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Telegram Bot API token.
    pub telegram_bot_token: Option<String>,
    /// The private chat whose membership is access-controlled.
    pub guarded_chat_id: Option<i64>,
    /// Bot username used in registration deep links. Resolved via `getMe` when absent.
    pub bot_username: Option<String>,
    /// Chat that receives kick notices.
    pub admin_chat_id: Option<i64>,
    /// Google spreadsheet holding the subscriber registry.
    pub spreadsheet_id: Option<String>,
    /// Path to the Google service-account JSON key.
    pub service_account_file: Option<PathBuf>,
    pub sheet: SheetLayout,
    /// Socket address the webhook server binds to.
    pub listen_addr: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` header value.
    pub webhook_secret: Option<String>,
    /// Expected `X-Gatekeeper-Secret` header value on the cancellation and link routes.
    pub cancel_secret: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            telegram_bot_token: None,
            guarded_chat_id: None,
            bot_username: None,
            admin_chat_id: None,
            spreadsheet_id: None,
            service_account_file: None,
            sheet: SheetLayout::default(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            webhook_secret: None,
            cancel_secret: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from the default config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env()?;

        if config.service_account_file.is_none() {
            let fallback = paths.service_account_file();
            if fallback.exists() {
                config.service_account_file = Some(fallback);
            }
        }

        Ok(config)
    }

    /// Load configuration from an explicit file, then apply environment overrides.
    ///
    /// Unlike [`Config::load`], a missing file is an error.
    pub fn load_explicit(path: &Path) -> CoreResult<Self> {
        let mut config = Self::load_from_file(path)?;
        config.load_from_env()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    fn load_from_env(&mut self) -> CoreResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Override fields from a variable lookup (the process environment in production).
    ///
    /// Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = get("GATEKEEPER_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(token) = get("GATEKEEPER_TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(token);
        }
        if let Some(raw) = get("GATEKEEPER_GUARDED_CHAT_ID") {
            self.guarded_chat_id = Some(parse_number("GATEKEEPER_GUARDED_CHAT_ID", &raw)?);
        }
        if let Some(username) = get("GATEKEEPER_BOT_USERNAME") {
            self.bot_username = Some(username.trim_start_matches('@').to_string());
        }
        if let Some(raw) = get("GATEKEEPER_ADMIN_CHAT_ID") {
            self.admin_chat_id = Some(parse_number("GATEKEEPER_ADMIN_CHAT_ID", &raw)?);
        }
        if let Some(id) = get("GATEKEEPER_SPREADSHEET_ID") {
            self.spreadsheet_id = Some(id);
        }
        if let Some(path) = get("GATEKEEPER_SERVICE_ACCOUNT_FILE") {
            self.service_account_file = Some(PathBuf::from(path));
        }
        if let Some(name) = get("GATEKEEPER_SHEET_NAME") {
            self.sheet.name = name;
        }
        if let Some(addr) = get("GATEKEEPER_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(secret) = get("GATEKEEPER_WEBHOOK_SECRET") {
            self.webhook_secret = Some(secret);
        }
        if let Some(secret) = get("GATEKEEPER_CANCEL_SECRET") {
            self.cancel_secret = Some(secret);
        }
        if let Some(raw) = get("GATEKEEPER_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_number("GATEKEEPER_HTTP_TIMEOUT_SECS", &raw)?;
        }
        Ok(())
    }

    /// Check that every identifier and credential needed to serve is present.
    pub fn validate(&self) -> CoreResult<()> {
        self.telegram_bot_token()?;
        self.guarded_chat_id()?;
        self.spreadsheet_id()?;
        self.service_account_file()?;
        if self.sheet.first_row == 0 {
            return Err(CoreError::Config(
                "sheet.first_row is 1-based and must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn telegram_bot_token(&self) -> CoreResult<&str> {
        self.telegram_bot_token
            .as_deref()
            .ok_or(CoreError::ConfigMissing("telegram_bot_token"))
    }

    pub fn guarded_chat_id(&self) -> CoreResult<i64> {
        self.guarded_chat_id
            .ok_or(CoreError::ConfigMissing("guarded_chat_id"))
    }

    pub fn spreadsheet_id(&self) -> CoreResult<&str> {
        self.spreadsheet_id
            .as_deref()
            .ok_or(CoreError::ConfigMissing("spreadsheet_id"))
    }

    pub fn service_account_file(&self) -> CoreResult<&Path> {
        self.service_account_file
            .as_deref()
            .ok_or(CoreError::ConfigMissing("service_account_file"))
    }

    /// Outbound HTTP timeout.
    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> CoreResult<T> {
    raw.parse::<T>()
        .map_err(|_| CoreError::Config(format!("{name} must be a number, got {raw:?}")))
}
