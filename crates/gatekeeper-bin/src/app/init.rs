//! Startup wiring for each command.

use crate::app::AppState;
use crate::server::build_router;
use access_reconciler::codec::{encode_email, fits_start_payload, MAX_START_PAYLOAD_LEN};
use access_reconciler::{registration_link, AccessReconciler, ChatId, ReconcilerSettings};
use anyhow::Context;
use gatekeeper_config_and_utils::{Config, Paths};
use sheets_registry::{ServiceAccountKey, ServiceAccountTokens, SheetsRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use telegram_messaging::TelegramClient;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Shared HTTP client for both upstream APIs.
fn build_http_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(concat!("gatekeeper/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

fn build_registry(config: &Config, http_client: reqwest::Client) -> anyhow::Result<SheetsRegistry> {
    let key_path = config.service_account_file()?;
    let key = ServiceAccountKey::from_file(key_path)
        .with_context(|| format!("Failed to read service-account key {}", key_path.display()))?;
    let tokens = ServiceAccountTokens::new(key, http_client.clone())
        .context("Service-account private key is not a valid RSA key")?;
    info!(client_email = %tokens.client_email(), "Service-account credentials loaded");

    let registry = SheetsRegistry::new(
        http_client,
        config.spreadsheet_id()?,
        &config.sheet,
        Arc::new(tokens),
    )?;
    Ok(registry)
}

/// Run the webhook server until Ctrl-C.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    let guarded_chat = ChatId(config.guarded_chat_id()?);

    info!(
        guarded_chat = %guarded_chat,
        spreadsheet_id = %config.spreadsheet_id.as_deref().unwrap_or_default(),
        sheet = %config.sheet.name,
        listen_addr = %config.listen_addr,
        "Configuration loaded"
    );

    let http_client = build_http_client(&config)?;
    let messenger = Arc::new(TelegramClient::new(
        config.telegram_bot_token()?,
        http_client.clone(),
    ));
    let registry = Arc::new(build_registry(&config, http_client)?);

    let mut settings = ReconcilerSettings::new(guarded_chat);
    settings.admin_chat = config.admin_chat_id.map(ChatId);

    let mut bot_username = config.bot_username.clone();
    match messenger.get_me().await {
        Ok(me) => {
            info!(bot_id = %me.id, username = ?me.username, "Bot identity resolved");
            settings.bot_identity = Some(me.id);
            if bot_username.is_none() {
                bot_username = me.username;
            }
        }
        Err(err) => {
            warn!(error = %err, "Could not resolve bot identity; continuing without it");
        }
    }
    if bot_username.is_none() {
        warn!("Bot username unknown; /link is unavailable");
    }

    let state = AppState {
        reconciler: Arc::new(AccessReconciler::new(registry, messenger, settings)),
        bot_username,
        webhook_secret: config.webhook_secret.clone(),
        cancel_secret: config.cancel_secret.clone(),
    };

    if state.webhook_secret.is_none() {
        warn!("No webhook secret configured; /telegram accepts unauthenticated calls");
    }

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Gatekeeper listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Gatekeeper stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Print the registration link for `email`. Works offline.
pub fn print_link(config: &Config, email: &str) -> anyhow::Result<()> {
    let username = config
        .bot_username
        .as_deref()
        .context("bot_username is not configured (set GATEKEEPER_BOT_USERNAME)")?;

    let email = email.trim();
    if !fits_start_payload(&encode_email(email)) {
        warn!(
            email = %email,
            max_len = MAX_START_PAYLOAD_LEN,
            "Encoded email exceeds the deep-link payload limit; Telegram may drop it"
        );
    }

    println!("{}", registration_link(username, email));
    Ok(())
}

/// Register `url` as the bot's webhook, with the configured secret if any.
pub async fn set_webhook(config: &Config, url: &str) -> anyhow::Result<()> {
    let client = TelegramClient::new(config.telegram_bot_token()?, build_http_client(config)?);
    client
        .set_webhook(url, config.webhook_secret.as_deref())
        .await
        .context("Telegram rejected the webhook")?;
    println!("Webhook set to {url}");
    Ok(())
}

/// Write a default config under `paths`, refusing to clobber one unless `force`.
pub fn write_config_template(paths: &Paths, force: bool) -> anyhow::Result<PathBuf> {
    let path = paths.config_file();
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default()
        .save(paths)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
