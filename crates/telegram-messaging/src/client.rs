//! Telegram Bot API client.
//!
//! Every call is a POST of a JSON body to `{base}/bot{token}/{method}`. The
//! response envelope is `{"ok": true, "result": ...}` or
//! `{"ok": false, "error_code": .., "description": ..}`.

use crate::error::{TelegramError, TelegramResult};
use crate::update::User;
use access_reconciler::{
    BotIdentity, ChatId, MessagingClient, MessagingResult, ReplyControls, UserId,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, error, info};

/// Public Bot API endpoint.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Update types the webhook subscribes to.
pub const ALLOWED_UPDATES: &[&str] = &["message", "chat_member"];

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct InlineButton<'a> {
    text: &'a str,
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct InlineKeyboard<'a> {
    inline_keyboard: Vec<Vec<InlineButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard<'a>>,
}

#[derive(Debug, Serialize)]
struct MemberAction {
    chat_id: i64,
    user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    only_if_banned: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ChatTarget {
    chat_id: i64,
}

#[derive(Debug, Deserialize)]
struct ChatInfo {
    #[serde(default)]
    invite_link: Option<String>,
}

#[derive(Debug, Serialize)]
struct SetWebhook<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_token: Option<&'a str>,
    allowed_updates: &'a [&'a str],
}

/// Bot API client bound to one bot token.
#[derive(Clone)]
pub struct TelegramClient {
    http_client: reqwest::Client,
    token: String,
    base_url: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            token: token.into(),
            base_url: TELEGRAM_API_BASE.to_string(),
        }
    }

    /// Point the client at another endpoint (local Bot API server or tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Register `url` as the bot's webhook, optionally with a secret token
    /// Telegram will echo in `X-Telegram-Bot-Api-Secret-Token`.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> TelegramResult<()> {
        let accepted: bool = self
            .call(
                "setWebhook",
                &SetWebhook {
                    url,
                    secret_token: secret,
                    allowed_updates: ALLOWED_UPDATES,
                },
            )
            .await?;
        if !accepted {
            return Err(TelegramError::InvalidResponse(
                "setWebhook returned false".to_string(),
            ));
        }
        info!(url = %url, "Webhook registered");
        Ok(())
    }

    pub async fn get_me(&self) -> TelegramResult<BotIdentity> {
        let me: User = self.call("getMe", &serde_json::json!({})).await?;
        Ok(BotIdentity {
            id: UserId(me.id),
            username: me.username,
        })
    }

    pub async fn invite_link(&self, chat: ChatId) -> TelegramResult<String> {
        let target = ChatTarget { chat_id: chat.0 };
        let info: ChatInfo = self.call("getChat", &target).await?;
        if let Some(link) = info.invite_link {
            return Ok(link);
        }

        debug!(chat = %chat, "Chat has no primary invite link, exporting one");
        self.call("exportChatInviteLink", &target).await
    }

    async fn call<P, R>(&self, method: &'static str, params: &P) -> TelegramResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);

        debug!(method, "Calling Bot API");

        let response = self
            .http_client
            .post(url)
            .json(params)
            .send()
            .await
            .map_err(|err| err.without_url())?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| err.without_url())?;

        let envelope: ApiResponse<R> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(err) => {
                let body_summary = summarize_response_body(&body);
                error!(method, status, body_summary = %body_summary, "Unreadable Bot API response");
                return Err(TelegramError::InvalidResponse(format!(
                    "status {status}: {err} ({body_summary})"
                )));
            }
        };

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { ok: true, .. } => Err(TelegramError::InvalidResponse(format!(
                "{method} returned no result"
            ))),
            ApiResponse {
                error_code,
                description,
                ..
            } => {
                let code = error_code.unwrap_or(i64::from(status));
                let description = description.unwrap_or_default();
                error!(method, code, description = %description, "Bot API rejected call");
                Err(TelegramError::Api { code, description })
            }
        }
    }
}

#[async_trait]
impl MessagingClient for TelegramClient {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        controls: Option<ReplyControls>,
    ) -> MessagingResult<()> {
        let reply_markup = controls.as_ref().map(|controls| match controls {
            ReplyControls::LinkButton { label, url } => InlineKeyboard {
                inline_keyboard: vec![vec![InlineButton { text: label, url }]],
            },
        });

        let _sent: serde_json::Value = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id: chat.0,
                    text,
                    reply_markup,
                },
            )
            .await?;
        Ok(())
    }

    async fn unban(&self, chat: ChatId, user: UserId) -> MessagingResult<()> {
        let _: bool = self
            .call(
                "unbanChatMember",
                &MemberAction {
                    chat_id: chat.0,
                    user_id: user.0,
                    only_if_banned: Some(true),
                },
            )
            .await?;
        Ok(())
    }

    async fn kick(&self, chat: ChatId, user: UserId) -> MessagingResult<()> {
        let _: bool = self
            .call(
                "banChatMember",
                &MemberAction {
                    chat_id: chat.0,
                    user_id: user.0,
                    only_if_banned: None,
                },
            )
            .await?;
        Ok(())
    }

    async fn fetch_or_create_invite_link(&self, chat: ChatId) -> MessagingResult<String> {
        Ok(self.invite_link(chat).await?)
    }

    async fn who_am_i(&self) -> MessagingResult<BotIdentity> {
        Ok(self.get_me().await?)
    }
}
