//! In-memory port implementations for tests and local dry runs.
//!
//! Both fakes record every call so tests can assert on emitted commands
//! rather than on platform behavior.

use crate::error::{MessagingError, MessagingResult, RegistryError, RegistryResult};
use crate::ports::{MessagingClient, RegistryClient};
use crate::types::{
    BotIdentity, CellRef, ChatId, RecordField, ReplyControls, SubscriberRecord, UserId,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Registry held in memory. Writes mutate the stored rows.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    rows: Mutex<Vec<SubscriberRecord>>,
    writes: Mutex<Vec<(CellRef, String)>>,
    fetches: AtomicUsize,
    fail_fetch: AtomicBool,
    fail_write: AtomicBool,
}

impl InMemoryRegistry {
    pub fn new(rows: Vec<SubscriberRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Current rows.
    pub fn rows(&self) -> Vec<SubscriberRecord> {
        self.rows.lock().expect("lock poisoned").clone()
    }

    /// Every write in order.
    pub fn writes(&self) -> Vec<(CellRef, String)> {
        self.writes.lock().expect("lock poisoned").clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Make every `fetch_rows` fail as if the store were unreachable.
    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_write.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn fetch_rows(&self) -> RegistryResult<Vec<SubscriberRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to interleave, like a real round trip.
        tokio::task::yield_now().await;

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RegistryError::Transport("registry offline".to_string()));
        }

        let rows = self.rows();
        if rows.is_empty() {
            return Err(RegistryError::EmptyRange);
        }
        Ok(rows)
    }

    async fn write_cell(&self, cell: CellRef, value: &str) -> RegistryResult<()> {
        tokio::task::yield_now().await;

        if self.fail_write.load(Ordering::SeqCst) {
            return Err(RegistryError::Api {
                status: 503,
                message: "write rejected".to_string(),
            });
        }

        let mut rows = self.rows.lock().expect("lock poisoned");
        let record = rows
            .iter_mut()
            .find(|record| record.row == cell.row)
            .ok_or_else(|| RegistryError::Malformed(format!("no row {}", cell.row)))?;

        match cell.field {
            RecordField::Active => record.active = value.eq_ignore_ascii_case("true"),
            RecordField::LinkedIdentity => {
                record.linked_identity = value.parse::<i64>().ok().map(UserId)
            }
        }

        self.writes
            .lock()
            .expect("lock poisoned")
            .push((cell, value.to_string()));
        Ok(())
    }
}

/// A command issued to the messaging port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingCall {
    SendMessage {
        chat: ChatId,
        text: String,
        controls: Option<ReplyControls>,
    },
    Unban {
        chat: ChatId,
        user: UserId,
    },
    Kick {
        chat: ChatId,
        user: UserId,
    },
    InviteLink {
        chat: ChatId,
    },
    WhoAmI,
}

/// Messaging port that records calls and succeeds unless told otherwise.
#[derive(Debug)]
pub struct RecordingMessenger {
    calls: Mutex<Vec<MessagingCall>>,
    invite_link: String,
    bot: BotIdentity,
    fail_send: AtomicBool,
    fail_unban: AtomicBool,
    fail_kick: AtomicBool,
    fail_invite: AtomicBool,
}

impl Default for RecordingMessenger {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingMessenger {
    pub const INVITE_LINK: &'static str = "https://t.me/+guarded-chat-invite";

    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            invite_link: Self::INVITE_LINK.to_string(),
            bot: BotIdentity {
                id: UserId(1),
                username: Some("gatekeeper_test_bot".to_string()),
            },
            fail_send: AtomicBool::new(false),
            fail_unban: AtomicBool::new(false),
            fail_kick: AtomicBool::new(false),
            fail_invite: AtomicBool::new(false),
        }
    }

    /// Every call in order.
    pub fn calls(&self) -> Vec<MessagingCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// Texts sent to `chat`, in order.
    pub fn replies_to(&self, chat: ChatId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MessagingCall::SendMessage { chat: to, text, .. } if to == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn kicks(&self) -> Vec<(ChatId, UserId)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MessagingCall::Kick { chat, user } => Some((chat, user)),
                _ => None,
            })
            .collect()
    }

    pub fn unbans(&self) -> Vec<(ChatId, UserId)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MessagingCall::Unban { chat, user } => Some((chat, user)),
                _ => None,
            })
            .collect()
    }

    pub fn invite_requests(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MessagingCall::InviteLink { .. }))
            .count()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Make unbans fail the way they do for chat administrators.
    pub fn fail_unbans(&self, fail: bool) {
        self.fail_unban.store(fail, Ordering::SeqCst);
    }

    pub fn fail_kicks(&self, fail: bool) {
        self.fail_kick.store(fail, Ordering::SeqCst);
    }

    pub fn fail_invite_links(&self, fail: bool) {
        self.fail_invite.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: MessagingCall) {
        self.calls.lock().expect("lock poisoned").push(call);
    }

    fn check(flag: &AtomicBool, description: &str) -> MessagingResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(MessagingError::Rejected {
                code: 400,
                description: description.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for RecordingMessenger {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        controls: Option<ReplyControls>,
    ) -> MessagingResult<()> {
        self.record(MessagingCall::SendMessage {
            chat,
            text: text.to_string(),
            controls,
        });
        Self::check(&self.fail_send, "Bad Request: chat not found")
    }

    async fn unban(&self, chat: ChatId, user: UserId) -> MessagingResult<()> {
        self.record(MessagingCall::Unban { chat, user });
        Self::check(
            &self.fail_unban,
            "Bad Request: can't remove chat owner or administrator",
        )
    }

    async fn kick(&self, chat: ChatId, user: UserId) -> MessagingResult<()> {
        self.record(MessagingCall::Kick { chat, user });
        Self::check(&self.fail_kick, "Bad Request: not enough rights")
    }

    async fn fetch_or_create_invite_link(&self, chat: ChatId) -> MessagingResult<String> {
        self.record(MessagingCall::InviteLink { chat });
        Self::check(&self.fail_invite, "Bad Request: not enough rights")?;
        Ok(self.invite_link.clone())
    }

    async fn who_am_i(&self) -> MessagingResult<BotIdentity> {
        self.record(MessagingCall::WhoAmI);
        Ok(self.bot.clone())
    }
}
