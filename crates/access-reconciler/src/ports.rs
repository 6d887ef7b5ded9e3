//! Ports the reconciler drives. Adapters live in their own crates.

use crate::error::{MessagingResult, RegistryResult};
use crate::types::{BotIdentity, CellRef, ChatId, ReplyControls, SubscriberRecord, UserId};
use async_trait::async_trait;

/// Read/write access to the subscriber registry.
///
/// Implementations must not cache: every `fetch_rows` reflects the store as
/// it is now.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch every subscriber row in registry order.
    ///
    /// An empty range, or one without a usable subscriber row, is an error
    /// (`RegistryError::EmptyRange`), never an empty vec.
    async fn fetch_rows(&self) -> RegistryResult<Vec<SubscriberRecord>>;

    /// Overwrite a single cell.
    async fn write_cell(&self, cell: CellRef, value: &str) -> RegistryResult<()>;
}

/// Commands against the messaging platform.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        controls: Option<ReplyControls>,
    ) -> MessagingResult<()>;

    /// Lift a ban so the user may join again. Succeeds when no ban exists.
    async fn unban(&self, chat: ChatId, user: UserId) -> MessagingResult<()>;

    /// Remove the user from the chat and keep them out until unbanned.
    async fn kick(&self, chat: ChatId, user: UserId) -> MessagingResult<()>;

    /// Return the chat's reusable invite link, creating it if the chat has none.
    async fn fetch_or_create_invite_link(&self, chat: ChatId) -> MessagingResult<String>;

    async fn who_am_i(&self) -> MessagingResult<BotIdentity>;
}
