//! The access control reconciler.
//!
//! Registry writes are the authoritative side effect of every event.
//! Messaging calls after a committed write are best effort: failures are
//! logged and reported back, never rolled back.

use crate::codec::decode_token;
use crate::decision::{self, Rejection, RegistrationPlan};
use crate::error::{MessagingError, ReconcileError, ReconcileResult};
use crate::events::InboundEvent;
use crate::locks::EmailLocks;
use crate::ports::{MessagingClient, RegistryClient};
use crate::replies::{Reply, INVITE_BUTTON_LABEL};
use crate::types::{CellRef, ChatId, ReplyControls, RowRef, SubscriberRecord, UserId, INACTIVE_VALUE};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Static settings for one guarded chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// The private chat whose membership is controlled.
    pub guarded_chat: ChatId,
    /// Where kick notices go, if anywhere.
    pub admin_chat: Option<ChatId>,
    /// The bot's own account; never kicked.
    pub bot_identity: Option<UserId>,
}

impl ReconcilerSettings {
    pub fn new(guarded_chat: ChatId) -> Self {
        Self {
            guarded_chat,
            admin_chat: None,
            bot_identity: None,
        }
    }
}

/// How a registration attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The requester was written into an unlinked row.
    Linked,
    /// The requester was already linked; invite reissued.
    AlreadyRegistered,
    LinkedToOtherAccount,
    IdentityLinkedElsewhere,
    NotSubscribed,
    /// `/start` without a token.
    MissingToken,
}

impl RegistrationOutcome {
    pub fn reply(self) -> Reply {
        match self {
            RegistrationOutcome::Linked => Reply::Welcome,
            RegistrationOutcome::AlreadyRegistered => Reply::AlreadyRegistered,
            RegistrationOutcome::LinkedToOtherAccount => Reply::LinkedToOtherAccount,
            RegistrationOutcome::IdentityLinkedElsewhere => Reply::IdentityLinkedElsewhere,
            RegistrationOutcome::NotSubscribed => Reply::NotSubscribed,
            RegistrationOutcome::MissingToken => Reply::MissingToken,
        }
    }
}

impl From<Rejection> for RegistrationOutcome {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::NotSubscribed => RegistrationOutcome::NotSubscribed,
            Rejection::LinkedToOtherAccount => RegistrationOutcome::LinkedToOtherAccount,
            Rejection::IdentityLinkedElsewhere => RegistrationOutcome::IdentityLinkedElsewhere,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Email decoded from the token; empty for `MissingToken`.
    pub email: String,
    pub requester: UserId,
    pub outcome: RegistrationOutcome,
    /// Messaging failures after the decision was taken.
    pub notification_errors: Vec<MessagingError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Joiners with an active linked record.
    pub verified: Vec<UserId>,
    /// Joiners removed from the chat.
    pub kicked: Vec<UserId>,
    /// Joiners that should have been removed but the kick failed.
    pub kick_failures: Vec<(UserId, MessagingError)>,
    /// Joiners not evaluated (bot itself, or a chat other than the guarded one).
    pub skipped: Vec<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationOutcome {
    /// No active row for the email; nothing happened.
    NoActiveRecord,
    /// The row was marked inactive and the linked member, if any, removed.
    Deactivated { row: RowRef, kicked: Option<UserId> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationReport {
    pub email: String,
    pub outcome: CancellationOutcome,
    pub notification_errors: Vec<MessagingError>,
}

/// Result of one event at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventReport {
    Registration(RegistrationReport),
    Join(JoinReport),
    Cancellation(CancellationReport),
    /// The event did not concern the reconciler.
    Ignored,
    /// The event was aborted; nothing was written.
    Failed(ReconcileError),
}

enum JoinVerdict {
    Verified(UserId),
    Kicked(UserId),
    KickFailed(UserId, MessagingError),
}

/// Applies registration, join and cancellation rules against the registry.
pub struct AccessReconciler {
    registry: Arc<dyn RegistryClient>,
    messaging: Arc<dyn MessagingClient>,
    settings: ReconcilerSettings,
    locks: EmailLocks,
    /// Serializes registrations by one requester across different emails.
    requester_locks: EmailLocks,
}

impl AccessReconciler {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        messaging: Arc<dyn MessagingClient>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            registry,
            messaging,
            settings,
            locks: EmailLocks::new(),
            requester_locks: EmailLocks::new(),
        }
    }

    /// Handle one decoded platform update. Never fails; errors are logged
    /// and reported as [`EventReport::Failed`].
    pub async fn handle_event(&self, event: InboundEvent) -> EventReport {
        let kind = event.kind();
        let result = match event {
            InboundEvent::TextCommand {
                chat,
                from,
                command,
                argument,
            } => match command.as_str() {
                "start" => self
                    .register(argument.as_deref(), from, chat)
                    .await
                    .map(EventReport::Registration),
                _ => {
                    debug!(command = %command, "Ignoring unsupported command");
                    Ok(EventReport::Ignored)
                }
            },
            InboundEvent::ChatJoin { chat, members } => self
                .reconcile_join(chat, &members)
                .await
                .map(EventReport::Join),
            InboundEvent::Other => Ok(EventReport::Ignored),
        };

        result.unwrap_or_else(|err| {
            error!(event = kind, error = %err, "Event handling aborted");
            EventReport::Failed(err)
        })
    }

    /// Handle one cancellation notification. Never fails.
    pub async fn handle_cancellation(&self, email: &str) -> EventReport {
        match self.cancel(email).await {
            Ok(report) => EventReport::Cancellation(report),
            Err(err) => {
                error!(email = %email, error = %err, "Cancellation aborted");
                EventReport::Failed(err)
            }
        }
    }

    /// Registration attempt by `requester` carrying `token`, answered in `reply_chat`.
    pub async fn register(
        &self,
        token: Option<&str>,
        requester: UserId,
        reply_chat: ChatId,
    ) -> ReconcileResult<RegistrationReport> {
        let mut notification_errors = Vec::new();

        let Some(token) = token else {
            self.reply(reply_chat, Reply::MissingToken, None, &mut notification_errors)
                .await;
            return Ok(RegistrationReport {
                email: String::new(),
                requester,
                outcome: RegistrationOutcome::MissingToken,
                notification_errors,
            });
        };

        let email = decode_token(token).trim().to_string();
        // Requester first, then email. Cancellation only takes the email lock.
        let lock = (
            self.requester_locks.acquire(&requester.to_string()).await,
            self.locks.acquire(&email).await,
        );

        let rows = match self.registry.fetch_rows().await {
            Ok(rows) => rows,
            Err(err) => {
                drop(lock);
                return Err(self.abort_registration(reply_chat, err.into()).await);
            }
        };

        let plan = decision::plan_registration(&rows, &email, requester);
        debug!(email = %email, requester = %requester, plan = ?plan, "Registration planned");

        let outcome = match plan {
            RegistrationPlan::Reject(rejection) => {
                drop(lock);
                RegistrationOutcome::from(rejection)
            }
            RegistrationPlan::Reissue => {
                drop(lock);
                RegistrationOutcome::AlreadyRegistered
            }
            RegistrationPlan::Link { row, release } => {
                let written = self.link(row, &release, requester).await;
                drop(lock);
                if let Err(err) = written {
                    return Err(self.abort_registration(reply_chat, err).await);
                }
                info!(email = %email, requester = %requester, row = %row, "Linked subscriber");
                self.unban_quietly(requester).await;
                RegistrationOutcome::Linked
            }
        };

        let reply = outcome.reply();
        let controls = if reply.includes_invite() {
            self.invite_controls(&mut notification_errors).await
        } else {
            None
        };
        self.reply(reply_chat, reply, controls, &mut notification_errors)
            .await;

        info!(email = %email, requester = %requester, outcome = ?outcome, "Registration handled");

        Ok(RegistrationReport {
            email,
            requester,
            outcome,
            notification_errors,
        })
    }

    /// Verify each joiner of `chat` and remove the ones without an active link.
    pub async fn reconcile_join(
        &self,
        chat: ChatId,
        joiners: &[UserId],
    ) -> ReconcileResult<JoinReport> {
        let mut report = JoinReport::default();

        if chat != self.settings.guarded_chat {
            debug!(chat = %chat, "Join outside the guarded chat");
            report.skipped.extend_from_slice(joiners);
            return Ok(report);
        }

        let (skipped, candidates): (Vec<UserId>, Vec<UserId>) = joiners
            .iter()
            .copied()
            .partition(|member| Some(*member) == self.settings.bot_identity);
        report.skipped = skipped;

        if candidates.is_empty() {
            return Ok(report);
        }

        let rows = self.registry.fetch_rows().await?;

        let verdicts = join_all(
            candidates
                .into_iter()
                .map(|member| self.verify_joiner(&rows, member)),
        )
        .await;

        for verdict in verdicts {
            match verdict {
                JoinVerdict::Verified(member) => report.verified.push(member),
                JoinVerdict::Kicked(member) => report.kicked.push(member),
                JoinVerdict::KickFailed(member, err) => report.kick_failures.push((member, err)),
            }
        }

        info!(
            verified = report.verified.len(),
            kicked = report.kicked.len(),
            kick_failures = report.kick_failures.len(),
            "Join reconciled"
        );
        Ok(report)
    }

    /// Mark the active row for `email` inactive and remove its linked member.
    pub async fn cancel(&self, email: &str) -> ReconcileResult<CancellationReport> {
        let email = email.trim().to_string();
        let mut notification_errors = Vec::new();

        let lock = self.locks.acquire(&email).await;
        let rows = self.registry.fetch_rows().await?;

        let Some(plan) = decision::plan_cancellation(&rows, &email) else {
            debug!(email = %email, "No active subscriber to cancel");
            return Ok(CancellationReport {
                email,
                outcome: CancellationOutcome::NoActiveRecord,
                notification_errors,
            });
        };

        self.registry
            .write_cell(CellRef::active(plan.row), INACTIVE_VALUE)
            .await?;
        drop(lock);
        info!(email = %email, row = %plan.row, "Subscriber deactivated");

        let mut kicked = None;
        if let Some(member) = plan.kick {
            match self.messaging.kick(self.settings.guarded_chat, member).await {
                Ok(()) => {
                    info!(email = %email, member = %member, "Removed cancelled member");
                    kicked = Some(member);
                    self.notify_admin(&format!(
                        "Removed {member} after cancellation of {email}."
                    ))
                    .await;
                }
                Err(err) => {
                    warn!(email = %email, member = %member, error = %err, "Failed to remove cancelled member");
                    notification_errors.push(err);
                }
            }
        }

        Ok(CancellationReport {
            email,
            outcome: CancellationOutcome::Deactivated {
                row: plan.row,
                kicked,
            },
            notification_errors,
        })
    }

    /// Link `requester` to `row`, then blank its stale links on `release`.
    ///
    /// Only the link write can fail the event. A failed release leaves the
    /// identity on a lapsed row, which never verifies a member.
    async fn link(
        &self,
        row: RowRef,
        release: &[RowRef],
        requester: UserId,
    ) -> ReconcileResult<()> {
        self.registry
            .write_cell(CellRef::linked_identity(row), &requester.to_string())
            .await?;

        for stale in release {
            info!(row = %stale, requester = %requester, "Releasing stale link on lapsed row");
            if let Err(err) = self
                .registry
                .write_cell(CellRef::linked_identity(*stale), "")
                .await
            {
                warn!(
                    row = %stale,
                    requester = %requester,
                    error = %err,
                    "Stale link left on lapsed row"
                );
            }
        }
        Ok(())
    }

    async fn verify_joiner(&self, rows: &[SubscriberRecord], member: UserId) -> JoinVerdict {
        if decision::is_verified_member(rows, member) {
            debug!(member = %member, "Joiner verified");
            return JoinVerdict::Verified(member);
        }

        match self.messaging.kick(self.settings.guarded_chat, member).await {
            Ok(()) => {
                info!(member = %member, "Removed unverified joiner");
                self.notify_admin(&format!("Removed unverified member {member}."))
                    .await;
                JoinVerdict::Kicked(member)
            }
            Err(err) => {
                warn!(member = %member, error = %err, "Failed to remove unverified joiner");
                JoinVerdict::KickFailed(member, err)
            }
        }
    }

    async fn abort_registration(&self, reply_chat: ChatId, err: ReconcileError) -> ReconcileError {
        error!(error = %err, "Registration aborted");
        let mut ignored = Vec::new();
        self.reply(reply_chat, Reply::SomethingWentWrong, None, &mut ignored)
            .await;
        err
    }

    /// A missing ban is the common case (and admins cannot be unbanned).
    async fn unban_quietly(&self, member: UserId) {
        if let Err(err) = self.messaging.unban(self.settings.guarded_chat, member).await {
            debug!(member = %member, error = %err, "Unban failed, ignoring");
        }
    }

    async fn invite_controls(&self, errors: &mut Vec<MessagingError>) -> Option<ReplyControls> {
        match self
            .messaging
            .fetch_or_create_invite_link(self.settings.guarded_chat)
            .await
        {
            Ok(url) => Some(ReplyControls::LinkButton {
                label: INVITE_BUTTON_LABEL.to_string(),
                url,
            }),
            Err(err) => {
                warn!(error = %err, "Failed to fetch invite link");
                errors.push(err);
                None
            }
        }
    }

    async fn reply(
        &self,
        chat: ChatId,
        reply: Reply,
        controls: Option<ReplyControls>,
        errors: &mut Vec<MessagingError>,
    ) {
        if let Err(err) = self.messaging.send_message(chat, reply.text(), controls).await {
            warn!(chat = %chat, reply = ?reply, error = %err, "Failed to send reply");
            errors.push(err);
        }
    }

    async fn notify_admin(&self, text: &str) {
        let Some(admin_chat) = self.settings.admin_chat else {
            return;
        };
        if let Err(err) = self.messaging.send_message(admin_chat, text, None).await {
            warn!(error = %err, "Failed to notify admin chat");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryRegistry, MessagingCall, RecordingMessenger};
    use crate::codec::encode_email;

    const GUARDED: ChatId = ChatId(-100);
    const PRIVATE: ChatId = ChatId(500);

    fn reconciler(
        rows: Vec<SubscriberRecord>,
    ) -> (AccessReconciler, Arc<InMemoryRegistry>, Arc<RecordingMessenger>) {
        let registry = Arc::new(InMemoryRegistry::new(rows));
        let messenger = Arc::new(RecordingMessenger::new());
        let reconciler = AccessReconciler::new(
            registry.clone(),
            messenger.clone(),
            ReconcilerSettings::new(GUARDED),
        );
        (reconciler, registry, messenger)
    }

    #[test]
    fn outcomes_map_to_replies() {
        assert_eq!(RegistrationOutcome::Linked.reply(), Reply::Welcome);
        assert_eq!(
            RegistrationOutcome::from(Rejection::LinkedToOtherAccount).reply(),
            Reply::LinkedToOtherAccount
        );
    }

    #[tokio::test]
    async fn unsupported_command_is_ignored() {
        let (reconciler, registry, messenger) = reconciler(vec![]);
        let event = InboundEvent::from_text(PRIVATE, UserId(1), "/help");
        assert_eq!(reconciler.handle_event(event).await, EventReport::Ignored);
        assert_eq!(registry.fetch_count(), 0);
        assert!(messenger.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_token_gets_usage_reply_without_registry_access() {
        let (reconciler, registry, messenger) = reconciler(vec![]);
        let report = reconciler.register(None, UserId(1), PRIVATE).await.unwrap();

        assert_eq!(report.outcome, RegistrationOutcome::MissingToken);
        assert_eq!(registry.fetch_count(), 0);
        assert_eq!(messenger.replies_to(PRIVATE), vec![Reply::MissingToken.text()]);
    }

    #[tokio::test]
    async fn failed_invite_still_replies_without_button() {
        let (reconciler, registry, messenger) =
            reconciler(vec![SubscriberRecord::new(2, "a@x.com", true, None)]);
        messenger.fail_invite_links(true);

        let token = encode_email("a@x.com");
        let report = reconciler
            .register(Some(&token), UserId(42), PRIVATE)
            .await
            .unwrap();

        assert_eq!(report.outcome, RegistrationOutcome::Linked);
        assert_eq!(report.notification_errors.len(), 1);
        assert_eq!(registry.rows()[0].linked_identity, Some(UserId(42)));
        assert!(messenger.calls().iter().any(|call| matches!(
            call,
            MessagingCall::SendMessage { controls: None, .. }
        )));
    }

    #[tokio::test]
    async fn failed_unban_is_swallowed() {
        let (reconciler, _registry, messenger) =
            reconciler(vec![SubscriberRecord::new(2, "a@x.com", true, None)]);
        messenger.fail_unbans(true);

        let token = encode_email("a@x.com");
        let report = reconciler
            .register(Some(&token), UserId(42), PRIVATE)
            .await
            .unwrap();

        assert_eq!(report.outcome, RegistrationOutcome::Linked);
        assert!(report.notification_errors.is_empty());
    }

    #[tokio::test]
    async fn bot_joining_is_skipped() {
        let registry = Arc::new(InMemoryRegistry::new(vec![]));
        let messenger = Arc::new(RecordingMessenger::new());
        let mut settings = ReconcilerSettings::new(GUARDED);
        settings.bot_identity = Some(UserId(1000));
        let reconciler = AccessReconciler::new(registry.clone(), messenger.clone(), settings);

        let report = reconciler
            .reconcile_join(GUARDED, &[UserId(1000)])
            .await
            .unwrap();

        assert_eq!(report.skipped, vec![UserId(1000)]);
        assert_eq!(registry.fetch_count(), 0);
        assert!(messenger.kicks().is_empty());
    }

    #[tokio::test]
    async fn kicks_are_reported_to_admin_chat() {
        let registry = Arc::new(InMemoryRegistry::new(vec![SubscriberRecord::new(
            2, "a@x.com", true, None,
        )]));
        let messenger = Arc::new(RecordingMessenger::new());
        let mut settings = ReconcilerSettings::new(GUARDED);
        settings.admin_chat = Some(ChatId(-999));
        let reconciler = AccessReconciler::new(registry, messenger.clone(), settings);

        reconciler
            .reconcile_join(GUARDED, &[UserId(5)])
            .await
            .unwrap();

        assert_eq!(messenger.kicks(), vec![(GUARDED, UserId(5))]);
        assert_eq!(messenger.replies_to(ChatId(-999)).len(), 1);
    }
}
