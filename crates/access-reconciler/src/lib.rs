//! Access control reconciliation for a paid private chat.
//!
//! The reconciler consumes one inbound event at a time (registration attempt,
//! chat join, cancellation), re-reads the subscriber registry, applies the
//! linking and revocation rules, and drives membership actions through the
//! messaging port. The registry is the single source of truth; nothing is
//! cached between events.

pub mod codec;
pub mod decision;
mod error;
pub mod events;
mod locks;
pub mod ports;
mod reconciler;
pub mod replies;
pub mod testing;
mod types;

pub use codec::{decode_token, encode_email, registration_link};
pub use error::{
    MessagingError, MessagingResult, ReconcileError, ReconcileResult, RegistryError,
    RegistryResult,
};
pub use events::InboundEvent;
pub use locks::{EmailLockGuard, EmailLocks};
pub use ports::{MessagingClient, RegistryClient};
pub use reconciler::{
    AccessReconciler, CancellationOutcome, CancellationReport, EventReport, JoinReport,
    ReconcilerSettings, RegistrationOutcome, RegistrationReport,
};
pub use replies::Reply;
pub use types::{
    BotIdentity, CellRef, ChatId, RecordField, ReplyControls, RowRef, SubscriberRecord, UserId,
    INACTIVE_VALUE,
};
