//! Pure transition rules over a registry snapshot.
//!
//! Nothing here performs I/O. The reconciler fetches rows, asks these
//! functions what to do, then carries the plan out through its ports.

use crate::types::{RowRef, SubscriberRecord, UserId};

/// State of one email as observed in a registry snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState<'a> {
    /// No row carries the email.
    Unknown,
    Inactive(&'a SubscriberRecord),
    ActiveUnlinked(&'a SubscriberRecord),
    ActiveLinked(&'a SubscriberRecord, UserId),
}

/// Classify `email` against the snapshot.
///
/// Emails are unique by contract; if the billing side ever duplicates one,
/// the first active row wins over inactive ones.
pub fn classify<'a>(rows: &'a [SubscriberRecord], email: &str) -> RecordState<'a> {
    let mut matching = rows.iter().filter(|row| row.email == email);
    let first = match matching.next() {
        Some(row) => row,
        None => return RecordState::Unknown,
    };
    let chosen = if first.active {
        first
    } else {
        matching.find(|row| row.active).unwrap_or(first)
    };

    match (chosen.active, chosen.linked_identity) {
        (false, _) => RecordState::Inactive(chosen),
        (true, None) => RecordState::ActiveUnlinked(chosen),
        (true, Some(id)) => RecordState::ActiveLinked(chosen, id),
    }
}

/// Why a registration attempt is turned away without touching the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotSubscribed,
    LinkedToOtherAccount,
    IdentityLinkedElsewhere,
}

/// What a registration attempt should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationPlan {
    Reject(Rejection),
    /// Write the requester into `row`, then blank its stale links on `release`.
    Link { row: RowRef, release: Vec<RowRef> },
    /// Already linked to this requester: resend the invite only.
    Reissue,
}

/// Decide a registration attempt for `email` by `requester`.
pub fn plan_registration(
    rows: &[SubscriberRecord],
    email: &str,
    requester: UserId,
) -> RegistrationPlan {
    match classify(rows, email) {
        RecordState::Unknown | RecordState::Inactive(_) => {
            RegistrationPlan::Reject(Rejection::NotSubscribed)
        }
        RecordState::ActiveLinked(_, id) if id == requester => RegistrationPlan::Reissue,
        RecordState::ActiveLinked(_, _) => {
            RegistrationPlan::Reject(Rejection::LinkedToOtherAccount)
        }
        RecordState::ActiveUnlinked(target) => {
            let held_elsewhere: Vec<&SubscriberRecord> = rows
                .iter()
                .filter(|row| row.row != target.row && row.linked_identity == Some(requester))
                .collect();

            if held_elsewhere.iter().any(|row| row.active) {
                return RegistrationPlan::Reject(Rejection::IdentityLinkedElsewhere);
            }

            RegistrationPlan::Link {
                row: target.row,
                release: held_elsewhere.iter().map(|row| row.row).collect(),
            }
        }
    }
}

/// Whether `member` is a verified, currently-paying customer.
pub fn is_verified_member(rows: &[SubscriberRecord], member: UserId) -> bool {
    rows.iter()
        .any(|row| row.active && row.linked_identity == Some(member))
}

/// What a cancellation should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationPlan {
    /// Row whose active flag is cleared.
    pub row: RowRef,
    /// Linked member to remove from the guarded chat.
    pub kick: Option<UserId>,
}

/// Decide a cancellation for `email`. `None` means there is nothing to do.
pub fn plan_cancellation(rows: &[SubscriberRecord], email: &str) -> Option<CancellationPlan> {
    rows.iter()
        .find(|row| row.active && row.email == email)
        .map(|row| CancellationPlan {
            row: row.row,
            kick: row.linked_identity,
        })
}
