//! Identifiers and registry records shared by the reconciler and its adapters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Messaging-platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messaging-platform chat identifier. Group ids are negative on Telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1-based row number of a record inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowRef(pub u32);

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One customer row in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberRecord {
    pub row: RowRef,
    /// Unique natural key, compared case-sensitively.
    pub email: String,
    /// True while the customer is paying.
    pub active: bool,
    /// Set once the customer completes registration.
    pub linked_identity: Option<UserId>,
}

impl SubscriberRecord {
    /// Build a record; mostly useful in tests and fakes.
    pub fn new(row: u32, email: impl Into<String>, active: bool, linked: Option<i64>) -> Self {
        Self {
            row: RowRef(row),
            email: email.into(),
            active,
            linked_identity: linked.map(UserId),
        }
    }
}

/// The registry columns the reconciler is allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    Active,
    LinkedIdentity,
}

/// A single writable cell: one field of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub row: RowRef,
    pub field: RecordField,
}

impl CellRef {
    pub fn active(row: RowRef) -> Self {
        Self {
            row,
            field: RecordField::Active,
        }
    }

    pub fn linked_identity(row: RowRef) -> Self {
        Self {
            row,
            field: RecordField::LinkedIdentity,
        }
    }
}

/// Value written to the active column on cancellation.
pub const INACTIVE_VALUE: &str = "FALSE";

/// Identity of the bot account itself, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: UserId,
    pub username: Option<String>,
}

/// Interactive controls attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyControls {
    /// A single inline button that opens `url`.
    LinkButton { label: String, url: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_constructor_maps_identity() {
        let record = SubscriberRecord::new(5, "a@x.com", true, Some(42));
        assert_eq!(record.row, RowRef(5));
        assert_eq!(record.linked_identity, Some(UserId(42)));
    }

    #[test]
    fn ids_display_as_plain_numbers() {
        assert_eq!(UserId(42).to_string(), "42");
        assert_eq!(ChatId(-1001234).to_string(), "-1001234");
    }
}
