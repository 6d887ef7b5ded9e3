//! Telegram update payloads and their translation into inbound events.
//!
//! Only the fields the reconciler acts on are modelled; everything else in
//! the payload is ignored by serde.

use access_reconciler::{ChatId, InboundEvent, UserId};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub chat_member: Option<ChatMemberUpdated>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub new_chat_members: Vec<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
}

/// A change of one member's status in a chat.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub old_chat_member: ChatMember,
    pub new_chat_member: ChatMember,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
    pub user: User,
    /// Only present for `restricted` members.
    #[serde(default)]
    pub is_member: Option<bool>,
}

impl ChatMember {
    fn is_present(&self) -> bool {
        match self.status.as_str() {
            "creator" | "administrator" | "member" => true,
            "restricted" => self.is_member.unwrap_or(false),
            _ => false,
        }
    }
}

impl Update {
    /// Decode the parts of the update the reconciler cares about.
    pub fn into_event(self) -> InboundEvent {
        if let Some(message) = self.message {
            if !message.new_chat_members.is_empty() {
                return InboundEvent::ChatJoin {
                    chat: ChatId(message.chat.id),
                    members: message
                        .new_chat_members
                        .iter()
                        .map(|user| UserId(user.id))
                        .collect(),
                };
            }

            return match (message.text, message.from) {
                (Some(text), Some(from)) => {
                    InboundEvent::from_text(ChatId(message.chat.id), UserId(from.id), &text)
                }
                _ => InboundEvent::Other,
            };
        }

        if let Some(change) = self.chat_member {
            if !change.old_chat_member.is_present() && change.new_chat_member.is_present() {
                return InboundEvent::ChatJoin {
                    chat: ChatId(change.chat.id),
                    members: vec![UserId(change.new_chat_member.user.id)],
                };
            }
        }

        InboundEvent::Other
    }
}

/// Parse a raw webhook body.
pub fn decode_update(body: &[u8]) -> serde_json::Result<InboundEvent> {
    let update: Update = serde_json::from_slice(body)?;
    Ok(update.into_event())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> InboundEvent {
        decode_update(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn start_command_in_private_chat() {
        let event = decode(json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "date": 0,
                "chat": {"id": 42, "type": "private"},
                "from": {"id": 42, "is_bot": false, "first_name": "A"},
                "text": "/start YUB4LmNvbQ"
            }
        }));
        assert_eq!(
            event,
            InboundEvent::TextCommand {
                chat: ChatId(42),
                from: UserId(42),
                command: "start".to_string(),
                argument: Some("YUB4LmNvbQ".to_string()),
            }
        );
    }

    #[test]
    fn new_chat_members_service_message() {
        let event = decode(json!({
            "update_id": 2,
            "message": {
                "message_id": 11,
                "date": 0,
                "chat": {"id": -1001, "type": "supergroup"},
                "from": {"id": 42, "is_bot": false, "first_name": "A"},
                "new_chat_members": [
                    {"id": 42, "is_bot": false, "first_name": "A"},
                    {"id": 99, "is_bot": false, "first_name": "B"}
                ]
            }
        }));
        assert_eq!(
            event,
            InboundEvent::ChatJoin {
                chat: ChatId(-1001),
                members: vec![UserId(42), UserId(99)],
            }
        );
    }

    #[test]
    fn chat_member_join_transition() {
        let event = decode(json!({
            "update_id": 3,
            "chat_member": {
                "chat": {"id": -1001, "type": "supergroup"},
                "from": {"id": 99, "is_bot": false, "first_name": "B"},
                "date": 0,
                "old_chat_member": {"status": "left", "user": {"id": 99, "is_bot": false}},
                "new_chat_member": {"status": "member", "user": {"id": 99, "is_bot": false}}
            }
        }));
        assert_eq!(
            event,
            InboundEvent::ChatJoin {
                chat: ChatId(-1001),
                members: vec![UserId(99)],
            }
        );
    }

    #[test]
    fn leaving_or_promotion_is_not_a_join() {
        let leave = decode(json!({
            "update_id": 4,
            "chat_member": {
                "chat": {"id": -1001},
                "old_chat_member": {"status": "member", "user": {"id": 99}},
                "new_chat_member": {"status": "left", "user": {"id": 99}}
            }
        }));
        let promote = decode(json!({
            "update_id": 5,
            "chat_member": {
                "chat": {"id": -1001},
                "old_chat_member": {"status": "member", "user": {"id": 99}},
                "new_chat_member": {"status": "administrator", "user": {"id": 99}}
            }
        }));
        assert_eq!(leave, InboundEvent::Other);
        assert_eq!(promote, InboundEvent::Other);
    }

    #[test]
    fn restricted_member_counts_only_when_present() {
        let event = decode(json!({
            "update_id": 6,
            "chat_member": {
                "chat": {"id": -1001},
                "old_chat_member": {"status": "kicked", "user": {"id": 7}},
                "new_chat_member": {"status": "restricted", "is_member": true, "user": {"id": 7}}
            }
        }));
        assert!(matches!(event, InboundEvent::ChatJoin { .. }));
    }

    #[test]
    fn unrelated_updates_are_other() {
        assert_eq!(
            decode(json!({"update_id": 7, "edited_message": {"chat": {"id": 1}}})),
            InboundEvent::Other
        );
        assert_eq!(
            decode(json!({
                "update_id": 8,
                "message": {"chat": {"id": 1}, "photo": []}
            })),
            InboundEvent::Other
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_update(b"not json").is_err());
        assert!(decode_update(b"{\"message\": {}}").is_err());
    }
}
