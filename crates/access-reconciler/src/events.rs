//! Inbound events, decoded once at the transport boundary.

use crate::types::{ChatId, UserId};

/// A platform update the reconciler knows how to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A `/command [argument]` message.
    TextCommand {
        chat: ChatId,
        from: UserId,
        /// Lowercased command name without the leading slash or `@bot` suffix.
        command: String,
        argument: Option<String>,
    },
    /// One or more users joined a chat.
    ChatJoin { chat: ChatId, members: Vec<UserId> },
    /// Anything else; acknowledged and dropped.
    Other,
}

impl InboundEvent {
    /// Classify a plain text message. Text that is not a command is `Other`.
    pub fn from_text(chat: ChatId, from: UserId, text: &str) -> Self {
        match parse_command(text) {
            Some((command, argument)) => InboundEvent::TextCommand {
                chat,
                from,
                command,
                argument,
            },
            None => InboundEvent::Other,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::TextCommand { .. } => "text_command",
            InboundEvent::ChatJoin { .. } => "chat_join",
            InboundEvent::Other => "other",
        }
    }
}

fn parse_command(text: &str) -> Option<(String, Option<String>)> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;

    let (head, tail) = match rest.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (rest, ""),
    };

    let name = head.split('@').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }

    let argument = (!tail.is_empty()).then(|| tail.to_string());
    Some((name.to_ascii_lowercase(), argument))
}
