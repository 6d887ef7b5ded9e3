//! User-facing reply texts.

/// Every message the bot sends in response to a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Registration linked a fresh subscription.
    Welcome,
    /// The requester is already linked to this subscription.
    AlreadyRegistered,
    /// The subscription is linked to another messaging account.
    LinkedToOtherAccount,
    /// The requester's account is linked to another active subscription.
    IdentityLinkedElsewhere,
    /// No active subscription for the decoded email.
    NotSubscribed,
    /// `/start` arrived without a registration token.
    MissingToken,
    /// The registry could not be consulted.
    SomethingWentWrong,
}

impl Reply {
    pub fn text(self) -> &'static str {
        match self {
            Reply::Welcome => {
                "Welcome, you're in! Use the button below to join the private chat."
            }
            Reply::AlreadyRegistered => {
                "You're already registered. Here is your invite to the private chat again."
            }
            Reply::LinkedToOtherAccount => {
                "This subscription is already registered with a different account. \
                 Please use the account you registered with, or contact support."
            }
            Reply::IdentityLinkedElsewhere => {
                "Your account is already linked to another active subscription."
            }
            Reply::NotSubscribed => {
                "Sorry, you're out: we couldn't find an active subscription for this link."
            }
            Reply::MissingToken => {
                "Please open the personal registration link you received after subscribing."
            }
            Reply::SomethingWentWrong => "Something went wrong. Please try again in a few minutes.",
        }
    }

    /// Whether the reply carries the invite button.
    pub fn includes_invite(self) -> bool {
        matches!(self, Reply::Welcome | Reply::AlreadyRegistered)
    }
}

/// Label of the invite button.
pub const INVITE_BUTTON_LABEL: &str = "Join the chat";
