//! Shared server state.

use access_reconciler::AccessReconciler;
use std::sync::Arc;

/// State shared by every HTTP handler (cheap to clone).
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<AccessReconciler>,
    /// Username used in registration links; `None` until known.
    pub bot_username: Option<String>,
    /// Expected `X-Telegram-Bot-Api-Secret-Token`.
    pub webhook_secret: Option<String>,
    /// Expected `X-Gatekeeper-Secret` on the cancellation and link routes.
    pub cancel_secret: Option<String>,
}
