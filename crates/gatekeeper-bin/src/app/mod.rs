//! Application wiring and lifecycle.

mod init;
mod state;

pub use init::{print_link, run_server, set_webhook, write_config_template};
pub use state::AppState;
