//! Gatekeeper - admits paying customers to a private Telegram chat and removes everyone else.

mod app;
mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gatekeeper_config_and_utils::{init_logging, Config, LogFormat, Paths};

/// Gatekeeper command-line interface.
#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(about = "Access control bot for a paid private Telegram chat")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Config file. Defaults to ~/.gatekeeper/config.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the webhook and cancellation endpoints
    Serve,
    /// Print the registration link for a customer email
    Link {
        /// Customer email as it appears in the registry
        email: String,
    },
    /// Register the public webhook URL with Telegram
    SetWebhook {
        /// Public HTTPS URL routed to this server's /telegram endpoint
        url: String,
    },
    /// Write a starter config to ~/.gatekeeper/config.json
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(explicit: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match explicit {
        Some(path) => Config::load_explicit(path)?,
        None => Config::load(&Paths::new()?)?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Init { force }) = cli.command {
        let path = app::write_config_template(&Paths::new()?, force)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    init_logging(&config.log_level, LogFormat::from_env());

    match cli.command {
        Some(Commands::Serve) | None => app::run_server(config).await?,
        Some(Commands::Link { email }) => app::print_link(&config, &email)?,
        Some(Commands::SetWebhook { url }) => app::set_webhook(&config, &url).await?,
        Some(Commands::Init { .. }) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["gatekeeper"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn cli_parses_link_with_global_flags() {
        let cli = Cli::try_parse_from([
            "gatekeeper",
            "link",
            "a@x.com",
            "--log-level",
            "debug",
            "--config",
            "/tmp/gk.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Link { ref email }) if email == "a@x.com"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/gk.json")));
    }

    #[test]
    fn cli_parses_set_webhook() {
        let cli =
            Cli::try_parse_from(["gatekeeper", "set-webhook", "https://gate.example/telegram"])
                .unwrap();
        assert!(matches!(cli.command, Some(Commands::SetWebhook { .. })));
    }

    #[test]
    fn cli_parses_init_force() {
        let cli = Cli::try_parse_from(["gatekeeper", "init", "--force"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Init { force: true })));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let missing = PathBuf::from("/nonexistent/gatekeeper/config.json");
        assert!(load_config(Some(&missing)).is_err());
    }
}
