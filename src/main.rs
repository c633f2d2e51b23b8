//! Feedboard CLI
//!
//! Runs the engine headless against a dashboard server: the push feed and
//! engine activity go to the log, and a tiny line-based console on stdin
//! drives UI actions.

use clap::Parser;
use feedboard::{ConfigFile, Engine, EngineEvent, FeedboardConfig, UiAction};
use std::io::{self, BufRead};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Feedboard - client engine for a column-based social feed dashboard
#[derive(Parser, Debug)]
#[command(name = "feedboard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Dashboard server base URL
    #[arg(long, default_value = "http://localhost:9000")]
    server: String,

    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output: log every dispatched command
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = FeedboardConfig::new(&cli.server).with_verbose(cli.verbose);
    if let Some(path) = config_path(cli.config.clone()) {
        if path.exists() {
            let file = ConfigFile::load(&path)?;
            if let Some(server_url) = &file.server_url {
                config = file.apply(FeedboardConfig::new(server_url).with_verbose(cli.verbose));
            } else {
                config = file.apply(config);
            }
            info!("Loaded config from {:?}", path);
        }
    }

    info!("Connecting to {}", cli.server);

    let (actions_tx, actions_rx) = mpsc::channel::<UiAction>(32);
    let (events_tx, mut events_rx) = mpsc::channel::<EngineEvent>(32);

    // Blocking stdin console feeding the action channel
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    let Some(action) = parse_action(&line) else {
                        if !line.trim().is_empty() {
                            eprintln!("Unknown command: {line}");
                        }
                        continue;
                    };
                    if actions_tx.blocking_send(action).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Error reading stdin: {e}");
                    break;
                }
            }
        }
    });

    // Engine events only surface as log lines in the CLI
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                EngineEvent::LinkRequested { social_network, .. } => {
                    warn!("Account linking requested for {social_network}; open /auth/{social_network} in a browser");
                }
            }
        }
    });

    let engine = Engine::new(config);
    engine.run(actions_rx, events_tx).await?;

    Ok(())
}

/// Resolve the config file path: explicit flag, else
/// `<config dir>/feedboard/config.toml`.
fn config_path(cli_path: Option<PathBuf>) -> Option<PathBuf> {
    cli_path.or_else(|| dirs::config_dir().map(|dir| dir.join("feedboard").join("config.toml")))
}

/// Parse one console line into a UI action.
fn parse_action(line: &str) -> Option<UiAction> {
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "add" => Some(UiAction::AddColumn),
        "edit" => Some(UiAction::ToggleEdit {
            column: parts.next()?.parse().ok()?,
        }),
        "commit" => Some(UiAction::CommitColumn {
            column: parts.next()?.parse().ok()?,
        }),
        "del" => Some(UiAction::DeleteColumn {
            column: parts.next()?.parse().ok()?,
        }),
        "notif" => Some(UiAction::ClickNotification {
            index: parts.next()?.parse().ok()?,
        }),
        "show" => Some(UiAction::PageVisible(true)),
        "hide" => Some(UiAction::PageVisible(false)),
        "refresh" => Some(UiAction::RefreshCatalog),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_commands() {
        assert!(matches!(parse_action("add"), Some(UiAction::AddColumn)));
        assert!(matches!(
            parse_action("edit 2"),
            Some(UiAction::ToggleEdit { column: 2 })
        ));
        assert!(matches!(
            parse_action("del 0"),
            Some(UiAction::DeleteColumn { column: 0 })
        ));
        assert!(matches!(
            parse_action("hide"),
            Some(UiAction::PageVisible(false))
        ));
        assert!(parse_action("edit").is_none());
        assert!(parse_action("frobnicate").is_none());
        assert!(parse_action("").is_none());
    }

    #[test]
    fn test_config_path_prefers_cli_flag() {
        let explicit = PathBuf::from("/tmp/feedboard.toml");
        assert_eq!(config_path(Some(explicit.clone())), Some(explicit));
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_url = \"http://feeds.local\"\n").unwrap();

        let file = ConfigFile::load(&path).unwrap();
        assert_eq!(file.server_url.as_deref(), Some("http://feeds.local"));
        let config = file.apply(FeedboardConfig::new(file.server_url.as_deref().unwrap()));
        assert_eq!(config.sse_url, "http://feeds.local/api/stream/sse");
    }
}
