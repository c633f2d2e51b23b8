//! Feedboard - client engine for a column-based social feed dashboard
//!
//! A headless engine that:
//! - Maintains dashboard state for user-defined columns of subscribed feeds
//! - Ingests a live push feed of messages and notifications over WebSocket,
//!   falling back permanently to SSE when the socket is unavailable
//! - Sends column-edit commands back to the server

pub mod catalog;
pub mod codec;
pub mod dispatch;
pub mod engine;
pub mod ingest;
pub mod protocol;
pub mod state;
pub mod transport;

pub use dispatch::Dispatcher;
pub use engine::{Engine, EngineEvent, UiAction};
pub use protocol::{ClientCommand, Inbound, ServerCommand};
pub use state::Dashboard;

use serde::Deserialize;

/// Configuration for the engine
#[derive(Debug, Clone)]
pub struct FeedboardConfig {
    /// WebSocket endpoint for the bidirectional command channel
    pub ws_url: String,

    /// SSE endpoint for the fallback one-way push channel
    pub sse_url: String,

    /// HTTP endpoint accepting outbound commands when no socket is live
    pub command_url: String,

    /// HTTP endpoint returning the full service catalog
    pub catalog_url: String,

    /// Whether to show verbose output including every dispatched command
    pub verbose: bool,
}

impl FeedboardConfig {
    /// Derive the full endpoint set from a server base URL such as
    /// `http://localhost:9000`.
    pub fn new(server_url: &str) -> Self {
        let base = server_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{base}")
        };
        Self {
            ws_url: format!("{ws_base}/api/stream/ws"),
            sse_url: format!("{base}/api/stream/sse"),
            command_url: format!("{base}/api/stream/command"),
            catalog_url: format!("{base}/api/providers/services"),
            verbose: false,
        }
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn with_sse_url(mut self, url: impl Into<String>) -> Self {
        self.sse_url = url.into();
        self
    }

    pub fn with_command_url(mut self, url: impl Into<String>) -> Self {
        self.command_url = url.into();
        self
    }

    pub fn with_catalog_url(mut self, url: impl Into<String>) -> Self {
        self.catalog_url = url.into();
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// On-disk configuration, loaded from `feedboard/config.toml` under the
/// user config directory (or an explicit `--config` path). Every field is
/// optional; CLI flags win over the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub server_url: Option<String>,
    pub ws_url: Option<String>,
    pub sse_url: Option<String>,
    pub command_url: Option<String>,
    pub catalog_url: Option<String>,
}

impl ConfigFile {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| FeedboardError::Config(e.to_string()))
    }

    /// Apply the file's overrides on top of a derived config.
    pub fn apply(&self, mut config: FeedboardConfig) -> FeedboardConfig {
        if let Some(url) = &self.ws_url {
            config.ws_url = url.clone();
        }
        if let Some(url) = &self.sse_url {
            config.sse_url = url.clone();
        }
        if let Some(url) = &self.command_url {
            config.command_url = url.clone();
        }
        if let Some(url) = &self.catalog_url {
            config.catalog_url = url.clone();
        }
        config
    }
}

/// Result type for Feedboard operations
pub type Result<T> = std::result::Result<T, FeedboardError>;

/// Errors that can occur in Feedboard
#[derive(Debug, thiserror::Error)]
pub enum FeedboardError {
    #[error("WebSocket transport error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Engine channel closed: {0}")]
    ChannelClosed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_derives_endpoints() {
        let config = FeedboardConfig::new("http://localhost:9000/");
        assert_eq!(config.ws_url, "ws://localhost:9000/api/stream/ws");
        assert_eq!(config.sse_url, "http://localhost:9000/api/stream/sse");
        assert_eq!(config.command_url, "http://localhost:9000/api/stream/command");
        assert_eq!(
            config.catalog_url,
            "http://localhost:9000/api/providers/services"
        );
    }

    #[test]
    fn test_config_https_becomes_wss() {
        let config = FeedboardConfig::new("https://feeds.example.com");
        assert_eq!(config.ws_url, "wss://feeds.example.com/api/stream/ws");
    }

    #[test]
    fn test_config_file_overrides() {
        let file = ConfigFile {
            sse_url: Some("http://other/push".to_string()),
            ..Default::default()
        };
        let config = file.apply(FeedboardConfig::new("http://localhost:9000"));
        assert_eq!(config.sse_url, "http://other/push");
        assert_eq!(config.ws_url, "ws://localhost:9000/api/stream/ws");
    }
}
