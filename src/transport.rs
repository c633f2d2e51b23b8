//! Transport selection and the outbound sender
//!
//! On startup the engine tries the bidirectional WebSocket. If the
//! connection cannot be made, or errors later, the session downgrades
//! permanently to the one-way SSE push channel; outbound commands then go
//! over a one-shot HTTP POST. There is no reconnection attempt back to
//! the socket.

use crate::protocol::{ClientCommand, Inbound};
use crate::{FeedboardConfig, Result};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{error, info, warn};

/// Which channel currently feeds the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    WebSocket,
    Sse,
}

/// Outbound path: the live WebSocket when there is one, HTTP POST
/// otherwise. Acknowledgments are never awaited here; they come back
/// through the dispatcher.
#[derive(Clone)]
pub struct Sender {
    socket: Arc<Mutex<Option<mpsc::Sender<String>>>>,
    http: reqwest::Client,
    command_url: String,
}

impl Sender {
    pub async fn send(&self, command: &ClientCommand) -> Result<()> {
        let payload = serde_json::to_string(command)?;
        let live = self.socket.lock().await.clone();
        if let Some(tx) = live {
            if tx.send(payload.clone()).await.is_ok() {
                return Ok(());
            }
            // Writer task is gone; stay on the fallback path from here on.
            self.socket.lock().await.take();
        }
        self.http
            .post(&self.command_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;
        Ok(())
    }

    /// A sender with no socket: every command goes straight over the HTTP
    /// fallback path. This is what a session looks like after a permanent
    /// downgrade.
    pub fn detached(command_url: &str) -> Self {
        Self {
            socket: Arc::new(Mutex::new(None)),
            http: reqwest::Client::new(),
            command_url: command_url.to_string(),
        }
    }

    pub async fn mode(&self) -> TransportMode {
        if self.socket.lock().await.is_some() {
            TransportMode::WebSocket
        } else {
            TransportMode::Sse
        }
    }
}

/// Open the transport, spawning reader/writer tasks that feed
/// `inbound_tx`, and return the matching outbound sender.
pub async fn connect(config: &FeedboardConfig, inbound_tx: mpsc::Sender<Inbound>) -> Sender {
    let http = reqwest::Client::new();
    let socket = Arc::new(Mutex::new(None));
    let sender = Sender {
        socket: socket.clone(),
        http: http.clone(),
        command_url: config.command_url.clone(),
    };

    match tokio_tungstenite::connect_async(config.ws_url.as_str()).await {
        Ok((stream, _)) => {
            info!(url = %config.ws_url, "WebSocket channel open");
            let (mut write, mut read) = stream.split();
            let (out_tx, mut out_rx) = mpsc::channel::<String>(32);
            socket.lock().await.replace(out_tx);

            tokio::spawn(async move {
                while let Some(payload) = out_rx.recv().await {
                    if let Err(e) = write.send(WsMessage::Text(payload.into())).await {
                        warn!(error = %e, "WebSocket send failed");
                        break;
                    }
                }
            });

            let socket_slot = socket;
            let sse_url = config.sse_url.clone();
            tokio::spawn(async move {
                while let Some(frame) = read.next().await {
                    match frame {
                        Ok(WsMessage::Text(text)) => {
                            if inbound_tx.send(Inbound::parse(&text)).await.is_err() {
                                return;
                            }
                        }
                        Ok(WsMessage::Close(_)) => {
                            info!("WebSocket closed by server");
                            socket_slot.lock().await.take();
                            return;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "WebSocket error, falling back to SSE");
                            socket_slot.lock().await.take();
                            tokio::spawn(run_sse(http, sse_url, inbound_tx));
                            return;
                        }
                    }
                }
                info!("WebSocket stream ended");
                socket_slot.lock().await.take();
            });
        }
        Err(e) => {
            warn!(error = %e, "WebSocket unavailable, falling back to SSE");
            tokio::spawn(run_sse(http, config.sse_url.clone(), inbound_tx));
        }
    }
    sender
}

/// Receive-only SSE loop. Frames reach the dispatcher exactly like socket
/// frames; an unparsable payload travels as a raw string.
async fn run_sse(http: reqwest::Client, sse_url: String, inbound_tx: mpsc::Sender<Inbound>) {
    info!(url = %sse_url, "SSE fallback channel open");
    let response = match http
        .get(&sse_url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "SSE connect failed");
            return;
        }
    };

    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                for event in parser.push(&text) {
                    if inbound_tx.send(Inbound::parse(&event)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "SSE stream error");
                return;
            }
        }
    }
    info!("SSE stream ended");
}

/// Incremental parser for `text/event-stream` framing: `data:` lines
/// accumulate, a blank line emits the event, every other field and
/// comment line is ignored.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: String,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning any event payloads it completes. Chunk
    /// boundaries may fall anywhere, including mid-line.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let mut events = Vec::new();
        self.pending.push_str(chunk);
        while let Some(newline) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data
                    .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_single_event() {
        let mut parser = SseParser::new();
        let events = parser.push("data: {\"cmd\":\"x\"}\n\n");
        assert_eq!(events, vec!["{\"cmd\":\"x\"}".to_string()]);
    }

    #[test]
    fn test_sse_multiline_data_joins_with_newline() {
        let mut parser = SseParser::new();
        let events = parser.push("data: first\ndata: second\n\n");
        assert_eq!(events, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn test_sse_chunk_boundaries_anywhere() {
        let mut parser = SseParser::new();
        assert!(parser.push("da").is_empty());
        assert!(parser.push("ta: hel").is_empty());
        assert!(parser.push("lo\n").is_empty());
        let events = parser.push("\n");
        assert_eq!(events, vec!["hello".to_string()]);
    }

    #[test]
    fn test_sse_ignores_comments_and_other_fields() {
        let mut parser = SseParser::new();
        let events = parser.push(": ping\nretry: 5000\nevent: message\ndata: body\n\n");
        assert_eq!(events, vec!["body".to_string()]);
    }

    #[test]
    fn test_sse_crlf_lines() {
        let mut parser = SseParser::new();
        let events = parser.push("data: body\r\n\r\n");
        assert_eq!(events, vec!["body".to_string()]);
    }

    #[test]
    fn test_sse_blank_without_data_emits_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.push("\n\n\n").is_empty());
    }

    #[tokio::test]
    async fn test_sender_without_socket_reports_sse_mode() {
        let sender = Sender::detached("http://127.0.0.1:1/cmd");
        assert_eq!(sender.mode().await, TransportMode::Sse);
    }

    #[tokio::test]
    async fn test_sender_downgrades_when_writer_is_gone() {
        let (tx, rx) = mpsc::channel::<String>(1);
        drop(rx);
        let sender = Sender {
            socket: Arc::new(Mutex::new(Some(tx))),
            http: reqwest::Client::new(),
            command_url: "http://127.0.0.1:1/cmd".to_string(),
        };
        assert_eq!(sender.mode().await, TransportMode::WebSocket);

        // The POST fallback has nothing listening, so the send errors,
        // but the downgrade itself must stick.
        let result = sender
            .send(&ClientCommand::DelColumn {
                title: "News".to_string(),
            })
            .await;
        assert!(result.is_err());
        assert_eq!(sender.mode().await, TransportMode::Sse);
    }
}
