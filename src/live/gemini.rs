//! # Gemini Live Transport
//!
//! `LiveTransport` over a tokio-tungstenite WebSocket to the `BidiGenerateContent` endpoint.
//!
//! Each stream runs two tasks:
//! - **writer**: drains an unbounded channel of outbound frames into the socket sink, so
//!   `send_realtime_input` never waits on the network
//! - **reader**: turns socket frames into `TransportEvent`s until the socket ends

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::audio::codec::MediaBlob;
use crate::config::LiveConfig;
use crate::error::{AppError, AppResult};
use crate::live::protocol::{LiveSetup, RealtimeInputMessage, ServerMessage};
use crate::live::{LiveStream, LiveTransport, TransportEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `close` waits for the close frame to be flushed.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Connects to the Gemini Live API with a fixed endpoint and key.
#[derive(Debug, Clone)]
pub struct GeminiTransport {
    endpoint: String,
    api_key: String,
}

impl GeminiTransport {
    pub fn new(config: &LiveConfig) -> AppResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AppError::ConfigError(
                "live.api_key is empty; set GEMINI_API_KEY".to_string(),
            ));
        }
        if !config.endpoint.starts_with("ws://") && !config.endpoint.starts_with("wss://") {
            return Err(AppError::ConfigError(format!(
                "live.endpoint must be a ws:// or wss:// URL, got '{}'",
                config.endpoint
            )));
        }

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.trim().to_string(),
        })
    }

    fn url(&self) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.endpoint, separator, self.api_key)
    }
}

#[async_trait]
impl LiveTransport for GeminiTransport {
    async fn connect(
        &self,
        setup: LiveSetup,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn LiveStream>> {
        info!(endpoint = %self.endpoint, model = %setup.model, voice = %setup.voice, "Opening live stream");

        let (socket, response) = connect_async(self.url())
            .await
            .context("failed to open live WebSocket")?;
        debug!(status = %response.status(), "Live WebSocket handshake complete");

        let (mut sink, stream) = socket.split();

        let setup_json = serde_json::to_string(&setup.to_message())?;
        sink.send(Message::Text(setup_json))
            .await
            .context("failed to send setup message")?;

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(sink, outbound_rx));

        // Open goes out before the reader can post any message
        let _ = events.send(TransportEvent::Open);
        let reader = tokio::spawn(read_loop(stream, events));

        Ok(Box::new(GeminiStream {
            outbound,
            reader,
            writer: Some(writer),
            closed: false,
        }))
    }
}

/// One open Gemini Live stream.
pub struct GeminiStream {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
    closed: bool,
}

#[async_trait]
impl LiveStream for GeminiStream {
    fn send_realtime_input(&mut self, blob: MediaBlob) -> Result<()> {
        if self.closed {
            return Err(anyhow!("live stream is closed"));
        }
        let json = serde_json::to_string(&RealtimeInputMessage::media(blob))?;
        self.outbound
            .send(Message::Text(json))
            .map_err(|_| anyhow!("live stream writer has stopped"))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Our own close must not come back as a Close event
        self.reader.abort();
        let _ = self.outbound.send(Message::Close(None));

        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, writer).await.is_err() {
                warn!("Timed out flushing live stream close frame");
            }
        }
        debug!("Live stream closed");
        Ok(())
    }
}

impl Drop for GeminiStream {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

async fn write_loop(mut sink: SplitSink<Socket, Message>, mut outbound: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            debug!(error = %e, "Live stream write failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(mut stream: SplitStream<Socket>, events: mpsc::UnboundedSender<TransportEvent>) {
    while let Some(frame) = stream.next().await {
        let event = match frame {
            Ok(Message::Text(text)) => parse_server_message(text.as_bytes()).map(TransportEvent::Message),
            Ok(Message::Binary(bytes)) => parse_server_message(&bytes).map(TransportEvent::Message),
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|reason| !reason.is_empty());
                info!(reason = ?reason, "Live stream closed by server");
                let _ = events.send(TransportEvent::Close(reason));
                return;
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Live stream socket error");
                let _ = events.send(TransportEvent::Error(e.to_string()));
                return;
            }
        };

        if let Some(event) = event {
            if events.send(event).is_err() {
                // Session is gone
                return;
            }
        }
    }

    let _ = events.send(TransportEvent::Close(None));
}

/// Parse one server frame. Frames that are not valid server messages are skipped.
fn parse_server_message(payload: &[u8]) -> Option<ServerMessage> {
    match serde_json::from_slice::<ServerMessage>(payload) {
        Ok(message) => {
            if message.setup_complete.is_some() {
                debug!("Live setup complete");
            }
            if message.turn_complete() {
                debug!("Model turn complete");
            }
            if let Some(go_away) = &message.go_away {
                info!(time_left = ?go_away.time_left, "Server announced disconnect");
            }
            Some(message)
        }
        Err(e) => {
            warn!(error = %e, "Skipping unparseable live message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_config(endpoint: &str, key: &str) -> LiveConfig {
        LiveConfig {
            endpoint: endpoint.to_string(),
            model: "gemini-test".to_string(),
            voice: "Zephyr".to_string(),
            api_key: key.to_string(),
        }
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = GeminiTransport::new(&live_config("wss://example.test/ws", "  ")).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_endpoint_must_be_websocket() {
        let err = GeminiTransport::new(&live_config("https://example.test", "k")).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_key_is_appended_to_url() {
        let transport = GeminiTransport::new(&live_config("wss://example.test/ws", "abc")).unwrap();
        assert_eq!(transport.url(), "wss://example.test/ws?key=abc");

        let transport = GeminiTransport::new(&live_config("wss://example.test/ws?alt=1", "abc")).unwrap();
        assert_eq!(transport.url(), "wss://example.test/ws?alt=1&key=abc");
    }

    #[test]
    fn test_unparseable_frames_are_skipped() {
        assert!(parse_server_message(b"not json").is_none());
        assert!(parse_server_message(b"[1,2]").is_none());

        let message = parse_server_message(br#"{"serverContent":{"interrupted":true}}"#).unwrap();
        assert!(message.interrupted());
    }
}
