//! # WebSocket Session Channel
//!
//! Lets a front-end drive the live session and follow it in real time.
//! Clients connect to `/ws/session`; every connection sees the same (single) session.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: the server immediately sends a `status` message
//! 2. **Control**: the client sends `connect` / `disconnect` / `status`
//! 3. **Events**: the server pushes `connected`, `disconnected`, `error` and `volume` as the
//!    session produces them
//! 4. **Heartbeat**: the server sends `ping` every 30s; clients answer with `pong`
//!
//! ## Message Format:
//! - **Client → Server**: `{"type":"connect","mode":"CASUAL","topic_id":"daily-chat"}`,
//!   `{"type":"disconnect"}`, `{"type":"status"}`, `{"type":"pong","timestamp":...}`
//! - **Server → Client**: JSON objects tagged by `type`

use crate::session::{SessionEvent, SessionStatus};
use crate::state::AppState;
use crate::topics::PracticeMode;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Messages a client may send.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Start a session
    #[serde(rename = "connect")]
    Connect {
        #[serde(default)]
        mode: Option<PracticeMode>,
        #[serde(default)]
        topic_id: Option<String>,
    },

    /// End the session
    #[serde(rename = "disconnect")]
    Disconnect,

    /// Ask for a fresh status message
    #[serde(rename = "status")]
    Status,

    /// Heartbeat answer
    #[serde(rename = "pong")]
    Pong {
        timestamp: u64,
    },
}

/// Messages the server pushes.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// The live stream is open
    #[serde(rename = "connected")]
    Connected {
        session_id: Option<Uuid>,
    },

    #[serde(rename = "disconnected")]
    Disconnected,

    /// Caller-visible session failure (microphone, device, connection)
    #[serde(rename = "error")]
    Error {
        message: String,
    },

    /// Input loudness in [0, 1]; output is always 0
    #[serde(rename = "volume")]
    Volume {
        input: f32,
        output: f32,
    },

    #[serde(rename = "status")]
    Status {
        status: SessionStatus,
    },

    #[serde(rename = "ping")]
    Ping {
        timestamp: u64,
    },

    /// Problem with a client message, not with the session
    #[serde(rename = "socket_error")]
    SocketError {
        code: String,
        message: String,
    },
}

impl OutboundMessage {
    /// Wire form of a session event.
    pub fn from_event(event: SessionEvent, session_id: Option<Uuid>) -> Self {
        match event {
            SessionEvent::Connected => OutboundMessage::Connected { session_id },
            SessionEvent::Disconnected => OutboundMessage::Disconnected,
            SessionEvent::Error { message } => OutboundMessage::Error { message },
            SessionEvent::Volume { input, output } => OutboundMessage::Volume { input, output },
        }
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// One WebSocket connection.
pub struct SessionWebSocket {
    state: web::Data<AppState>,

    /// Last heartbeat time
    last_heartbeat: Instant,

    /// Session this connection started; only that one ends with the socket
    owned_session: Option<Uuid>,
}

impl SessionWebSocket {
    pub fn new(state: web::Data<AppState>) -> Self {
        Self {
            state,
            last_heartbeat: Instant::now(),
            owned_session: None,
        }
    }

    /// Record the answer to this socket's `connect`. `None` (session already active) claims
    /// nothing, so a no-op connect never gives this socket a say over someone else's session.
    fn record_started(&mut self, started: Option<Uuid>) {
        if let Some(id) = started {
            self.owned_session = Some(id);
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &OutboundMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(e) => error!("Failed to serialize WebSocket message: {}", e),
        }
    }

    fn send_status(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let status = self.state.session.status();
        self.send(ctx, &OutboundMessage::Status { status });
    }

    /// Send error message to client.
    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        self.send(
            ctx,
            &OutboundMessage::SocketError {
                code: code.to_string(),
                message: message.to_string(),
            },
        );
        warn!("WebSocket error {}: {}", code, message);
    }

    fn handle_connect(
        &mut self,
        mode: Option<PracticeMode>,
        topic_id: Option<String>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let (mode, topic) = match self.state.catalog.resolve(mode, topic_id.as_deref()) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.send_error(ctx, e.kind(), &e.to_string());
                return;
            }
        };

        let session = self.state.session.clone();
        ctx.spawn(
            async move { session.connect(mode, topic).await }
                .into_actor(self)
                .map(|result, act, ctx| match result {
                    Ok(started) => {
                        if started.is_none() {
                            debug!("connect ignored: a session is already active");
                        }
                        act.record_started(started);
                    }
                    Err(e) => act.send_error(ctx, e.kind(), &e.to_string()),
                }),
        );
    }

    fn handle_disconnect(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        self.owned_session = None;
        let session = self.state.session.clone();
        ctx.spawn(
            async move { session.disconnect().await }
                .into_actor(self)
                .map(|result, act, ctx| {
                    if let Err(e) = result {
                        act.send_error(ctx, e.kind(), &e.to_string());
                    }
                }),
        );
    }

    /// Handle pong message from client.
    fn handle_pong(&mut self, timestamp: u64) {
        debug!(rtt_ms = now_millis().saturating_sub(timestamp), "WebSocket pong");
        self.last_heartbeat = Instant::now();
    }
}

impl Actor for SessionWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection started");

        ctx.add_stream(BroadcastStream::new(self.state.session.subscribe()));
        self.send_status(ctx);

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                act.send(ctx, &OutboundMessage::Ping { timestamp: now_millis() });
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("WebSocket connection stopped");

        // A front-end that goes away takes its own session with it
        if let Some(id) = self.owned_session.take() {
            let session = self.state.session.clone();
            tokio::spawn(async move {
                if let Err(e) = session.end_session(id).await {
                    warn!(session_id = %id, "Ending session of closed WebSocket failed: {}", e);
                }
            });
        }
    }
}

/// Session events relayed to the client.
impl StreamHandler<Result<SessionEvent, BroadcastStreamRecvError>> for SessionWebSocket {
    fn handle(&mut self, event: Result<SessionEvent, BroadcastStreamRecvError>, ctx: &mut Self::Context) {
        match event {
            Ok(event) => {
                let session_id = self.state.session.status().session_id;
                self.send(ctx, &OutboundMessage::from_event(event, session_id));
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                debug!(skipped, "WebSocket client fell behind on session events");
            }
        }
    }

    // The event stream ending must not close the socket
    fn finished(&mut self, _ctx: &mut Self::Context) {
        debug!("Session event stream ended");
    }
}

/// Handle incoming WebSocket messages.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SessionWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Connect { mode, topic_id }) => self.handle_connect(mode, topic_id, ctx),
                Ok(ClientMessage::Disconnect) => self.handle_disconnect(ctx),
                Ok(ClientMessage::Status) => self.send_status(ctx),
                Ok(ClientMessage::Pong { timestamp }) => self.handle_pong(timestamp),
                Err(err) => {
                    self.send_error(ctx, "invalid_json", &format!("Invalid JSON: {}", err));
                }
            },
            Ok(ws::Message::Binary(_)) => {
                self.send_error(ctx, "unsupported", "Binary messages are not supported");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// `GET /ws/session`
pub async fn session_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New WebSocket connection request from: {:?}", req.connection_info().peer_addr());
    ws::start(SessionWebSocket::new(app_state), &req, stream)
}
