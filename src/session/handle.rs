//! # Session Task
//!
//! Runs a `SessionManager` on its own tokio task and exposes it through a cloneable
//! `SessionHandle`.
//!
//! ## Channels:
//! - **commands** (mpsc): `connect` / `disconnect` from HTTP handlers and WebSocket actors
//! - **status** (watch): latest `SessionStatus`, republished after every step
//! - **events** (broadcast): observer callbacks as `SessionEvent`s for every subscriber
//!
//! When the last handle is dropped the task tears the session down and exits.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audio::backend::AudioBackend;
use crate::error::{AppError, AppResult};
use crate::live::LiveTransport;
use crate::session::{
    SessionEvent, SessionManager, SessionObserver, SessionSettings, SessionStatus,
};
use crate::topics::{PracticeMode, TopicContext};

const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 256;

#[derive(Debug)]
enum Command {
    Connect {
        mode: PracticeMode,
        topic: Option<TopicContext>,
        started: oneshot::Sender<Option<Uuid>>,
    },
    Disconnect,
    /// Disconnect only if this session is still the active one
    End(Uuid),
}

/// Forwards observer callbacks onto the broadcast channel.
struct BroadcastObserver {
    events: broadcast::Sender<SessionEvent>,
}

impl BroadcastObserver {
    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl SessionObserver for BroadcastObserver {
    fn on_connect(&self) {
        self.publish(SessionEvent::Connected);
    }

    fn on_disconnect(&self) {
        self.publish(SessionEvent::Disconnected);
    }

    fn on_error(&self, message: &str) {
        self.publish(SessionEvent::Error {
            message: message.to_string(),
        });
    }

    fn on_volume_change(&self, input: f32, output: f32) {
        self.publish(SessionEvent::Volume { input, output });
    }
}

/// Publishes snapshots, stamping each session with the time it was first seen.
struct StatusPublisher {
    status: watch::Sender<SessionStatus>,
    current: Option<(Uuid, DateTime<Utc>)>,
}

impl StatusPublisher {
    fn new(status: watch::Sender<SessionStatus>) -> Self {
        Self { status, current: None }
    }

    fn publish(&mut self, mut snapshot: SessionStatus) {
        snapshot.started_at = match (snapshot.session_id, self.current) {
            (Some(id), Some((current, started))) if id == current => Some(started),
            (Some(id), _) => {
                let now = Utc::now();
                self.current = Some((id, now));
                Some(now)
            }
            (None, _) => {
                self.current = None;
                None
            }
        };

        self.status.send_if_modified(|status| {
            if *status == snapshot {
                false
            } else {
                *status = snapshot;
                true
            }
        });
    }
}

/// Cloneable front of the session task.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Start the session task. Must be called inside a tokio runtime.
    pub fn spawn(
        backend: Box<dyn AudioBackend>,
        transport: Arc<dyn LiveTransport>,
        settings: SessionSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let observer = Arc::new(BroadcastObserver {
            events: events.clone(),
        });
        let manager = SessionManager::new(backend, transport, observer, settings);

        let (status_tx, status) = watch::channel(manager.snapshot());
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(drive(manager, command_rx, StatusPublisher::new(status_tx)));

        Self {
            commands,
            status,
            events,
        }
    }

    /// Ask for a new session.
    ///
    /// Returns the new session's id, or `None` when the task ignored the request because a
    /// session was already active.
    pub async fn connect(&self, mode: PracticeMode, topic: Option<TopicContext>) -> AppResult<Option<Uuid>> {
        let (started, reply) = oneshot::channel();
        self.send(Command::Connect { mode, topic, started }).await?;
        reply
            .await
            .map_err(|_| AppError::Internal("session task has stopped".to_string()))
    }

    pub async fn disconnect(&self) -> AppResult<()> {
        self.send(Command::Disconnect).await
    }

    /// Disconnect session `id`. A no-op once another session (or none) is active.
    pub async fn end_session(&self, id: Uuid) -> AppResult<()> {
        self.send(Command::End(id)).await
    }

    async fn send(&self, command: Command) -> AppResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::Internal("session task has stopped".to_string()))
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that sees every status change.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

async fn drive(
    mut manager: SessionManager,
    mut commands: mpsc::Receiver<Command>,
    mut publisher: StatusPublisher,
) {
    info!("Session task started");
    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(Command::Connect { mode, topic, started }) => {
                    let id = manager.connect(mode, topic).await;
                    // The caller may have given up waiting
                    let _ = started.send(id);
                }
                Some(Command::Disconnect) => manager.disconnect().await,
                Some(Command::End(id)) => {
                    if manager.session_id() == Some(id) {
                        manager.disconnect().await;
                    } else {
                        debug!(session_id = %id, "end ignored: session no longer active");
                    }
                }
                None => {
                    debug!("All session handles dropped");
                    manager.disconnect().await;
                    publisher.publish(manager.snapshot());
                    break;
                }
            },
            signal = manager.next_signal() => manager.handle_signal(signal).await,
        }
        publisher.publish(manager.snapshot());
    }
    info!("Session task stopped");
}
