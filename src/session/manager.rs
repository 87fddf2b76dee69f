//! # Session Manager
//!
//! The state machine behind one live voice session.
//!
//! The manager owns every resource of the active session and is driven from a single task:
//! commands (`connect`, `disconnect`) and signals (`next_signal` → `handle_signal`) are
//! processed one at a time, so no locks are needed. Device callbacks and network tasks only
//! post into the per-session channels.
//!
//! ## Failure handling:
//! - microphone, device and transport failures reach the observer through `on_error`, once,
//!   followed by teardown
//! - a remote close tears down without an error
//! - failures on individual frames or chunks are logged and counted; the session goes on
//! - failures of individual teardown steps are logged; later steps still run

use std::future::pending;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::audio::backend::{AudioBackend, CaptureGraph, InputContext, Microphone, OutputContext, UnitId};
use crate::audio::codec::{create_blob, decode_chunk};
use crate::audio::meter::frame_volume;
use crate::audio::playback::PlaybackScheduler;
use crate::error::{AppError, AppResult};
use crate::live::{LiveSetup, LiveStream, LiveTransport, ServerMessage, TransportEvent};
use crate::session::instruction::build_instruction;
use crate::session::{ConnectionState, SessionObserver, SessionSettings, SessionStats, SessionStatus};
use crate::topics::{PracticeMode, TopicContext};

/// Message shown to the caller for any stream-level failure.
const CONNECTION_ERROR: &str = "Connection error";

type Handshake = JoinHandle<anyhow::Result<Box<dyn LiveStream>>>;

/// Something the active session has to react to.
pub enum SessionSignal {
    /// One captured frame from the microphone.
    Frame(Vec<f32>),
    Transport(TransportEvent),
    /// A playback unit reached its natural end.
    PlaybackEnded(UnitId),
    /// The stream handshake finished, successfully or not.
    Handshake(Result<Box<dyn LiveStream>, String>),
}

/// Device and stream handles held while a session is active.
#[derive(Default)]
struct SessionResources {
    microphone: Option<Box<dyn Microphone>>,
    input: Option<Box<dyn InputContext>>,
    output: Option<Box<dyn OutputContext>>,
    capture: Option<Box<dyn CaptureGraph>>,
    stream: Option<Box<dyn LiveStream>>,
}

/// Receiving ends of one session's event sources.
///
/// Created on connect and dropped on teardown, so nothing from an old session reaches a new one.
struct SessionChannels {
    frames_tx: mpsc::UnboundedSender<Vec<f32>>,
    frames: mpsc::UnboundedReceiver<Vec<f32>>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    ended: mpsc::UnboundedReceiver<UnitId>,
    handshake: Option<Handshake>,
}

impl Drop for SessionChannels {
    fn drop(&mut self) {
        if let Some(handshake) = self.handshake.take() {
            handshake.abort();
        }
    }
}

struct SessionInfo {
    id: Uuid,
    mode: PracticeMode,
    topic: Option<TopicContext>,
}

pub struct SessionManager {
    backend: Box<dyn AudioBackend>,
    transport: Arc<dyn LiveTransport>,
    observer: Arc<dyn SessionObserver>,
    settings: SessionSettings,
    state: ConnectionState,
    /// Set by `connect`, cleared first thing in teardown
    active: bool,
    session: Option<SessionInfo>,
    resources: SessionResources,
    channels: Option<SessionChannels>,
    playback: PlaybackScheduler,
    stats: SessionStats,
}

impl SessionManager {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        transport: Arc<dyn LiveTransport>,
        observer: Arc<dyn SessionObserver>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            backend,
            transport,
            observer,
            settings,
            state: ConnectionState::Idle,
            active: false,
            session: None,
            resources: SessionResources::default(),
            channels: None,
            playback: PlaybackScheduler::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Context time at which the next inbound chunk will start.
    pub fn playback_cursor(&self) -> f64 {
        self.playback.cursor()
    }

    pub fn snapshot(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            session_id: self.session_id(),
            mode: self.session.as_ref().map(|s| s.mode),
            topic: self.session.as_ref().and_then(|s| s.topic.clone()),
            started_at: None,
            active_units: self.playback.active_units(),
            stats: self.stats,
        }
    }

    /// Id of the active session, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Start a session and return its id, or `None` when one is already active.
    ///
    /// Failures are reported through the observer, never returned. The handshake is not
    /// awaited; readiness arrives later as `TransportEvent::Open`.
    pub async fn connect(&mut self, mode: PracticeMode, topic: Option<TopicContext>) -> Option<Uuid> {
        if self.active {
            debug!(state = self.state.as_str(), "connect ignored: session already active");
            return None;
        }

        let id = Uuid::new_v4();
        self.active = true;
        self.state = ConnectionState::Connecting;
        self.stats = SessionStats::default();
        self.playback = PlaybackScheduler::new();
        self.session = Some(SessionInfo {
            id,
            mode,
            topic: topic.clone(),
        });
        info!(
            session_id = %id,
            mode = mode.as_str(),
            topic = topic.as_ref().map(|t| t.title.as_str()).unwrap_or("-"),
            "Starting live session"
        );

        if let Err(e) = self.acquire(mode, topic.as_ref()).await {
            self.fail(e).await;
        }
        Some(id)
    }

    async fn acquire(&mut self, mode: PracticeMode, topic: Option<&TopicContext>) -> AppResult<()> {
        let microphone = self
            .backend
            .request_microphone()
            .await
            .map_err(|e| AppError::Permission(e.to_string()))?;
        self.resources.microphone = Some(microphone);

        let input = self
            .backend
            .open_input(self.settings.input_sample_rate)
            .await
            .map_err(|e| AppError::Device(format!("cannot open input context: {}", e)))?;
        self.resources.input = Some(input);

        let (ended_tx, ended) = mpsc::unbounded_channel();
        let output = self
            .backend
            .open_output(self.settings.output_sample_rate, self.settings.output_channels, ended_tx)
            .await
            .map_err(|e| AppError::Device(format!("cannot open output context: {}", e)))?;
        self.resources.output = Some(output);

        let setup = LiveSetup::audio(
            self.settings.model.clone(),
            self.settings.voice.clone(),
            build_instruction(mode, topic),
        );
        let (events_tx, events) = mpsc::unbounded_channel();
        let transport = Arc::clone(&self.transport);
        let handshake = tokio::spawn(async move { transport.connect(setup, events_tx).await });

        let (frames_tx, frames) = mpsc::unbounded_channel();
        self.channels = Some(SessionChannels {
            frames_tx,
            frames,
            events,
            ended,
            handshake: Some(handshake),
        });
        Ok(())
    }

    /// Wait for the next signal of the active session. Never resolves while idle.
    ///
    /// Cancel-safe, so it can sit in a `select!` next to the command channel.
    pub async fn next_signal(&mut self) -> SessionSignal {
        let Some(channels) = self.channels.as_mut() else {
            return pending().await;
        };
        let SessionChannels {
            frames,
            events,
            ended,
            handshake,
            ..
        } = channels;
        let handshake_pending = handshake.is_some();

        tokio::select! {
            biased;

            joined = async {
                match handshake.as_mut() {
                    Some(handshake) => handshake.await,
                    None => pending().await,
                }
            }, if handshake_pending => {
                let result = match joined {
                    Ok(Ok(stream)) => Ok(stream),
                    Ok(Err(e)) => Err(format!("{:#}", e)),
                    Err(e) => Err(format!("handshake task failed: {}", e)),
                };
                SessionSignal::Handshake(result)
            }
            Some(event) = events.recv() => SessionSignal::Transport(event),
            Some(unit) = ended.recv() => SessionSignal::PlaybackEnded(unit),
            Some(frame) = frames.recv() => SessionSignal::Frame(frame),
            else => pending().await,
        }
    }

    pub async fn handle_signal(&mut self, signal: SessionSignal) {
        match signal {
            SessionSignal::Handshake(result) => {
                if let Some(channels) = self.channels.as_mut() {
                    channels.handshake = None;
                }
                self.on_handshake(result).await;
            }
            SessionSignal::Transport(TransportEvent::Open) => self.on_open().await,
            SessionSignal::Transport(TransportEvent::Message(message)) => self.on_message(message).await,
            SessionSignal::Transport(TransportEvent::Error(message)) => {
                warn!(error = %message, "Live stream error");
                self.fail(AppError::Transport(CONNECTION_ERROR.to_string())).await;
            }
            SessionSignal::Transport(TransportEvent::Close(reason)) => {
                info!(reason = reason.as_deref().unwrap_or("-"), "Live stream closed remotely");
                self.disconnect().await;
            }
            SessionSignal::PlaybackEnded(unit) => {
                if self.playback.finished(unit) {
                    trace!(unit, "playback unit ended");
                }
            }
            SessionSignal::Frame(frame) => self.on_frame(frame),
        }
    }

    async fn on_handshake(&mut self, result: Result<Box<dyn LiveStream>, String>) {
        match result {
            // Teardown aborts a pending handshake, so a resolved one always has a live session
            Ok(stream) => {
                debug!("Live stream handshake resolved");
                self.resources.stream = Some(stream);
            }
            Err(message) => {
                warn!(error = %message, "Live stream handshake failed");
                self.fail(AppError::Transport(CONNECTION_ERROR.to_string())).await;
            }
        }
    }

    async fn on_open(&mut self) {
        if !self.active || self.state != ConnectionState::Connecting {
            return;
        }
        self.state = ConnectionState::Connected;
        info!("Live stream open");
        self.observer.on_connect();

        if let Err(e) = self.start_capture() {
            self.fail(e).await;
        }
    }

    fn start_capture(&mut self) -> AppResult<()> {
        let channels = self
            .channels
            .as_ref()
            .ok_or_else(|| AppError::Device("session channels missing".to_string()))?;
        let microphone = self
            .resources
            .microphone
            .as_ref()
            .ok_or_else(|| AppError::Device("microphone already released".to_string()))?;
        let input = self
            .resources
            .input
            .as_mut()
            .ok_or_else(|| AppError::Device("input context already closed".to_string()))?;

        let graph = input
            .start_capture(microphone.tap(), self.settings.frame_size, channels.frames_tx.clone())
            .map_err(|e| AppError::Device(format!("cannot start capture: {}", e)))?;
        self.resources.capture = Some(graph);
        debug!(frame_size = self.settings.frame_size, "Audio capture started");
        Ok(())
    }

    fn on_frame(&mut self, frame: Vec<f32>) {
        if !self.active {
            return;
        }
        self.stats.frames_captured += 1;

        let volume = frame_volume(&frame, self.settings.volume_gain);
        self.observer.on_volume_change(volume, 0.0);

        let Some(stream) = self.resources.stream.as_mut() else {
            // Handshake still in flight
            self.stats.frames_dropped += 1;
            trace!("frame dropped: stream not ready");
            return;
        };

        match stream.send_realtime_input(create_blob(&frame, self.settings.input_sample_rate)) {
            Ok(()) => self.stats.frames_sent += 1,
            Err(e) => {
                self.stats.frames_failed += 1;
                warn!(error = %e, "Failed to send audio frame");
            }
        }
    }

    async fn on_message(&mut self, message: ServerMessage) {
        if !self.active {
            return;
        }

        if let Some(data) = message.audio_data() {
            match self.play_chunk(data).await {
                Ok(()) => self.stats.chunks_scheduled += 1,
                Err(e) => {
                    self.stats.chunks_failed += 1;
                    warn!(error = %e, "Dropping inbound audio chunk");
                }
            }
        }

        if message.interrupted() {
            self.stats.interruptions += 1;
            let stopped = self.stop_playback();
            debug!(stopped, "Model interrupted; playback flushed");
        }
    }

    async fn play_chunk(&mut self, data: &str) -> AppResult<()> {
        let output = self
            .resources
            .output
            .as_mut()
            .ok_or_else(|| AppError::Processing("output context already closed".to_string()))?;

        if output.is_suspended() {
            output
                .resume()
                .await
                .map_err(|e| AppError::Device(format!("cannot resume output context: {}", e)))?;
        }

        let buffer = decode_chunk(data, self.settings.output_sample_rate, self.settings.output_channels)?;
        let unit = self.playback.schedule(&mut **output, buffer)?;
        trace!(unit = unit.id, start = unit.start, duration = unit.duration, "chunk scheduled");
        Ok(())
    }

    fn stop_playback(&mut self) -> usize {
        match self.resources.output.as_deref_mut() {
            Some(output) => self.playback.stop_all(Some(output)),
            None => self.playback.stop_all(None),
        }
    }

    /// Report a caller-visible failure once, then tear down.
    pub async fn fail(&mut self, error: AppError) {
        if !self.active {
            debug!(error = %error, "failure after teardown ignored");
            return;
        }
        if !error.is_caller_visible() {
            warn!(kind = error.kind(), error = %error, "Session error contained");
            return;
        }

        error!(kind = error.kind(), error = %error, "Live session failed");
        self.state = ConnectionState::Error;
        self.observer.on_error(&error.to_string());
        self.disconnect().await;
    }

    /// Tear the session down. Safe to call any number of times; only the first call of a
    /// session does anything.
    pub async fn disconnect(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let session_id = self.session_id();

        // 1. playback
        let stopped = self.stop_playback();

        // 2. stream, or the handshake still producing it
        let handshake = self.channels.as_mut().and_then(|c| c.handshake.take());
        if let Some(mut stream) = self.resources.stream.take() {
            if let Err(e) = stream.close().await {
                warn!(error = %e, "Closing live stream failed");
            }
        } else if let Some(handshake) = handshake {
            handshake.abort();
            debug!("Pending handshake aborted");
        }

        // 3. capture graph
        if let Some(mut capture) = self.resources.capture.take() {
            if let Err(e) = capture.disconnect() {
                warn!(error = %e, "Disconnecting capture graph failed");
            }
        }

        // 4. microphone
        if let Some(mut microphone) = self.resources.microphone.take() {
            microphone.stop_tracks();
        }

        // 5. contexts
        if let Some(mut input) = self.resources.input.take() {
            if let Err(e) = input.close().await {
                warn!(error = %e, "Closing input context failed");
            }
        }
        if let Some(mut output) = self.resources.output.take() {
            if let Err(e) = output.close().await {
                warn!(error = %e, "Closing output context failed");
            }
        }

        // 6. everything else
        self.channels = None;
        self.resources = SessionResources::default();
        self.session = None;
        self.state = ConnectionState::Idle;

        info!(
            session_id = ?session_id,
            stopped_units = stopped,
            frames_sent = self.stats.frames_sent,
            frames_dropped = self.stats.frames_dropped,
            frames_failed = self.stats.frames_failed,
            chunks_scheduled = self.stats.chunks_scheduled,
            chunks_failed = self.stats.chunks_failed,
            interruptions = self.stats.interruptions,
            "Live session ended"
        );

        // 7.
        self.observer.on_disconnect();
    }
}
