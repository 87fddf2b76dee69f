//! # Live Voice Session
//!
//! One realtime conversation between the microphone, the remote voice model and the speakers.
//!
//! ## Session Lifecycle:
//! 1. **Idle**: nothing is held; `connect` is accepted
//! 2. **Connecting**: devices acquired, stream handshake in flight
//! 3. **Connected**: the stream is open; frames flow out, audio flows in
//! 4. **Error**: a caller-visible failure was reported; teardown follows immediately
//!
//! Every way out of a session (caller, remote close, error) goes through one idempotent
//! teardown, which always ends in **Idle**.
//!
//! ## Layout:
//! - `instruction`: the tutor persona sent with every session
//! - `manager`: the state machine and its resources
//! - `handle`: the task that drives a manager and the cloneable handle the service uses

pub mod handle;
pub mod instruction;
pub mod manager;

#[cfg(test)]
pub(crate) mod testing;

use serde::Serialize;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::topics::{PracticeMode, TopicContext};

pub use handle::SessionHandle;
pub use manager::SessionManager;

/// Default model for new sessions.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Default prebuilt voice.
pub const DEFAULT_VOICE: &str = "Zephyr";

/// Audio and stream parameters of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSettings {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub output_channels: u16,
    /// Samples per outbound frame
    pub frame_size: usize,
    pub volume_gain: f32,
    pub model: String,
    pub voice: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            output_channels: 1,
            frame_size: 4096,
            volume_gain: crate::audio::meter::DEFAULT_VOLUME_GAIN,
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

/// Callbacks from the session to whoever started it.
///
/// Called from the session task; implementations must not block.
pub trait SessionObserver: Send + Sync {
    fn on_connect(&self);

    fn on_disconnect(&self);

    fn on_error(&self, message: &str);

    /// `input` is in [0, 1]; `output` is always 0.
    fn on_volume_change(&self, input: f32, output: f32);
}

/// Observer callbacks as data, for the WebSocket and for tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Error { message: String },
    Volume { input: f32, output: f32 },
}

/// Per-session counters, logged at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct SessionStats {
    pub frames_captured: u64,
    pub frames_sent: u64,
    /// Captured before the stream was ready
    pub frames_dropped: u64,
    pub frames_failed: u64,
    pub chunks_scheduled: u64,
    pub chunks_failed: u64,
    pub interruptions: u64,
}

/// Point-in-time view of the session for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub session_id: Option<Uuid>,
    pub mode: Option<PracticeMode>,
    pub topic: Option<TopicContext>,
    /// Filled in by the status publisher when it first sees the session
    pub started_at: Option<DateTime<Utc>>,
    pub active_units: usize,
    pub stats: SessionStats,
}
