//! # Audio Device Seams
//!
//! The session manager never talks to a sound card directly. It asks an `AudioBackend` for:
//! - an **input context** at the capture rate, which can wire a microphone into a frame channel
//! - an **output context** at the playback rate, which plays buffers at absolute times on its
//!   own clock and reports units that finished naturally
//! - a **microphone**, whose tracks are stopped on teardown
//!
//! Errors are plain `anyhow` errors; the session classifies them.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::codec::AudioBuffer;
use crate::audio::tap::SampleTap;

/// Identifier of one scheduled playback unit.
pub type UnitId = u64;

/// Factory for the device handles of one session.
#[async_trait]
pub trait AudioBackend: Send {
    /// Open the capture-side processing context.
    async fn open_input(&mut self, sample_rate: u32) -> Result<Box<dyn InputContext>>;

    /// Open the playback-side processing context.
    ///
    /// Units that finish on their own are reported on `ended`.
    async fn open_output(
        &mut self,
        sample_rate: u32,
        channels: u16,
        ended: mpsc::UnboundedSender<UnitId>,
    ) -> Result<Box<dyn OutputContext>>;

    /// Ask for microphone access. Denial is an error.
    async fn request_microphone(&mut self) -> Result<Box<dyn Microphone>>;
}

/// Capture-side processing context.
#[async_trait]
pub trait InputContext: Send {
    /// Connect the microphone's tap to `frames`, cutting frames of `frame_size` samples.
    fn start_capture(
        &mut self,
        tap: SampleTap,
        frame_size: usize,
        frames: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Box<dyn CaptureGraph>>;

    async fn close(&mut self) -> Result<()>;
}

/// The live link between microphone and frame channel.
pub trait CaptureGraph: Send {
    fn disconnect(&mut self) -> Result<()>;
}

/// A granted microphone stream.
pub trait Microphone: Send {
    /// Where captured samples show up.
    fn tap(&self) -> SampleTap;

    /// Stop every device track. Must be safe to call more than once.
    fn stop_tracks(&mut self);
}

/// Playback-side processing context with its own clock.
#[async_trait]
pub trait OutputContext: Send {
    /// Seconds on the context clock.
    fn current_time(&self) -> f64;

    /// Whether the platform suspended the context (e.g. no user gesture yet).
    fn is_suspended(&self) -> bool;

    async fn resume(&mut self) -> Result<()>;

    /// Start `buffer` at absolute context time `at`.
    fn start(&mut self, unit: UnitId, buffer: AudioBuffer, at: f64) -> Result<()>;

    /// Stop a started unit early. Stopping an already finished unit is not an error.
    fn stop(&mut self, unit: UnitId) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}
