//! # Audio Devices
//!
//! `AudioBackend` on top of cpal (default host, default devices).
//!
//! ## How the seams map onto cpal:
//! - **Microphone**: an input stream at 16kHz whose callback pushes into a `SampleTap`
//! - **Input context**: connects that tap to the session's frame channel
//! - **Output context**: an output stream whose callback renders a shared `Mixer`; the mixer's
//!   sample count is the context clock
//!
//! Devices must support the requested rates natively; nothing is resampled.

mod stream;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::audio::backend::{AudioBackend, CaptureGraph, InputContext, Microphone, OutputContext, UnitId};
use crate::audio::codec::AudioBuffer;
use crate::audio::mixer::Mixer;
use crate::audio::tap::{SampleTap, TapConnection};
use stream::StreamThread;

/// cpal-backed devices.
#[derive(Debug, Clone)]
pub struct CpalBackend {
    microphone_rate: u32,
}

impl CpalBackend {
    /// `microphone_rate` is the rate the microphone is opened at; it must match the input
    /// context rate of the session.
    pub fn new(microphone_rate: u32) -> Self {
        Self { microphone_rate }
    }
}

#[async_trait]
impl AudioBackend for CpalBackend {
    async fn open_input(&mut self, sample_rate: u32) -> Result<Box<dyn InputContext>> {
        Ok(Box::new(CpalInput { sample_rate }))
    }

    async fn open_output(
        &mut self,
        sample_rate: u32,
        channels: u16,
        ended: mpsc::UnboundedSender<UnitId>,
    ) -> Result<Box<dyn OutputContext>> {
        if channels != 1 {
            bail!("only mono playback is supported, got {} channels", channels);
        }

        let mixer = Arc::new(Mutex::new(Mixer::new(sample_rate)));
        let render = Arc::clone(&mixer);
        let thread = tokio::task::spawn_blocking(move || {
            StreamThread::spawn("speakeasy-speaker", move || stream::build_speaker(sample_rate, render, ended))
        })
        .await
        .context("speaker thread panicked")??;

        Ok(Box::new(CpalOutput {
            mixer,
            thread: Some(thread),
        }))
    }

    async fn request_microphone(&mut self) -> Result<Box<dyn Microphone>> {
        let tap = SampleTap::new(self.microphone_rate);
        let device_tap = tap.clone();
        let thread = tokio::task::spawn_blocking(move || {
            StreamThread::spawn("speakeasy-microphone", move || stream::build_microphone(device_tap))
        })
        .await
        .context("microphone thread panicked")??;

        Ok(Box::new(CpalMicrophone {
            tap,
            thread: Some(thread),
        }))
    }
}

struct CpalMicrophone {
    tap: SampleTap,
    thread: Option<StreamThread>,
}

impl Microphone for CpalMicrophone {
    fn tap(&self) -> SampleTap {
        self.tap.clone()
    }

    fn stop_tracks(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
            info!("Microphone released");
        }
    }
}

struct CpalInput {
    sample_rate: u32,
}

#[async_trait]
impl InputContext for CpalInput {
    fn start_capture(
        &mut self,
        tap: SampleTap,
        frame_size: usize,
        frames: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Box<dyn CaptureGraph>> {
        if tap.sample_rate() != self.sample_rate {
            bail!(
                "microphone runs at {} Hz but the input context expects {} Hz",
                tap.sample_rate(),
                self.sample_rate
            );
        }
        Ok(Box::new(CpalCapture {
            connection: TapConnection::connect(tap, frame_size, frames),
        }))
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct CpalCapture {
    connection: TapConnection,
}

impl CaptureGraph for CpalCapture {
    fn disconnect(&mut self) -> Result<()> {
        self.connection.disconnect();
        Ok(())
    }
}

struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    thread: Option<StreamThread>,
}

impl CpalOutput {
    fn mixer(&self) -> std::sync::MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl OutputContext for CpalOutput {
    fn current_time(&self) -> f64 {
        self.mixer().current_time()
    }

    fn is_suspended(&self) -> bool {
        false
    }

    async fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn start(&mut self, unit: UnitId, buffer: AudioBuffer, at: f64) -> Result<()> {
        if self.thread.is_none() {
            bail!("output context is closed");
        }
        self.mixer().add(unit, buffer, at);
        Ok(())
    }

    fn stop(&mut self, unit: UnitId) -> Result<()> {
        self.mixer().remove(unit);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
        }
        let dropped = {
            let mut mixer = self.mixer();
            let voices = mixer.voices();
            mixer.clear();
            voices
        };
        debug!(dropped, "Speaker closed");
        Ok(())
    }
}
