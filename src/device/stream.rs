//! cpal stream plumbing.
//!
//! `cpal::Stream` is not `Send`, so every stream is built, played and dropped on a dedicated
//! thread. The thread parks on a stop channel; `StreamThread` sends the stop signal when it is
//! stopped or dropped.

use anyhow::{anyhow, bail, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig, SupportedStreamConfigRange};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::audio::backend::UnitId;
use crate::audio::mixer::Mixer;
use crate::audio::tap::SampleTap;

/// Owner of one device stream running on its own thread.
pub struct StreamThread {
    name: String,
    stop_tx: Option<Sender<()>>,
}

impl StreamThread {
    /// Spawn the thread, build the stream there and wait until it plays.
    ///
    /// Blocks until the device answers; call from `spawn_blocking`.
    pub fn spawn<F>(name: &str, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let thread_name = name.to_string();

        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build().and_then(|stream| {
                    stream.play()?;
                    Ok(stream)
                }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                info!(stream = %thread_name, "Audio stream playing");

                // Both a stop signal and a dropped sender end the stream
                let _ = stop_rx.recv();
                drop(stream);
                debug!(stream = %thread_name, "Audio stream thread exiting");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                name: name.to_string(),
                stop_tx: Some(stop_tx),
            }),
            Ok(Err(e)) => Err(anyhow!("{}", e)),
            Err(_) => Err(anyhow!("audio thread '{}' exited before starting", name)),
        }
    }

    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
            debug!(stream = %self.name, "Audio stream stop requested");
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pick a device configuration that runs natively at `sample_rate`.
///
/// f32 is preferred, then the fewest channels.
pub fn pick_config(
    configs: impl Iterator<Item = SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Result<(StreamConfig, SampleFormat)> {
    let rate = SampleRate(sample_rate);
    let mut candidates: Vec<_> = configs
        .filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
        .collect();
    candidates.sort_by_key(|c| (c.sample_format() != SampleFormat::F32, c.channels()));

    let chosen = candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("device does not support {} Hz", sample_rate))?;
    let format = chosen.sample_format();
    Ok((chosen.with_sample_rate(rate).config(), format))
}

/// Average interleaved frames down to one channel.
pub fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<T>,
{
    let channels = channels.max(1);
    data.chunks(channels)
        .map(|frame| frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Default input device, streaming into `tap` at the tap's rate.
pub fn build_microphone(tap: SampleTap) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no microphone available"))?;
    let (config, format) = pick_config(device.supported_input_configs()?, tap.sample_rate())?;
    info!(
        device = %device.name().unwrap_or_default(),
        channels = config.channels,
        format = ?format,
        "Opening microphone"
    );

    match format {
        SampleFormat::F32 => input_stream::<f32>(&device, &config, tap),
        SampleFormat::I16 => input_stream::<i16>(&device, &config, tap),
        SampleFormat::U16 => input_stream::<u16>(&device, &config, tap),
        other => bail!("unsupported microphone sample format {:?}", other),
    }
}

fn input_stream<T>(device: &Device, config: &StreamConfig, tap: SampleTap) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            tap.push(&downmix(data, channels));
        },
        |err| error!("Microphone stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

/// Default output device at `sample_rate`, rendering `mixer`.
pub fn build_speaker(
    sample_rate: u32,
    mixer: Arc<Mutex<Mixer>>,
    ended: UnboundedSender<UnitId>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no output device available"))?;
    let (config, format) = pick_config(device.supported_output_configs()?, sample_rate)?;
    info!(
        device = %device.name().unwrap_or_default(),
        channels = config.channels,
        format = ?format,
        "Opening speaker"
    );

    match format {
        SampleFormat::F32 => output_stream::<f32>(&device, &config, mixer, ended),
        SampleFormat::I16 => output_stream::<i16>(&device, &config, mixer, ended),
        SampleFormat::U16 => output_stream::<u16>(&device, &config, mixer, ended),
        other => bail!("unsupported speaker sample format {:?}", other),
    }
}

fn output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
    ended: UnboundedSender<UnitId>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = (config.channels as usize).max(1);
    let mut mono: Vec<f32> = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            mono.resize(data.len() / channels, 0.0);
            let finished = mixer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .render(&mut mono);

            for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                for slot in frame {
                    *slot = T::from_sample(sample);
                }
            }
            for unit in finished {
                let _ = ended.send(unit);
            }
        },
        |err| error!("Speaker stream error: {}", err),
        None,
    )?;
    Ok(stream)
}
