//! In-memory devices, transport and observer for session tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use crate::audio::backend::{AudioBackend, CaptureGraph, InputContext, Microphone, OutputContext, UnitId};
use crate::audio::codec::{AudioBuffer, MediaBlob};
use crate::audio::tap::{SampleTap, TapConnection};
use crate::live::{LiveSetup, LiveStream, LiveTransport, TransportEvent};
use crate::session::{SessionEvent, SessionManager, SessionObserver, SessionSettings};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// Everything the fake devices were asked to do.
#[derive(Default)]
pub struct DeviceLog {
    pub deny_microphone: bool,
    pub fail_capture: bool,
    pub microphone_requests: usize,
    pub tracks_stopped: usize,
    pub inputs_opened: usize,
    pub inputs_closed: usize,
    pub outputs_opened: usize,
    pub outputs_closed: usize,
    pub captures_started: usize,
    pub captures_disconnected: usize,
    pub now: f64,
    pub suspended: bool,
    pub resumes: usize,
    pub started: Vec<(UnitId, f64)>,
    pub stopped: Vec<UnitId>,
    pub tap: Option<SampleTap>,
    pub ended: Option<mpsc::UnboundedSender<UnitId>>,
}

pub struct FakeBackend {
    log: Arc<Mutex<DeviceLog>>,
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn open_input(&mut self, _sample_rate: u32) -> Result<Box<dyn InputContext>> {
        lock(&self.log).inputs_opened += 1;
        Ok(Box::new(FakeInput {
            log: Arc::clone(&self.log),
        }))
    }

    async fn open_output(
        &mut self,
        _sample_rate: u32,
        _channels: u16,
        ended: mpsc::UnboundedSender<UnitId>,
    ) -> Result<Box<dyn OutputContext>> {
        let mut log = lock(&self.log);
        log.outputs_opened += 1;
        log.ended = Some(ended);
        Ok(Box::new(FakeOutput {
            log: Arc::clone(&self.log),
        }))
    }

    async fn request_microphone(&mut self) -> Result<Box<dyn Microphone>> {
        let mut log = lock(&self.log);
        log.microphone_requests += 1;
        if log.deny_microphone {
            bail!("Permission denied");
        }
        let tap = SampleTap::new(16000);
        log.tap = Some(tap.clone());
        Ok(Box::new(FakeMicrophone {
            tap,
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeMicrophone {
    tap: SampleTap,
    log: Arc<Mutex<DeviceLog>>,
}

impl Microphone for FakeMicrophone {
    fn tap(&self) -> SampleTap {
        self.tap.clone()
    }

    fn stop_tracks(&mut self) {
        lock(&self.log).tracks_stopped += 1;
    }
}

struct FakeInput {
    log: Arc<Mutex<DeviceLog>>,
}

#[async_trait]
impl InputContext for FakeInput {
    fn start_capture(
        &mut self,
        tap: SampleTap,
        frame_size: usize,
        frames: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Box<dyn CaptureGraph>> {
        let mut log = lock(&self.log);
        if log.fail_capture {
            bail!("input node unavailable");
        }
        log.captures_started += 1;
        Ok(Box::new(FakeCapture {
            connection: TapConnection::connect(tap, frame_size, frames),
            log: Arc::clone(&self.log),
        }))
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.log).inputs_closed += 1;
        Ok(())
    }
}

struct FakeCapture {
    connection: TapConnection,
    log: Arc<Mutex<DeviceLog>>,
}

impl CaptureGraph for FakeCapture {
    fn disconnect(&mut self) -> Result<()> {
        self.connection.disconnect();
        lock(&self.log).captures_disconnected += 1;
        Ok(())
    }
}

struct FakeOutput {
    log: Arc<Mutex<DeviceLog>>,
}

#[async_trait]
impl OutputContext for FakeOutput {
    fn current_time(&self) -> f64 {
        lock(&self.log).now
    }

    fn is_suspended(&self) -> bool {
        lock(&self.log).suspended
    }

    async fn resume(&mut self) -> Result<()> {
        let mut log = lock(&self.log);
        log.suspended = false;
        log.resumes += 1;
        Ok(())
    }

    fn start(&mut self, unit: UnitId, _buffer: AudioBuffer, at: f64) -> Result<()> {
        lock(&self.log).started.push((unit, at));
        Ok(())
    }

    fn stop(&mut self, unit: UnitId) -> Result<()> {
        lock(&self.log).stopped.push(unit);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.log).outputs_closed += 1;
        Ok(())
    }
}

/// What the fake transport saw.
#[derive(Default)]
pub struct TransportLog {
    pub connects: usize,
    pub setups: Vec<LiveSetup>,
    pub sent: Vec<MediaBlob>,
    pub closes: usize,
    pub refuse: Option<String>,
    pub events: Option<mpsc::UnboundedSender<TransportEvent>>,
}

/// Transport whose handshake can be held open until the test releases it.
pub struct FakeTransport {
    log: Arc<Mutex<TransportLog>>,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl LiveTransport for FakeTransport {
    async fn connect(
        &self,
        setup: LiveSetup,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn LiveStream>> {
        {
            let mut log = lock(&self.log);
            log.connects += 1;
            log.setups.push(setup);
            log.events = Some(events);
        }

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if let Some(reason) = lock(&self.log).refuse.clone() {
            bail!(reason);
        }
        Ok(Box::new(FakeStream {
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeStream {
    log: Arc<Mutex<TransportLog>>,
}

#[async_trait]
impl LiveStream for FakeStream {
    fn send_realtime_input(&mut self, blob: MediaBlob) -> Result<()> {
        lock(&self.log).sent.push(blob);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.log).closes += 1;
        Ok(())
    }
}

/// Observer that records every callback as a `SessionEvent`.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<SessionEvent> {
        lock(&self.events).clone()
    }

    pub fn count(&self, wanted: &SessionEvent) -> usize {
        lock(&self.events).iter().filter(|event| *event == wanted).count()
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn volumes(&self) -> Vec<(f32, f32)> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Volume { input, output } => Some((*input, *output)),
                _ => None,
            })
            .collect()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_connect(&self) {
        lock(&self.events).push(SessionEvent::Connected);
    }

    fn on_disconnect(&self) {
        lock(&self.events).push(SessionEvent::Disconnected);
    }

    fn on_error(&self, message: &str) {
        lock(&self.events).push(SessionEvent::Error {
            message: message.to_string(),
        });
    }

    fn on_volume_change(&self, input: f32, output: f32) {
        lock(&self.events).push(SessionEvent::Volume { input, output });
    }
}

/// Frame size used by test sessions.
pub const TEST_FRAME: usize = 4;

/// Fakes wired to a manager, plus shortcuts to poke them.
pub struct Rig {
    pub devices: Arc<Mutex<DeviceLog>>,
    pub transport: Arc<Mutex<TransportLog>>,
    pub gate: Arc<Notify>,
    pub observer: Arc<RecordingObserver>,
}

impl Rig {
    /// Build a manager whose handshake completes immediately.
    pub fn new() -> (Self, SessionManager) {
        Self::build(false)
    }

    /// Build a manager whose handshake waits for `release_handshake`.
    pub fn gated() -> (Self, SessionManager) {
        Self::build(true)
    }

    fn build(gated: bool) -> (Self, SessionManager) {
        let rig = Rig {
            devices: Arc::new(Mutex::new(DeviceLog::default())),
            transport: Arc::new(Mutex::new(TransportLog::default())),
            gate: Arc::new(Notify::new()),
            observer: Arc::new(RecordingObserver::default()),
        };
        let manager = SessionManager::new(
            rig.backend(),
            Arc::new(FakeTransport {
                log: Arc::clone(&rig.transport),
                gate: gated.then(|| Arc::clone(&rig.gate)),
            }),
            rig.observer.clone(),
            test_settings(),
        );
        (rig, manager)
    }

    pub fn backend(&self) -> Box<dyn AudioBackend> {
        Box::new(FakeBackend {
            log: Arc::clone(&self.devices),
        })
    }

    pub fn live_transport(&self) -> Arc<dyn LiveTransport> {
        Arc::new(FakeTransport {
            log: Arc::clone(&self.transport),
            gate: None,
        })
    }

    pub fn devices(&self) -> MutexGuard<'_, DeviceLog> {
        lock(&self.devices)
    }

    pub fn transport(&self) -> MutexGuard<'_, TransportLog> {
        lock(&self.transport)
    }

    pub fn release_handshake(&self) {
        self.gate.notify_one();
    }

    /// Post an event as if it came from the network.
    pub fn emit(&self, event: TransportEvent) {
        let events = self.transport().events.clone();
        if let Some(events) = events {
            let _ = events.send(event);
        }
    }

    /// Feed samples into the microphone.
    pub fn speak(&self, samples: &[f32]) -> usize {
        let tap = self.devices().tap.clone();
        tap.map(|tap| tap.push(samples)).unwrap_or(0)
    }

    /// Report a playback unit as finished.
    pub fn end_unit(&self, unit: UnitId) {
        let ended = self.devices().ended.clone();
        if let Some(ended) = ended {
            let _ = ended.send(unit);
        }
    }
}

pub fn test_settings() -> SessionSettings {
    SessionSettings {
        frame_size: TEST_FRAME,
        ..SessionSettings::default()
    }
}

/// Handle signals until the session has been quiet for a moment.
pub async fn pump(manager: &mut SessionManager) {
    loop {
        let signal = match tokio::time::timeout(Duration::from_millis(20), manager.next_signal()).await {
            Ok(signal) => signal,
            Err(_) => break,
        };
        manager.handle_signal(signal).await;
    }
}
