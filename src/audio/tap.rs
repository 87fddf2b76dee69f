//! # Capture Frame Tap
//!
//! Device callbacks deliver however many samples the driver feels like. The session wants
//! constant-size frames in capture order, so the microphone pushes into a `SampleTap` which
//! cuts fixed-size frames and forwards them to whoever is connected.
//!
//! Nothing is forwarded while no capture graph is connected; samples pushed then are discarded.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Accumulates samples into fixed-size frames.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples waiting for the current frame to fill up.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append samples and return every frame they complete, in order.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        for &sample in samples {
            self.pending.push(sample);
            if self.pending.len() == self.frame_size {
                let frame = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                frames.push(frame);
            }
        }
        frames
    }
}

struct Connection {
    assembler: FrameAssembler,
    sink: mpsc::UnboundedSender<Vec<f32>>,
}

/// Shared, cloneable tap between a microphone and the capture graph.
#[derive(Clone)]
pub struct SampleTap {
    sample_rate: u32,
    connection: Arc<Mutex<Option<Connection>>>,
}

impl SampleTap {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            connection: Arc::new(Mutex::new(None)),
        }
    }

    /// Rate of the samples pushed into this tap.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Start forwarding frames of `frame_size` samples to `sink`.
    pub fn attach(&self, frame_size: usize, sink: mpsc::UnboundedSender<Vec<f32>>) {
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        *connection = Some(Connection {
            assembler: FrameAssembler::new(frame_size),
            sink,
        });
    }

    /// Stop forwarding. Partially filled frames are discarded.
    pub fn detach(&self) {
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        *connection = None;
    }

    pub fn is_attached(&self) -> bool {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Called from the device callback with freshly captured samples.
    ///
    /// Returns the number of complete frames forwarded.
    pub fn push(&self, samples: &[f32]) -> usize {
        let mut guard = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(connection) = guard.as_mut() else {
            return 0;
        };

        let mut forwarded = 0;
        let mut receiver_gone = false;
        for frame in connection.assembler.push(samples) {
            if connection.sink.send(frame).is_err() {
                receiver_gone = true;
                break;
            }
            forwarded += 1;
        }

        // The session was torn down before the graph was disconnected
        if receiver_gone {
            *guard = None;
        }
        forwarded
    }
}

/// Capture graph that forwards a tap into a frame channel until disconnected.
pub struct TapConnection {
    tap: SampleTap,
}

impl TapConnection {
    /// Attach `tap` to `sink` and return the connection owning that link.
    pub fn connect(tap: SampleTap, frame_size: usize, sink: mpsc::UnboundedSender<Vec<f32>>) -> Self {
        tap.attach(frame_size, sink);
        Self { tap }
    }

    pub fn disconnect(&mut self) {
        self.tap.detach();
    }
}

impl Drop for TapConnection {
    fn drop(&mut self) {
        self.tap.detach();
    }
}
