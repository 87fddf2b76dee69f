//! # Sample-Clock Mixer
//!
//! Realises scheduled playback units on a device that only asks "fill this buffer". The mixer
//! counts rendered frames; that count divided by the sample rate is the output context clock.
//! A unit whose start time lies inside the buffer being rendered begins at the exact frame.

use crate::audio::backend::UnitId;
use crate::audio::codec::AudioBuffer;

struct Voice {
    id: UnitId,
    start_frame: u64,
    samples: Vec<f32>,
    position: usize,
}

/// Mono mixer driven by the device callback.
pub struct Mixer {
    sample_rate: u32,
    rendered_frames: u64,
    voices: Vec<Voice>,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            rendered_frames: 0,
            voices: Vec::new(),
        }
    }

    /// Seconds of audio rendered so far.
    pub fn current_time(&self) -> f64 {
        self.rendered_frames as f64 / self.sample_rate as f64
    }

    pub fn voices(&self) -> usize {
        self.voices.len()
    }

    /// Queue `buffer` to start at absolute time `at`. Multi-channel input is downmixed.
    pub fn add(&mut self, id: UnitId, buffer: AudioBuffer, at: f64) {
        let channels = buffer.channels.max(1) as usize;
        let samples = if channels == 1 {
            buffer.samples
        } else {
            buffer
                .samples
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        let start_frame = (at.max(0.0) * self.sample_rate as f64).round() as u64;
        self.voices.push(Voice {
            id,
            start_frame,
            samples,
            position: 0,
        });
    }

    /// Drop a unit immediately. Returns whether it was still queued.
    pub fn remove(&mut self, id: UnitId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|voice| voice.id != id);
        self.voices.len() != before
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Fill `output` (mono) and return the units that played to their end.
    pub fn render(&mut self, output: &mut [f32]) -> Vec<UnitId> {
        let first_frame = self.rendered_frames;
        output.iter_mut().for_each(|sample| *sample = 0.0);

        for voice in &mut self.voices {
            for (offset, slot) in output.iter_mut().enumerate() {
                let frame = first_frame + offset as u64;
                if frame < voice.start_frame {
                    continue;
                }
                match voice.samples.get(voice.position) {
                    Some(&sample) => {
                        *slot += sample;
                        voice.position += 1;
                    }
                    None => break,
                }
            }
        }

        for sample in output.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        self.rendered_frames += output.len() as u64;

        let mut ended = Vec::new();
        self.voices.retain(|voice| {
            let done = voice.position >= voice.samples.len();
            if done {
                ended.push(voice.id);
            }
            !done
        });
        ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_starts_at_its_frame() {
        let mut mixer = Mixer::new(10);
        mixer.add(7, AudioBuffer::new(vec![0.5, 0.5], 10, 1), 0.3);

        let mut out = [1.0f32; 5];
        let ended = mixer.render(&mut out);
        assert_eq!(out, [0.0, 0.0, 0.0, 0.5, 0.5]);
        assert_eq!(ended, vec![7]);
        assert!((mixer.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_unit_spanning_buffers_ends_once() {
        let mut mixer = Mixer::new(4);
        mixer.add(1, AudioBuffer::new(vec![0.25; 6], 4, 1), 0.0);

        let mut out = [0.0f32; 4];
        assert!(mixer.render(&mut out).is_empty());
        assert_eq!(out, [0.25; 4]);
        assert_eq!(mixer.render(&mut out), vec![1]);
        assert_eq!(out, [0.25, 0.25, 0.0, 0.0]);
        assert!(mixer.render(&mut out).is_empty());
    }

    #[test]
    fn test_removed_unit_is_silent_and_not_reported() {
        let mut mixer = Mixer::new(4);
        mixer.add(3, AudioBuffer::new(vec![0.9; 8], 4, 1), 0.0);
        assert!(mixer.remove(3));
        assert!(!mixer.remove(3));

        let mut out = [0.0f32; 8];
        assert!(mixer.render(&mut out).is_empty());
        assert_eq!(out, [0.0; 8]);
    }

    #[test]
    fn test_stereo_input_is_downmixed() {
        let mut mixer = Mixer::new(4);
        mixer.add(2, AudioBuffer::new(vec![1.0, 0.0, 0.5, 0.5], 4, 2), 0.0);

        let mut out = [0.0f32; 2];
        mixer.render(&mut out);
        assert_eq!(out, [0.5, 0.5]);
    }
}
