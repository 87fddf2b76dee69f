//! Input loudness metering for the visualizer.

/// Gain applied to frame RMS before clamping.
pub const DEFAULT_VOLUME_GAIN: f32 = 5.0;

/// Root-mean-square energy of a frame. Empty frames are silent.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }

    let sum: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / frame.len() as f64).sqrt() as f32
}

/// Map an RMS value to a volume sample in [0, 1].
pub fn volume_from_rms(rms: f32, gain: f32) -> f32 {
    let level = rms * gain;
    if level.is_nan() {
        return 0.0;
    }
    level.clamp(0.0, 1.0)
}

/// Volume sample for one captured frame.
pub fn frame_volume(frame: &[f32], gain: f32) -> f32 {
    volume_from_rms(rms(frame), gain)
}
