//! # Audio Processing Module
//!
//! Everything the live session needs to move sound in and out of the process.
//!
//! ## Key Components:
//! - **Codec**: PCM16 little-endian encode/decode and base64 media blobs
//! - **Meter**: RMS loudness for the volume visualizer
//! - **Tap**: fixed-size frame assembly from device callbacks
//! - **Playback**: gapless scheduling cursor with interruption support
//! - **Mixer**: sample-clock rendering of scheduled units for real devices
//! - **Backend**: the traits a device implementation provides
//!
//! ## Audio Format Requirements:
//! - **Input**: 16kHz, 16-bit PCM, mono
//! - **Output**: 24kHz, 16-bit PCM, mono
//! - **Encoding**: Little-endian signed integers, base64 on the wire

pub mod backend;    // Device seams
pub mod codec;      // PCM16 wire encoding
pub mod meter;      // Input loudness
pub mod mixer;      // Output rendering
pub mod playback;   // Playback scheduling
pub mod tap;        // Capture framing
