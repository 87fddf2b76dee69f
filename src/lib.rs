//! # SpeakEasy Live
//!
//! Real-time spoken-English practice backed by a bidirectional voice model stream.
//!
//! ## Layout:
//! - **audio**: PCM codec, volume meter, capture taps, playback scheduling and device seams
//! - **live**: the realtime stream protocol and its WebSocket transport
//! - **session**: the session lifecycle (connect, stream, interrupt, teardown)
//! - **topics**: practice modes and the topic catalog
//! - **device**: cpal microphone and speaker (feature `device`)
//! - **handlers / websocket / health**: the HTTP and WebSocket surface
//! - **config / error / state**: ambient plumbing shared by everything above

pub mod audio;
pub mod config;
#[cfg(feature = "device")]
pub mod device;
pub mod error;
pub mod handlers;
pub mod health;
pub mod live;
pub mod session;
pub mod state;
pub mod topics;
pub mod websocket;
