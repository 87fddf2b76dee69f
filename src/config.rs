//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Platform variables (HOST, PORT, GEMINI_API_KEY / API_KEY)
//! 2. Environment variables (APP_SERVER__PORT, APP_LIVE__VOICE, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;                   // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                         // For reading environment variables

use crate::session::SessionSettings;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, live stream, audio, topics)
/// keeps each concern readable on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub live: LiveConfig,
    pub audio: AudioConfig,
    pub topics: TopicsConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only the local front-end can reach the session
/// - `port = 8080`: Common development port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,  // u16 = unsigned 16-bit integer (0-65535), perfect for port numbers
}

/// Remote voice service settings.
///
/// ## Fields:
/// - `endpoint`: WebSocket URL of the bidirectional streaming API
/// - `model`: Model identifier sent in the setup message
/// - `voice`: Prebuilt synthesized voice used for replies
/// - `api_key`: Credential appended to the endpoint; never echoed back by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub api_key: String,
}

/// Audio pipeline settings.
///
/// The remote service mandates 16 kHz input and 24 kHz output, so each direction gets its own
/// natively-configured context instead of resampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    /// Samples per outbound frame
    pub frame_size: usize,
    /// Multiplier applied to frame RMS before clamping to [0, 1]
    pub volume_gain: f32,
}

/// Topic catalog settings.
///
/// An empty `catalog_path` means the built-in catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsConfig {
    pub catalog_path: String,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Default values ensure the application can start even if no configuration file exists.
/// They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only
                port: 8080,
            },
            live: LiveConfig {
                endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
                model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
                voice: "Zephyr".to_string(),
                api_key: String::new(),           // Must come from the environment
            },
            audio: AudioConfig {
                input_sample_rate: 16000,   // Capture rate expected by the model
                output_sample_rate: 24000,  // Rate of the model's audio replies
                frame_size: 4096,           // ~256ms per outbound frame at 16kHz
                volume_gain: 5.0,
            },
            topics: TopicsConfig {
                catalog_path: String::new(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_ (`__` separates sections)
    /// 4. Handle special cases for HOST, PORT and the API key
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_LIVE__VOICE=Puck`: Use another prebuilt voice
    /// - `APP_AUDIO__FRAME_SIZE=2048`: Smaller outbound frames
    /// - `GEMINI_API_KEY=...`: Credential for the voice service
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists)
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Handle special environment variables used by deployment platforms
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        // The voice service documents both names for its key
        if let Some(key) = env::var("GEMINI_API_KEY").ok().or_else(|| env::var("API_KEY").ok()) {
            settings = settings.set_override("live.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Both sample rates and the frame size are non-zero
    /// - The volume gain is a positive, finite number
    ///
    /// The API key is checked when the transport is built, so the rest of the service (topics,
    /// health) can run without one.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.input_sample_rate == 0 || self.audio.output_sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rates must be greater than 0"));
        }

        if self.audio.frame_size == 0 {
            return Err(anyhow::anyhow!("Audio frame size must be greater than 0"));
        }

        if !self.audio.volume_gain.is_finite() || self.audio.volume_gain <= 0.0 {
            return Err(anyhow::anyhow!("Volume gain must be a positive number"));
        }

        if self.live.endpoint.is_empty() || self.live.model.is_empty() {
            return Err(anyhow::anyhow!("Live endpoint and model must be set"));
        }

        Ok(())
    }

    /// Settings consumed by the session manager.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            input_sample_rate: self.audio.input_sample_rate,
            output_sample_rate: self.audio.output_sample_rate,
            output_channels: 1,
            frame_size: self.audio.frame_size,
            volume_gain: self.audio.volume_gain,
            model: self.live.model.clone(),
            voice: self.live.voice.clone(),
        }
    }

    /// A copy safe to show over the API: the key is replaced by a marker.
    pub fn redacted(&self) -> AppConfig {
        let mut copy = self.clone();
        if !copy.live.api_key.is_empty() {
            copy.live.api_key = "***".to_string();
        }
        copy
    }
}
