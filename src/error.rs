//! # Error Handling
//!
//! This module defines the crate-wide error type and how it is turned into HTTP responses.
//!
//! ## Error Categories:
//!
//! ### Service errors
//! - **Internal / BadRequest / NotFound / ConfigError**: the usual HTTP-facing failures
//!
//! ### Live session errors
//! - **Permission**: microphone access denied or unavailable
//! - **Device**: an audio context or capture graph could not be opened
//! - **Transport**: the realtime stream failed (handshake rejected, socket error)
//! - **Processing**: a single frame or chunk could not be sent, decoded or scheduled
//!
//! Only permission, device and transport errors ever reach the session observer. Processing
//! errors are logged where they happen and the session keeps running.

use actix_web::{HttpResponse, ResponseError};  // Web framework error handling
use serde_json::json;                          // For creating JSON error responses
use std::fmt;                                  // For implementing Display trait

/// Custom error type for the service and the live session core.
///
/// ## Usage Example:
/// ```rust
/// use speakeasy_live::error::AppError;
/// let err = AppError::NotFound("topic 'weather'".to_string());
/// assert_eq!(err.to_string(), "Not found: topic 'weather'");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Internal server errors
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// Microphone permission denied or no capture device
    Permission(String),

    /// Audio context / graph failure
    Device(String),

    /// Realtime stream failure
    Transport(String),

    /// Per-frame or per-chunk failure, contained by the session
    Processing(String),
}

impl AppError {
    /// Whether this error is surfaced to the session observer.
    ///
    /// Permission, device and transport failures end the session and are reported exactly
    /// once; everything else is logged and contained.
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            AppError::Permission(_) | AppError::Device(_) | AppError::Transport(_)
        )
    }

    /// Machine-readable error type used in JSON payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::ConfigError(_) => "config_error",
            AppError::Permission(_) => "permission_error",
            AppError::Device(_) => "device_error",
            AppError::Transport(_) => "transport_error",
            AppError::Processing(_) => "processing_error",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Permission(msg) => write!(f, "Microphone unavailable: {}", msg),
            AppError::Device(msg) => write!(f, "Audio device error: {}", msg),
            AppError::Transport(msg) => write!(f, "{}", msg),
            AppError::Processing(msg) => write!(f, "Processing error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts errors into JSON HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "not_found",
///     "message": "Not found: topic 'weather'",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,                       // 400
            AppError::NotFound(_) => StatusCode::NOT_FOUND,                           // 404
            AppError::Permission(_) => StatusCode::FORBIDDEN,                         // 403
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,                        // 502
            AppError::Device(_) => StatusCode::SERVICE_UNAVAILABLE,                   // 503
            AppError::Internal(_) | AppError::ConfigError(_) | AppError::Processing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR                                     // 500
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.kind(),                          // Machine-readable error type
                "message": self.to_string(),                  // Human-readable error message
                "timestamp": chrono::Utc::now().to_rfc3339()  // When the error occurred
            }
        }))
    }
}

/// Automatic conversion from anyhow::Error to AppError.
///
/// Seams (devices, transport) report `anyhow` errors; anything not classified more precisely
/// by the caller becomes an internal error.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors come from clients sending malformed data.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Topic catalog files are configuration, so TOML problems are configuration errors.
impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::ConfigError(format!("invalid topic catalog: {}", err))
    }
}

/// Inbound audio arrives base64-encoded; a bad payload only spoils that one chunk.
impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::Processing(format!("invalid base64 audio payload: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Transport(format!("websocket error: {}", err))
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
