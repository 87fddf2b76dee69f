//! # HTTP Request Handlers
//!
//! REST endpoints under `/api/v1`. The WebSocket lives in `crate::websocket`.

pub mod config;
pub mod session;
pub mod topics;

pub use self::config::*;
pub use self::session::*;
pub use self::topics::*;
