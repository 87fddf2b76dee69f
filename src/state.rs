//! # Application State Management
//!
//! Shared state handed to every HTTP request handler and WebSocket actor.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Lets many handlers share ownership of read-only data (config, topic catalog)
//! - **Memory safety**: The data is freed when the last reference is dropped
//!
//! ### Message passing instead of locks
//! - The live session is owned by one background task, not by this struct
//! - `SessionHandle` is just a set of channel ends: cloning it is cheap, and every clone talks
//!   to the same task
//! - Handlers never touch session resources directly, so there is nothing to lock
//!
//! ## Why this shape:
//! actix-web runs several worker threads, each with its own copy of `web::Data<AppState>`.
//! Everything inside must therefore be `Send + Sync`, which `Arc` and channel handles are.

use crate::config::AppConfig;        // Our configuration types
use crate::session::SessionHandle;   // Front of the session task
use crate::topics::TopicCatalog;     // Practice topics
use std::sync::Arc;                  // Thread-safe shared ownership
use std::time::Instant;              // For tracking server uptime

/// The main application state that's shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Effective configuration, fixed for the life of the process
    pub config: Arc<AppConfig>,

    /// The single live session of this process
    pub session: SessionHandle,

    /// Topics the front-end can offer
    pub catalog: Arc<TopicCatalog>,

    /// When the server started (Instant is Copy, so no Arc needed)
    pub start_time: Instant,
}

impl AppState {
    /// Create the shared state.
    ///
    /// ## What this does:
    /// 1. Wraps the config and catalog in `Arc` for cheap sharing
    /// 2. Keeps the session handle (already connected to its task)
    /// 3. Records the current time as the server start time
    pub fn new(config: AppConfig, catalog: TopicCatalog, session: SessionHandle) -> Self {
        Self {
            config: Arc::new(config),
            session,
            catalog: Arc::new(catalog),
            start_time: Instant::now(),
        }
    }

    /// Get how long the server has been running in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
