//! # SpeakEasy Live - Main Application Entry Point
//!
//! Starts the HTTP/WebSocket server that fronts a single live practice session.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: the server, the session task and the live transport all run on tokio
//! - **Trait objects**: the session is built from `Box<dyn AudioBackend>` and
//!   `Arc<dyn LiveTransport>`, so main is the only place that picks concrete devices and services
//! - **Result<T, E>**: every startup step returns early with `?` on failure
//!
//! ## Application Architecture:
//! - **config**: TOML file + environment variables
//! - **topics**: the practice catalog offered to the front-end
//! - **session**: the background task owning the live session
//! - **handlers / websocket**: REST and WebSocket control surface

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use speakeasy_live::config::AppConfig;
use speakeasy_live::device::CpalBackend;
use speakeasy_live::live::gemini::GeminiTransport;
use speakeasy_live::session::SessionHandle;
use speakeasy_live::state::AppState;
use speakeasy_live::topics::TopicCatalog;
use speakeasy_live::{handlers, health, websocket};

/// Set by the signal task, polled by `wait_for_shutdown`.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** and the topic catalog
/// 2. **Builds the live session**: cpal devices + Gemini Live transport, owned by one task
/// 3. **Starts the HTTP server** with REST routes and the session WebSocket
/// 4. **Shuts down gracefully**: ends any running session before exiting
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting speakeasy-live v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    info!(
        "Live model {} with voice {}, audio {} Hz in / {} Hz out",
        config.live.model, config.live.voice, config.audio.input_sample_rate, config.audio.output_sample_rate
    );

    let catalog = TopicCatalog::from_config_path(&config.topics.catalog_path)?;
    info!("Loaded {} practice topics", catalog.list().len());

    let transport = GeminiTransport::new(&config.live)?;
    let backend = CpalBackend::new(config.audio.input_sample_rate);
    let session = SessionHandle::spawn(Box::new(backend), Arc::new(transport), config.session_settings());

    let app_state = AppState::new(config.clone(), catalog, session.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/topics", web::get().to(handlers::list_topics))
                    .route("/topics/{id}", web::get().to(handlers::get_topic))
                    .route("/session", web::get().to(handlers::get_session))
                    .route("/session", web::post().to(handlers::start_session))
                    .route("/session", web::delete().to(handlers::stop_session)),
            )
            .route("/ws/session", web::get().to(websocket::session_websocket))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    // Release the microphone and close the live stream before exiting
    if let Err(e) = session.disconnect().await {
        warn!("Session teardown on shutdown failed: {}", e);
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing.
///
/// `RUST_LOG` overrides the default filter of `speakeasy_live=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speakeasy_live=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM / SIGINT and raise the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
