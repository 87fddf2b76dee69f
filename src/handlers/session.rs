//! # Session REST API Handlers
//!
//! ## Available Endpoints:
//! - `GET /api/v1/session` - Current session status
//! - `POST /api/v1/session` - Start a session (`{"mode"?, "topic_id"?}`)
//! - `DELETE /api/v1/session` - End the session
//!
//! Start and end are asynchronous: both answer `202 Accepted` and the outcome shows up in the
//! status and on the `/ws/session` event stream. A start while a session is active is
//! answered with `already_active` and no `session_id`.

use crate::topics::PracticeMode;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Request body for starting a session. Both fields are optional.
#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    pub mode: Option<PracticeMode>,
    pub topic_id: Option<String>,
}

pub async fn get_session(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.session.status())
}

/// An empty body means "all defaults"; anything else must parse.
fn parse_start_request(body: &[u8]) -> Result<StartSessionRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StartSessionRequest::default());
    }
    Ok(serde_json::from_slice(body)?)
}

pub async fn start_session(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let request = parse_start_request(&body)?;
    let (mode, topic) = state
        .catalog
        .resolve(request.mode, request.topic_id.as_deref())?;

    info!(mode = mode.as_str(), topic_id = ?request.topic_id, "Session start requested");
    let session_id = state.session.connect(mode, topic.clone()).await?;

    Ok(HttpResponse::Accepted().json(json!({
        "status": if session_id.is_some() { "accepted" } else { "already_active" },
        "session_id": session_id,
        "mode": mode,
        "topic": topic,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

pub async fn stop_session(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    info!("Session stop requested");
    state.session.disconnect().await?;

    Ok(HttpResponse::Accepted().json(json!({
        "status": "accepted",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::session::testing::{test_settings, Rig};
    use crate::session::{ConnectionState, SessionHandle};
    use crate::topics::TopicCatalog;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::time::Duration;

    fn test_state(rig: &Rig) -> AppState {
        let session = SessionHandle::spawn(rig.backend(), rig.live_transport(), test_settings());
        AppState::new(AppConfig::default(), TopicCatalog::builtin(), session)
    }

    #[actix_web::test]
    async fn test_start_resolves_topic_mode() {
        let (rig, _) = Rig::new();
        let state = test_state(&rig);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/v1/session", web::post().to(start_session)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/session")
            .set_json(json!({ "topic_id": "job-interview" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["mode"], "INTERVIEW");
        assert_eq!(body["topic"]["title"], "Job Interview");

        let mut status = state.session.watch_status();
        tokio::time::timeout(
            Duration::from_secs(2),
            status.wait_for(|s| s.state == ConnectionState::Connecting),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(rig.transport().connects, 1);
    }

    #[actix_web::test]
    async fn test_start_with_unknown_topic_is_404() {
        let (rig, _) = Rig::new();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state(&rig)))
                .route("/api/v1/session", web::post().to(start_session)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/session")
            .set_json(json!({ "mode": "GRAMMAR", "topic_id": "karaoke" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(rig.transport().connects, 0);
    }

    #[actix_web::test]
    async fn test_invalid_body_is_rejected_without_connecting() {
        let (rig, _) = Rig::new();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state(&rig)))
                .route("/api/v1/session", web::post().to(start_session)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/session")
            .set_json(json!({ "mode": "SHOUTING", "topic_id": "karaoke" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/v1/session")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rig.transport().connects, 0);
    }

    #[actix_web::test]
    async fn test_empty_body_starts_casual_session() {
        let (rig, _) = Rig::new();
        let state = test_state(&rig);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/api/v1/session", web::post().to(start_session)),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/v1/session").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["mode"], "CASUAL");
        assert!(body["topic"].is_null());
        assert!(body["session_id"].is_string());

        // A second start is a no-op
        let req = test::TestRequest::post().uri("/api/v1/session").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "already_active");
        assert!(body["session_id"].is_null());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rig.transport().connects, 1);
    }

    #[actix_web::test]
    async fn test_status_and_stop() {
        let (rig, _) = Rig::new();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state(&rig)))
                .route("/api/v1/session", web::get().to(get_session))
                .route("/api/v1/session", web::delete().to(stop_session)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/session").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["state"], "idle");
        assert!(body["session_id"].is_null());

        let req = test::TestRequest::delete().uri("/api/v1/session").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }
}
