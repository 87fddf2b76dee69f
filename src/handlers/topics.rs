//! # Topic REST API Handlers
//!
//! ## Available Endpoints:
//! - `GET /api/v1/topics` - List practice topics in display order
//! - `GET /api/v1/topics/{id}` - One topic

use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// List every topic together with the available practice modes.
pub async fn list_topics(state: web::Data<AppState>) -> HttpResponse {
    let topics = state.catalog.list();

    HttpResponse::Ok().json(json!({
        "topics": topics,
        "count": topics.len(),
        "modes": crate::topics::PracticeMode::ALL,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn get_topic(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let topic = state
        .catalog
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("Topic '{}' not found", id)))?;

    Ok(HttpResponse::Ok().json(topic))
}
