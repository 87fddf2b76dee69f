use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /api/v1/config`: the effective configuration with the API key masked.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.config.redacted();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "live": {
                "endpoint": config.live.endpoint,
                "model": config.live.model,
                "voice": config.live.voice,
                "api_key": config.live.api_key
            },
            "audio": {
                "input_sample_rate": config.audio.input_sample_rate,
                "output_sample_rate": config.audio.output_sample_rate,
                "frame_size": config.audio.frame_size,
                "volume_gain": config.audio.volume_gain
            },
            "topics": {
                "catalog_path": config.topics.catalog_path
            }
        }
    })))
}
