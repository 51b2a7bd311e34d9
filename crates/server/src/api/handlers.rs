use axum::{extract::State, Json};
use serde::Serialize;

use avcnv_core::{FormatCatalog, SanitizedConfig, Transcoder};

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config<T: Transcoder>(State(state): State<SharedState<T>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Supported output formats and the video encoders detected at startup.
pub async fn get_capabilities<T: Transcoder>(
    State(state): State<SharedState<T>>,
) -> Json<FormatCatalog> {
    Json(state.formats().clone())
}
