//! Conversion task handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use avcnv_core::{ConversionRequest, TaskSnapshot, TaskSummary, Transcoder};

use super::error::ApiResult;
use crate::state::SharedState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Body of `POST /resume/{task_id}`. Without `filenames` every unfinished
/// file is eligible.
#[derive(Debug, Default, Deserialize)]
pub struct ResumeRequest {
    #[serde(default)]
    pub filenames: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskSummary>,
    pub total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/convert
pub async fn convert<T: Transcoder>(
    State(state): State<SharedState<T>>,
    payload: Result<Json<ConversionRequest>, JsonRejection>,
) -> ApiResult<Json<TaskSnapshot>> {
    let Json(request) = payload?;
    let snapshot = state.orchestrator().submit(request).await?;
    Ok(Json(snapshot))
}

/// GET /api/v1/status/{task_id}
pub async fn get_status<T: Transcoder>(
    State(state): State<SharedState<T>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskSnapshot>> {
    Ok(Json(state.orchestrator().status(&task_id).await?))
}

/// POST /api/v1/pause/{task_id}
///
/// Returns once every process the pause stopped has exited.
pub async fn pause<T: Transcoder>(
    State(state): State<SharedState<T>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskSnapshot>> {
    Ok(Json(state.orchestrator().pause(&task_id).await?))
}

/// POST /api/v1/stop/{task_id}
///
/// Running files finish; nothing new starts until a resume.
pub async fn stop<T: Transcoder>(
    State(state): State<SharedState<T>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskSnapshot>> {
    Ok(Json(state.orchestrator().stop(&task_id).await?))
}

/// POST /api/v1/resume/{task_id}
pub async fn resume<T: Transcoder>(
    State(state): State<SharedState<T>>,
    Path(task_id): Path<String>,
    payload: Result<Option<Json<ResumeRequest>>, JsonRejection>,
) -> ApiResult<Json<TaskSnapshot>> {
    let filenames = payload?.and_then(|Json(body)| body.filenames);
    Ok(Json(state.orchestrator().resume(&task_id, filenames).await?))
}

/// GET /api/v1/tasks
pub async fn list_tasks<T: Transcoder>(State(state): State<SharedState<T>>) -> Json<TaskListResponse> {
    let tasks = state.orchestrator().list().await;
    let total = tasks.len();
    Json(TaskListResponse { tasks, total })
}

/// DELETE /api/v1/tasks/{task_id}
pub async fn delete_task<T: Transcoder>(
    State(state): State<SharedState<T>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskSnapshot>> {
    Ok(Json(state.orchestrator().remove(&task_id).await?))
}
