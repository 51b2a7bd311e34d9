use axum::{
    extract::{DefaultBodyLimit, State},
    http::header,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use avcnv_core::Transcoder;

use super::{files, handlers, middleware::metrics_middleware, tasks};
use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

/// Multipart framing allowance on top of the configured upload size.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router<T: Transcoder>(state: Arc<AppState<T>>) -> Router {
    let upload_limit = usize::try_from(state.catalog().config().max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    let batch_limit = upload_limit.saturating_mul(files::MAX_BATCH_FILES);

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config::<T>))
        .route("/capabilities", get(handlers::get_capabilities::<T>))
        // Conversion tasks
        .route("/convert", post(tasks::convert::<T>))
        .route("/status/{task_id}", get(tasks::get_status::<T>))
        .route("/pause/{task_id}", post(tasks::pause::<T>))
        .route("/stop/{task_id}", post(tasks::stop::<T>))
        .route("/resume/{task_id}", post(tasks::resume::<T>))
        .route("/tasks", get(tasks::list_tasks::<T>))
        .route("/tasks/{task_id}", delete(tasks::delete_task::<T>))
        // File catalog
        .route("/files/{source}", get(files::list_files::<T>))
        .route("/files/{source}/{*filename}", delete(files::delete_file::<T>))
        .route(
            "/upload",
            post(files::upload::<T>).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/upload-multiple",
            post(files::upload_multiple::<T>).layer(DefaultBodyLimit::max(batch_limit)),
        )
        .route("/download/{*filename}", get(files::download::<T>));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(metrics_handler::<T>))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /metrics
async fn metrics_handler<T: Transcoder>(State(state): State<Arc<AppState<T>>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
