//! File catalog handlers: listings, uploads, deletes and downloads.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, Request, State},
    http::{header, HeaderValue},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::warn;

use avcnv_core::{ConflictStrategy, FileInfo, FileSource, Transcoder, UploadOutcome};

use super::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Most files accepted by one `POST /upload-multiple`.
pub const MAX_BATCH_FILES: usize = 32;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub strategy: ConflictStrategy,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub source: FileSource,
    pub files: Vec<FileInfo>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct BatchUploadResponse {
    pub results: Vec<UploadOutcome>,
    pub total: usize,
    pub succeeded: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/files/{source}
pub async fn list_files<T: Transcoder>(
    State(state): State<SharedState<T>>,
    Path(source): Path<String>,
) -> ApiResult<Json<FileListResponse>> {
    let source: FileSource = source.parse()?;
    let files = state.catalog().list(source).await?;
    let total = files.len();
    Ok(Json(FileListResponse {
        source,
        files,
        total,
    }))
}

/// POST /api/v1/upload?strategy=overwrite|rename|skip
///
/// Reads the multipart field `file`; other fields are ignored.
pub async fn upload<T: Transcoder>(
    State(state): State<SharedState<T>>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadOutcome>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("Upload is missing a file name"))?;
        let content = field.bytes().await?;

        let outcome = state
            .catalog()
            .save_upload(&filename, &content, params.strategy)
            .await?;
        return Ok(Json(outcome));
    }

    Err(ApiError::bad_request("Missing multipart field 'file'"))
}

/// POST /api/v1/upload-multiple?strategy=overwrite|rename|skip
///
/// Stores every multipart field `file` on its own. A rejected file gets a
/// failed entry and the rest of the batch carries on.
pub async fn upload_multiple<T: Transcoder>(
    State(state): State<SharedState<T>>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> ApiResult<Json<BatchUploadResponse>> {
    let mut results = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        if results.len() == MAX_BATCH_FILES {
            return Err(ApiError::bad_request(format!(
                "At most {} files per batch upload",
                MAX_BATCH_FILES
            )));
        }

        let Some(filename) = field.file_name().map(str::to_string) else {
            results.push(UploadOutcome {
                success: false,
                filename: String::new(),
                message: "Upload is missing a file name".to_string(),
            });
            continue;
        };
        let content = field.bytes().await?;

        let outcome = match state
            .catalog()
            .save_upload(&filename, &content, params.strategy)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(filename = %filename, error = %e, "Batch upload entry rejected");
                UploadOutcome {
                    success: false,
                    filename,
                    message: e.to_string(),
                }
            }
        };
        results.push(outcome);
    }

    if results.is_empty() {
        return Err(ApiError::bad_request("Missing multipart field 'file'"));
    }

    let total = results.len();
    let succeeded = results.iter().filter(|r| r.success).count();
    Ok(Json(BatchUploadResponse {
        results,
        total,
        succeeded,
    }))
}

/// DELETE /api/v1/files/{source}/{*filename}
pub async fn delete_file<T: Transcoder>(
    State(state): State<SharedState<T>>,
    Path((source, filename)): Path<(String, String)>,
) -> ApiResult<Json<MessageResponse>> {
    let source: FileSource = source.parse()?;
    state.catalog().delete(source, &filename).await?;
    Ok(Json(MessageResponse {
        message: format!("Deleted {} from {}", filename, source),
    }))
}

/// GET /api/v1/download/{*filename}
///
/// Serves a converted file from the output directory as an attachment.
pub async fn download<T: Transcoder>(
    State(state): State<SharedState<T>>,
    Path(filename): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let path = state.catalog().resolve(FileSource::Output, &filename).await?;
    let download_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(filename);

    let response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let mut response = response.map(Body::new);

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&download_name)
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}
