//! Common test utilities for API testing with the mock transcoder.
//!
//! Builds the real router over an in-process orchestrator whose transcoder
//! is a [`MockTranscoder`], with storage in a scratch directory.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use avcnv_core::{
    testing::{fixtures, MockTranscoder},
    Config, EncoderCapabilities, FileCatalog, FileStatus, FormatCatalog, OrchestratorConfig,
    StorageConfig, TaskSnapshot,
};
use avcnv_server::state::AppState;

pub use avcnv_core::testing::fixtures::TestEnv;

const WAIT: Duration = Duration::from_secs(10);
const BOUNDARY: &str = "avcnv-test-boundary";

/// In-process server over a mock transcoder.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_convert() {
///     let fixture = TestFixture::new().await;
///     fixture.env.add_upload("a.wav").await.unwrap();
///
///     let response = fixture.post("/api/v1/convert", json!({
///         "files": ["a.wav"],
///         "output_format": "mp3"
///     })).await;
///
///     assert_eq!(response.status, StatusCode::OK);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    pub transcoder: Arc<MockTranscoder>,
    pub state: Arc<AppState<MockTranscoder>>,
    pub env: TestEnv,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_upload_limit(StorageConfig::default().max_upload_bytes).await
    }

    pub async fn with_upload_limit(max_upload_bytes: u64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut storage = StorageConfig::under(temp_dir.path());
        storage.max_upload_bytes = max_upload_bytes;
        let catalog = Arc::new(FileCatalog::new(storage.clone()));
        catalog.ensure_dirs().await.expect("Failed to create storage");
        let env = TestEnv { catalog };

        let transcoder = Arc::new(MockTranscoder::new());
        let orchestrator =
            env.orchestrator_with(Arc::clone(&transcoder), OrchestratorConfig::default());

        let config = Config {
            storage,
            ..Default::default()
        };
        let state = Arc::new(AppState::new(
            config,
            orchestrator,
            FormatCatalog::new(EncoderCapabilities::default()),
        ));
        let router = avcnv_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            transcoder,
            state,
            env,
            temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// POST without any body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Uploads `content` as the multipart field `file`.
    pub async fn upload(&self, path: &str, filename: &str, content: &[u8]) -> TestResponse {
        self.upload_many(path, &[(filename, content)]).await
    }

    /// Uploads each `(filename, content)` as its own multipart field `file`.
    pub async fn upload_many(&self, path: &str, files: &[(&str, &[u8])]) -> TestResponse {
        let mut body = Vec::new();
        for (filename, content) in files {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                    filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Submits a conversion over uploads that are created first.
    pub async fn convert(&self, names: &[&str], format: &str) -> TestResponse {
        for name in names {
            self.env.add_upload(name).await.expect("Failed to add upload");
        }
        self.post(
            "/api/v1/convert",
            serde_json::json!({ "files": names, "output_format": format }),
        )
        .await
    }

    pub async fn wait_until<F>(&self, task_id: &str, done: F) -> TaskSnapshot
    where
        F: FnMut(&TaskSnapshot) -> bool,
    {
        fixtures::wait_for(self.state.orchestrator(), task_id, WAIT, done).await
    }

    pub async fn wait_finished(&self, task_id: &str) -> TaskSnapshot {
        self.wait_until(task_id, |s| {
            s.files
                .iter()
                .all(|f| matches!(f.status, FileStatus::Completed | FileStatus::Failed))
        })
        .await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(path);
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }
}
