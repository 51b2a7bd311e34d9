//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the avcnv server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Tasks by derived status (collected on scrape)
//! - Core conversion metrics, registered from `avcnv_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;

use avcnv_core::{FileStatus, Transcoder};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "avcnv_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("avcnv_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "avcnv_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Task Metrics (collected dynamically)
// =============================================================================

/// Tasks by current derived status.
pub static TASKS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("avcnv_tasks_by_status", "Current task count by status"),
        &["status"],
    )
    .unwrap()
});

/// Tasks currently paused.
pub static TASKS_PAUSED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("avcnv_tasks_paused", "Number of tasks currently paused").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Tasks
    registry
        .register(Box::new(TASKS_BY_STATUS.clone()))
        .unwrap();
    registry.register(Box::new(TASKS_PAUSED.clone())).unwrap();

    // Core metrics (file jobs, processes, task lifecycle)
    for metric in avcnv_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the task gauges reflect the registry.
pub async fn collect_dynamic_metrics<T: Transcoder>(state: &AppState<T>) {
    let tasks = state.orchestrator().list().await;

    for status in [
        FileStatus::Pending,
        FileStatus::Processing,
        FileStatus::Completed,
        FileStatus::Failed,
    ] {
        let count = tasks.iter().filter(|t| t.status == status).count();
        TASKS_BY_STATUS
            .with_label_values(&[status.as_str()])
            .set(count as i64);
    }
    TASKS_PAUSED.set(tasks.iter().filter(|t| t.paused).count() as i64);
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs and file names with placeholders).
pub fn normalize_path(path: &str) -> String {
    // File names are unbounded, keep only the route prefix.
    if let Some(rest) = path.strip_prefix("/api/v1/files/") {
        return match rest.split_once('/') {
            Some((source, _)) => format!("/api/v1/files/{}/{{filename}}", source),
            None => path.to_string(),
        };
    }
    if path.starts_with("/api/v1/download/") {
        return "/api/v1/download/{filename}".to_string();
    }

    let result = UUID_RE.replace_all(path, "{id}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/status/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/status/{id}");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/tasks/12345"), "/api/v1/tasks/{id}");
    }

    #[test]
    fn test_normalize_path_file_names() {
        assert_eq!(
            normalize_path("/api/v1/files/local/album/01 track.flac"),
            "/api/v1/files/local/{filename}"
        );
        assert_eq!(normalize_path("/api/v1/files/upload"), "/api/v1/files/upload");
        assert_eq!(
            normalize_path("/api/v1/download/album/01.mp3"),
            "/api/v1/download/{filename}"
        );
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("avcnv_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Vec metrics only show up once a label set has been touched.
        TASKS_BY_STATUS.with_label_values(&["pending"]).set(0);
        avcnv_core::metrics::FILE_JOBS_TOTAL
            .with_label_values(&["completed"])
            .inc_by(0);
        HTTP_REQUESTS_IN_FLIGHT.set(0);

        let output = encode_metrics();

        assert!(output.contains("avcnv_http_requests_in_flight"));
        assert!(output.contains("avcnv_tasks_by_status"));
        assert!(output.contains("avcnv_tasks_paused"));
        assert!(output.contains("avcnv_file_jobs_total"));
        assert!(output.contains("avcnv_processes_active"));
        assert!(output.contains("avcnv_tasks_submitted_total"));
    }
}
