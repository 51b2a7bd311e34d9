//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - File jobs (results, durations)
//! - External processes currently alive
//! - Task lifecycle (submissions, evictions)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// File Job Metrics
// =============================================================================

/// File job outcomes by result.
pub static FILE_JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("avcnv_file_jobs_total", "Total file job outcomes"),
        &["result"], // "completed", "failed", "paused"
    )
    .unwrap()
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "avcnv_conversion_duration_seconds",
            "Duration of successful file conversions",
        )
        .buckets(vec![
            0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
        ]),
        &["category"], // "audio", "video"
    )
    .unwrap()
});

/// External transcoding processes currently alive.
pub static PROCESSES_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "avcnv_processes_active",
        "Number of live external transcoding processes",
    )
    .unwrap()
});

// =============================================================================
// Task Metrics
// =============================================================================

/// Tasks accepted by submit.
pub static TASKS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("avcnv_tasks_submitted_total", "Total tasks submitted").unwrap()
});

/// Tasks dropped from the registry by the sweeper or an explicit removal.
pub static TASKS_EVICTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("avcnv_tasks_evicted_total", "Total tasks evicted"),
        &["reason"], // "expired", "removed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(FILE_JOBS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(PROCESSES_ACTIVE.clone()),
        Box::new(TASKS_SUBMITTED.clone()),
        Box::new(TASKS_EVICTED.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        FILE_JOBS_TOTAL.with_label_values(&["completed"]).inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "avcnv_file_jobs_total"));
    }
}
