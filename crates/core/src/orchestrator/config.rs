//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

use crate::converter::MediaCategory;

/// Configuration for the task orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Concurrent processes per audio task.
    /// Video tasks always run one file at a time.
    #[serde(default = "default_audio_parallelism")]
    pub audio_parallelism: usize,

    /// Consecutive spawn failures after which the rest of a task's queue
    /// is failed instead of attempted.
    #[serde(default = "default_spawn_failure_limit")]
    pub spawn_failure_limit: u32,

    /// Minimum progress change before a job's fraction is written back.
    #[serde(default = "default_progress_write_step")]
    pub progress_write_step: f64,
}

fn default_audio_parallelism() -> usize {
    3
}

fn default_spawn_failure_limit() -> u32 {
    2
}

fn default_progress_write_step() -> f64 {
    0.005 // half a percent
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            audio_parallelism: default_audio_parallelism(),
            spawn_failure_limit: default_spawn_failure_limit(),
            progress_write_step: default_progress_write_step(),
        }
    }
}

impl OrchestratorConfig {
    /// Worker count for a task of the given category and size.
    pub fn lane_width(&self, category: MediaCategory, jobs: usize) -> usize {
        let width = match category {
            MediaCategory::Video => 1,
            MediaCategory::Audio => self.audio_parallelism.max(1),
        };
        width.min(jobs.max(1))
    }
}
