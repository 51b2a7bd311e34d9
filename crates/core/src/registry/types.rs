//! Task and file job types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::catalog::FileSource;
use crate::converter::{ConversionOptions, MediaCategory, OutputFormat, Terminator};

/// Registry lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// How long a finished task stays visible before the sweeper drops it.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RegistryConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Errors from the task registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    NotFound(String),
}

/// Status of one file job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate task status, derived from its jobs.
pub type TaskStatus = FileStatus;

/// One file's conversion within a task.
#[derive(Debug, Clone)]
pub struct FileJob {
    /// Name relative to the task's source root.
    pub filename: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Output name relative to the output root.
    pub output_file: String,
    pub status: FileStatus,
    pub progress: f64,
    pub error: Option<String>,
    pub output_size: Option<u64>,
}

impl FileJob {
    pub fn new(
        filename: impl Into<String>,
        input_path: PathBuf,
        output_path: PathBuf,
        output_file: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            input_path,
            output_path,
            output_file: output_file.into(),
            status: FileStatus::Pending,
            progress: 0.0,
            error: None,
            output_size: None,
        }
    }

    /// Contribution to the aggregate: terminal jobs count as done.
    pub fn effective_progress(&self) -> f64 {
        if self.status.is_terminal() {
            1.0
        } else {
            self.progress
        }
    }
}

/// A submitted batch.
///
/// Besides the observable state, a task carries the bookkeeping of its run
/// loop: active workers, jobs claimed by a worker, and the live process
/// terminators. All of it sits behind the same lock so pause and the workers
/// always agree on who stops what.
#[derive(Debug)]
pub struct Task {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub source: FileSource,
    pub category: MediaCategory,
    pub output_format: OutputFormat,
    pub options: ConversionOptions,
    pub jobs: Vec<FileJob>,
    pub paused: bool,
    /// Running jobs finish, nothing new starts.
    pub stopped: bool,
    pub finished_at: Option<DateTime<Utc>>,
    /// Filenames allowed to run; `None` means every job.
    pub(crate) eligible: Option<HashSet<String>>,
    pub(crate) workers: usize,
    /// Claimed job indexes, with a terminator once the process is live.
    pub(crate) in_flight: HashMap<usize, Option<Terminator>>,
    pub(crate) spawn_failures: u32,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        source: FileSource,
        category: MediaCategory,
        output_format: OutputFormat,
        options: ConversionOptions,
        jobs: Vec<FileJob>,
    ) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            source,
            category,
            output_format,
            options,
            jobs,
            paused: false,
            stopped: false,
            finished_at: None,
            eligible: None,
            workers: 0,
            in_flight: HashMap::new(),
            spawn_failures: 0,
        }
    }

    pub fn status(&self) -> TaskStatus {
        if self.jobs.iter().any(|j| j.status == FileStatus::Processing) {
            FileStatus::Processing
        } else if self.jobs.iter().any(|j| j.status == FileStatus::Pending) {
            FileStatus::Pending
        } else if !self.jobs.is_empty() && self.jobs.iter().all(|j| j.status == FileStatus::Failed)
        {
            FileStatus::Failed
        } else {
            FileStatus::Completed
        }
    }

    /// Mean of job fractions, terminal jobs counting as 1.0.
    pub fn overall_progress(&self) -> f64 {
        if self.jobs.is_empty() {
            return 1.0;
        }
        let sum: f64 = self.jobs.iter().map(FileJob::effective_progress).sum();
        sum / self.jobs.len() as f64
    }

    pub fn all_terminal(&self) -> bool {
        self.jobs.iter().all(|j| j.status.is_terminal())
    }

    pub fn is_eligible(&self, filename: &str) -> bool {
        self.eligible
            .as_ref()
            .map_or(true, |names| names.contains(filename))
    }

    /// First pending, unclaimed, eligible job in submission order.
    pub(crate) fn next_runnable(&self) -> Option<usize> {
        if self.paused || self.stopped {
            return None;
        }
        self.jobs.iter().enumerate().position(|(index, job)| {
            job.status == FileStatus::Pending
                && !self.in_flight.contains_key(&index)
                && self.is_eligible(&job.filename)
        })
    }

    /// Stamps `finished_at` once every job is terminal.
    pub(crate) fn touch_finished(&mut self) {
        if self.finished_at.is_none() && self.all_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.id.clone(),
            created_at: self.created_at,
            source: self.source,
            output_format: self.output_format,
            status: self.status(),
            paused: self.paused,
            stopped: self.stopped,
            total_files: self.jobs.len(),
            overall_progress: self.overall_progress(),
            files: self
                .jobs
                .iter()
                .map(|job| FileSnapshot {
                    filename: job.filename.clone(),
                    status: job.status,
                    progress: job.progress,
                    error: job.error.clone(),
                    output_file: (job.status == FileStatus::Completed)
                        .then(|| job.output_file.clone()),
                    output_size: job.output_size,
                })
                .collect(),
        }
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.id.clone(),
            created_at: self.created_at,
            output_format: self.output_format,
            status: self.status(),
            paused: self.paused,
            stopped: self.stopped,
            total_files: self.jobs.len(),
            overall_progress: self.overall_progress(),
        }
    }
}

/// Consistent point-in-time view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    pub source: FileSource,
    pub output_format: OutputFormat,
    pub status: TaskStatus,
    pub paused: bool,
    pub stopped: bool,
    pub total_files: usize,
    pub overall_progress: f64,
    pub files: Vec<FileSnapshot>,
}

impl TaskSnapshot {
    pub fn file(&self, filename: &str) -> Option<&FileSnapshot> {
        self.files.iter().find(|f| f.filename == filename)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub filename: String,
    pub status: FileStatus,
    pub progress: f64,
    pub error: Option<String>,
    pub output_file: Option<String>,
    pub output_size: Option<u64>,
}

/// Row in a task listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    pub output_format: OutputFormat,
    pub status: TaskStatus,
    pub paused: bool,
    pub stopped: bool,
    pub total_files: usize,
    pub overall_progress: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(statuses: &[FileStatus]) -> Task {
        let jobs = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let mut job = FileJob::new(
                    format!("{}.wav", i),
                    PathBuf::from(format!("/in/{}.wav", i)),
                    PathBuf::from(format!("/out/{}.mp3", i)),
                    format!("{}.mp3", i),
                );
                job.status = *status;
                job
            })
            .collect();
        Task::new(
            "t1",
            FileSource::Upload,
            MediaCategory::Audio,
            OutputFormat::Mp3,
            ConversionOptions::default(),
            jobs,
        )
    }

    #[test]
    fn test_derived_status() {
        use FileStatus::*;
        assert_eq!(task(&[Completed, Processing, Pending]).status(), Processing);
        assert_eq!(task(&[Completed, Pending]).status(), Pending);
        assert_eq!(task(&[Failed, Failed]).status(), Failed);
        assert_eq!(task(&[Failed, Completed]).status(), Completed);
    }

    #[test]
    fn test_overall_progress_counts_failed_as_done() {
        use FileStatus::*;
        let mut t = task(&[Completed, Failed, Processing, Pending]);
        t.jobs[2].progress = 0.5;
        assert!((t.overall_progress() - 2.5 / 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_next_runnable_respects_claims_and_eligibility() {
        use FileStatus::*;
        let mut t = task(&[Completed, Pending, Pending, Pending]);
        assert_eq!(t.next_runnable(), Some(1));

        t.in_flight.insert(1, None);
        assert_eq!(t.next_runnable(), Some(2));

        t.eligible = Some(["3.wav".to_string()].into_iter().collect());
        assert_eq!(t.next_runnable(), Some(3));

        t.paused = true;
        assert_eq!(t.next_runnable(), None);

        t.paused = false;
        t.stopped = true;
        assert_eq!(t.next_runnable(), None);
    }

    #[test]
    fn test_snapshot_shape() {
        use FileStatus::*;
        let mut t = task(&[Completed, Failed]);
        t.jobs[0].output_size = Some(42);
        t.jobs[1].error = Some("Encoder exited with code 1".to_string());

        let snap = t.snapshot();
        assert_eq!(snap.total_files, 2);
        assert_eq!(snap.file("0.wav").unwrap().output_file.as_deref(), Some("0.mp3"));
        assert_eq!(snap.file("1.wav").unwrap().output_file, None);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["files"][0]["output_size"], 42);
        assert_eq!(json["output_format"], "mp3");
    }

    #[test]
    fn test_touch_finished() {
        use FileStatus::*;
        let mut t = task(&[Completed, Pending]);
        t.touch_finished();
        assert!(t.finished_at.is_none());
        t.jobs[1].status = Failed;
        t.touch_finished();
        assert!(t.finished_at.is_some());
    }
}
