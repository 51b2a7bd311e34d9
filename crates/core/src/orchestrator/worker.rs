//! Per-file execution: probe, spawn, relay progress, settle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::catalog::{discard_partial, promote, staging_path};
use crate::converter::{ConverterError, ProgressParser, TranscodeJob, Transcoder};
use crate::metrics;
use crate::registry::{FileStatus, Task, TaskEntry};

use super::config::OrchestratorConfig;

/// A job claimed by a worker.
struct Claim {
    index: usize,
    filename: String,
    job: TranscodeJob,
    final_path: PathBuf,
}

/// How a claimed job left the worker.
#[derive(Debug)]
enum Outcome {
    Completed(u64),
    Failed(String),
    /// Stopped by pause; back to pending at 0%.
    Requeued,
}

/// One lane of a task's run loop.
pub(super) struct Worker<T: Transcoder> {
    transcoder: Arc<T>,
    config: OrchestratorConfig,
}

impl<T: Transcoder> Worker<T> {
    pub(super) fn new(transcoder: Arc<T>, config: OrchestratorConfig) -> Self {
        Self { transcoder, config }
    }

    /// Runs jobs until none is runnable, then retires from the task.
    pub(super) async fn run(self, entry: Arc<TaskEntry>) {
        while let Some(claim) = self.claim_next(&entry).await {
            self.process(&entry, claim).await;
        }
    }

    async fn claim_next(&self, entry: &TaskEntry) -> Option<Claim> {
        let mut task = entry.write().await;
        let Some(index) = task.next_runnable() else {
            task.workers = task.workers.saturating_sub(1);
            if task.workers == 0 {
                entry.set_idle(true);
                debug!("Task {} run loop idle", task.id);
            }
            return None;
        };

        task.in_flight.insert(index, None);
        let file = &task.jobs[index];
        Some(Claim {
            index,
            filename: file.filename.clone(),
            job: TranscodeJob {
                job_id: format!("{}-{}", task.id, index),
                input_path: file.input_path.clone(),
                output_path: staging_path(&file.output_path, &task.id, index),
                source_category: task.category,
                output_format: task.output_format,
                options: task.options.clone(),
            },
            final_path: file.output_path.clone(),
        })
    }

    async fn process(&self, entry: &TaskEntry, claim: Claim) {
        let Claim {
            index,
            filename,
            job,
            final_path,
        } = claim;

        let info = match self.transcoder.probe(&job.input_path).await {
            Ok(info) => info,
            Err(e) => {
                settle(entry, index, Outcome::Failed(e.to_string())).await;
                return;
            }
        };

        if entry.read().await.paused {
            settle(entry, index, Outcome::Requeued).await;
            return;
        }

        let started = Instant::now();
        let mut handle = match self.transcoder.start(&job).await {
            Ok(handle) => handle,
            Err(e) => {
                let _ = discard_partial(&job.output_path).await;
                self.start_failed(entry, index, e).await;
                return;
            }
        };

        let terminator = handle.terminator();
        let stop_now = {
            let mut task = entry.write().await;
            task.spawn_failures = 0;
            if task.paused {
                true
            } else {
                task.in_flight.insert(index, Some(terminator.clone()));
                let file = &mut task.jobs[index];
                file.status = FileStatus::Processing;
                file.progress = 0.0;
                info!("Task {} file '{}' -> processing", entry.id(), filename);
                false
            }
        };
        // paused between probe and spawn
        if stop_now {
            terminator.terminate().await;
        }

        let mut parser =
            ProgressParser::new(job.options.output_duration(info.usable_duration()));
        let mut written = 0.0;
        while let Some(line) = handle.next_line().await {
            let Some(fraction) = parser.feed(&line) else {
                continue;
            };
            if fraction - written < self.config.progress_write_step {
                continue;
            }
            written = fraction;

            let mut task = entry.write().await;
            let file = &mut task.jobs[index];
            if file.status == FileStatus::Processing && fraction > file.progress {
                file.progress = fraction;
            }
        }

        let outcome = match handle.wait().await {
            Ok(()) => match promote(&job.output_path, &final_path).await {
                Ok(size) => {
                    metrics::CONVERSION_DURATION
                        .with_label_values(&[job.source_category.as_str()])
                        .observe(started.elapsed().as_secs_f64());
                    Outcome::Completed(size)
                }
                Err(e) => {
                    let _ = discard_partial(&job.output_path).await;
                    Outcome::Failed(format!("Failed to move output into place: {}", e))
                }
            },
            Err(ConverterError::Terminated) => {
                let _ = discard_partial(&job.output_path).await;
                Outcome::Requeued
            }
            Err(e) => {
                let _ = discard_partial(&job.output_path).await;
                Outcome::Failed(e.to_string())
            }
        };

        settle(entry, index, outcome).await;
    }

    /// Records a failed start and escalates repeated spawn errors.
    async fn start_failed(&self, entry: &TaskEntry, index: usize, err: ConverterError) {
        let reason = err.to_string();
        let mut task = entry.write().await;
        if matches!(err, ConverterError::Spawn { .. }) {
            task.spawn_failures += 1;
        }
        apply(&mut task, index, Outcome::Failed(reason.clone()));

        if task.spawn_failures >= self.config.spawn_failure_limit {
            let stranded: Vec<usize> = (0..task.jobs.len())
                .filter(|i| {
                    let file = &task.jobs[*i];
                    file.status == FileStatus::Pending
                        && !task.in_flight.contains_key(i)
                        && task.is_eligible(&file.filename)
                })
                .collect();
            warn!(
                "Task {}: {} consecutive spawn failures, failing {} queued files",
                task.id,
                task.spawn_failures,
                stranded.len()
            );
            for i in stranded {
                apply(&mut task, i, Outcome::Failed(reason.clone()));
            }
        }
        task.touch_finished();
        drop(task);
        entry.mark_settled();
    }
}

async fn settle(entry: &TaskEntry, index: usize, outcome: Outcome) {
    {
        let mut task = entry.write().await;
        apply(&mut task, index, outcome);
        task.touch_finished();
    }
    entry.mark_settled();
}

fn apply(task: &mut Task, index: usize, outcome: Outcome) {
    task.in_flight.remove(&index);
    let task_id = task.id.clone();
    let file = &mut task.jobs[index];

    match outcome {
        Outcome::Completed(size) => {
            file.status = FileStatus::Completed;
            file.progress = 1.0;
            file.output_size = Some(size);
            file.error = None;
            metrics::FILE_JOBS_TOTAL
                .with_label_values(&["completed"])
                .inc();
            info!(
                "Task {} file '{}' -> completed ({} bytes)",
                task_id, file.filename, size
            );
        }
        Outcome::Failed(reason) => {
            file.status = FileStatus::Failed;
            metrics::FILE_JOBS_TOTAL.with_label_values(&["failed"]).inc();
            warn!(
                "Task {} file '{}' -> failed: {}",
                task_id, file.filename, reason
            );
            file.error = Some(reason);
        }
        Outcome::Requeued => {
            if file.status == FileStatus::Processing {
                metrics::FILE_JOBS_TOTAL.with_label_values(&["paused"]).inc();
            }
            file.status = FileStatus::Pending;
            file.progress = 0.0;
            info!("Task {} file '{}' -> pending (paused)", task_id, file.filename);
        }
    }
}
