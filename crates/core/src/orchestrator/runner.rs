//! Task orchestrator implementation.
//!
//! Drives each task's file jobs through the transcoder:
//! - Video: one file at a time, in submission order
//! - Audio: a small worker pool, `audio_parallelism` wide
//! - Pause: terminate live processes, wait for the claimed jobs to requeue
//! - Stop: let running jobs finish, start nothing new

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::catalog::{FileCatalog, FileSource};
use crate::converter::{check_category, MediaCategory, Terminator, Transcoder};
use crate::metrics;
use crate::registry::{FileJob, Task, TaskEntry, TaskRegistry, TaskSnapshot, TaskSummary};

use super::config::OrchestratorConfig;
use super::types::{ConversionRequest, OrchestratorError};
use super::worker::Worker;

/// The task orchestrator: owns task execution on top of the registry.
///
/// Cheap to clone; clones share the registry and the sweeper.
pub struct TaskOrchestrator<T: Transcoder> {
    config: OrchestratorConfig,
    transcoder: Arc<T>,
    catalog: Arc<FileCatalog>,
    registry: TaskRegistry,

    // Runtime state
    sweeper_running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<T: Transcoder> Clone for TaskOrchestrator<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            transcoder: Arc::clone(&self.transcoder),
            catalog: Arc::clone(&self.catalog),
            registry: self.registry.clone(),
            sweeper_running: Arc::clone(&self.sweeper_running),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}

impl<T: Transcoder> TaskOrchestrator<T> {
    pub fn new(
        config: OrchestratorConfig,
        transcoder: Arc<T>,
        catalog: Arc<FileCatalog>,
        registry: TaskRegistry,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            transcoder,
            catalog,
            registry,
            sweeper_running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &FileCatalog {
        &self.catalog
    }

    pub fn transcoder(&self) -> &T {
        &self.transcoder
    }

    /// Validates a batch, registers it and starts running it.
    ///
    /// Nothing is registered when validation fails.
    pub async fn submit(&self, request: ConversionRequest) -> Result<TaskSnapshot, OrchestratorError> {
        let ConversionRequest {
            files,
            source,
            output_format,
            options,
        } = request;

        if files.is_empty() {
            return Err(OrchestratorError::validation("no files to convert"));
        }
        options.validate(output_format)?;
        let category = batch_category(&files)?;
        check_category(category, output_format)?;

        let task_id = TaskRegistry::next_id();
        let mut names = HashSet::new();
        let mut outputs = HashSet::new();
        let mut jobs = Vec::with_capacity(files.len());

        for filename in files {
            if !names.insert(filename.clone()) {
                return Err(OrchestratorError::validation(format!(
                    "file '{}' is listed twice",
                    filename
                )));
            }

            let input_path = self.catalog.resolve(source, &filename).await?;
            let output_path = self.catalog.output_path(&filename, output_format)?;
            if !outputs.insert(output_path.clone()) {
                return Err(OrchestratorError::validation(format!(
                    "file '{}' maps to an output path already used in this task",
                    filename
                )));
            }
            if source == FileSource::Output {
                if let Ok(existing) = tokio::fs::canonicalize(&output_path).await {
                    if existing == input_path {
                        return Err(OrchestratorError::validation(format!(
                            "converting '{}' to {} would overwrite its source",
                            filename, output_format
                        )));
                    }
                }
            }

            let output_file = relative_name(&output_path, &self.catalog.config().output_dir);
            jobs.push(FileJob::new(filename, input_path, output_path, output_file));
        }

        let total = jobs.len();
        let task = Task::new(task_id, source, category, output_format, options, jobs);
        let entry = self.registry.create(task).await;
        metrics::TASKS_SUBMITTED.inc();
        info!(
            "Task {} submitted: {} {} files -> {}",
            entry.id(),
            total,
            category,
            output_format
        );

        let (snapshot, workers) = {
            let mut task = entry.write().await;
            let workers = self.claim_workers(&entry, &mut task);
            (task.snapshot(), workers)
        };
        self.spawn_workers(&entry, workers);
        Ok(snapshot)
    }

    /// Runs a task's runnable jobs to the end, or until it is paused.
    pub async fn run(&self, task_id: &str) -> Result<TaskSnapshot, OrchestratorError> {
        let entry = self.registry.get(task_id).await?;
        let workers = {
            let mut task = entry.write().await;
            self.claim_workers(&entry, &mut task)
        };

        join_all((0..workers).map(|_| self.worker().run(Arc::clone(&entry)))).await;
        entry.wait_idle().await;
        Ok(entry.snapshot().await)
    }

    /// Stops a task and returns once no process of it is alive, or a resume
    /// has taken it over.
    ///
    /// The in-flight jobs go back to pending at 0% with their partial output
    /// removed. Pausing a paused or finished task changes nothing.
    pub async fn pause(&self, task_id: &str) -> Result<TaskSnapshot, OrchestratorError> {
        let entry = self.registry.get(task_id).await?;
        self.pause_entry(&entry).await;
        Ok(entry.snapshot().await)
    }

    async fn pause_entry(&self, entry: &TaskEntry) {
        let (claimed, terminators) = {
            let mut task = entry.write().await;
            let claimed: Vec<usize> = task.in_flight.keys().copied().collect();
            if task.paused || task.all_terminal() {
                (claimed, Vec::new())
            } else {
                task.paused = true;
                let live: Vec<Terminator> = task.in_flight.values().flatten().cloned().collect();
                info!("Pausing task {}, stopping {} processes", task.id, live.len());
                (claimed, live)
            }
        };

        join_all(terminators.iter().map(|t| t.terminate())).await;
        // jobs claimed but not yet spawned see the flag and requeue; a resume
        // in the meantime owns whatever runs next
        entry
            .wait_until(|task| {
                !task.paused || claimed.iter().all(|i| !task.in_flight.contains_key(i))
            })
            .await;
    }

    /// Lets the running jobs finish and starts nothing new.
    ///
    /// Returns at once; live processes are not touched. Resume clears it.
    pub async fn stop(&self, task_id: &str) -> Result<TaskSnapshot, OrchestratorError> {
        let entry = self.registry.get(task_id).await?;
        let mut task = entry.write().await;
        if !task.stopped && !task.all_terminal() {
            task.stopped = true;
            info!(
                "Stopping task {}, letting {} running files finish",
                task.id,
                task.in_flight.len()
            );
        }
        Ok(task.snapshot())
    }

    /// Continues a task with the given files, or every non-terminal file.
    ///
    /// Names the task does not contain are ignored. Finished files never run
    /// again.
    pub async fn resume(
        &self,
        task_id: &str,
        filenames: Option<Vec<String>>,
    ) -> Result<TaskSnapshot, OrchestratorError> {
        let entry = self.registry.get(task_id).await?;

        let (snapshot, workers) = {
            let mut task = entry.write().await;
            let eligible = filenames.map(|names| {
                let mut eligible = HashSet::new();
                for name in names {
                    if task.jobs.iter().any(|j| j.filename == name) {
                        eligible.insert(name);
                    } else {
                        warn!("Resume of task {} ignores unknown file '{}'", task.id, name);
                    }
                }
                eligible
            });

            match &eligible {
                Some(names) => info!("Resuming task {} with {} files", task.id, names.len()),
                None => info!("Resuming task {}", task.id),
            }
            task.eligible = eligible;
            task.paused = false;
            task.stopped = false;
            task.spawn_failures = 0;

            let workers = self.claim_workers(&entry, &mut task);
            (task.snapshot(), workers)
        };
        entry.mark_settled();
        self.spawn_workers(&entry, workers);
        Ok(snapshot)
    }

    pub async fn status(&self, task_id: &str) -> Result<TaskSnapshot, OrchestratorError> {
        Ok(self.registry.get(task_id).await?.snapshot().await)
    }

    pub async fn overall_progress(&self, task_id: &str) -> Result<f64, OrchestratorError> {
        let entry = self.registry.get(task_id).await?;
        let progress = entry.read().await.overall_progress();
        Ok(progress)
    }

    pub async fn list(&self) -> Vec<TaskSummary> {
        self.registry.list().await
    }

    /// Task teardown: pause, then drop from the registry.
    pub async fn remove(&self, task_id: &str) -> Result<TaskSnapshot, OrchestratorError> {
        let entry = self.registry.get(task_id).await?;
        self.pause_entry(&entry).await;
        self.registry.remove(task_id).await?;
        metrics::TASKS_EVICTED.with_label_values(&["removed"]).inc();
        info!("Task {} removed", task_id);
        Ok(entry.snapshot().await)
    }

    /// Start the background sweeper that evicts expired tasks.
    pub fn start_sweeper(&self) {
        if self.sweeper_running.swap(true, Ordering::SeqCst) {
            warn!("Task sweeper already running");
            return;
        }

        let registry = self.registry.clone();
        let interval = registry.config().sweep_interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Task sweeper started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Task sweeper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let evicted = registry.sweep().await;
                        if !evicted.is_empty() {
                            metrics::TASKS_EVICTED
                                .with_label_values(&["expired"])
                                .inc_by(evicted.len() as u64);
                            debug!("Sweeper evicted {} tasks", evicted.len());
                        }
                    }
                }
            }
            info!("Task sweeper stopped");
        });
    }

    /// Stops the sweeper and every running task.
    pub async fn shutdown(&self) {
        if self.sweeper_running.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }

        let entries = self.registry.entries().await;
        info!("Stopping {} tasks", entries.len());
        join_all(entries.iter().map(|entry| self.pause_entry(entry))).await;
    }

    fn worker(&self) -> Worker<T> {
        Worker::new(Arc::clone(&self.transcoder), self.config.clone())
    }

    /// Tops the task up to its lane width. Called with the write lock held.
    fn claim_workers(&self, entry: &TaskEntry, task: &mut Task) -> usize {
        if task.next_runnable().is_none() {
            return 0;
        }
        let width = self.config.lane_width(task.category, task.jobs.len());
        let missing = width.saturating_sub(task.workers);
        if missing > 0 {
            task.workers += missing;
            entry.set_idle(false);
        }
        missing
    }

    fn spawn_workers(&self, entry: &Arc<TaskEntry>, count: usize) {
        for _ in 0..count {
            let worker = self.worker();
            let entry = Arc::clone(entry);
            tokio::spawn(async move { worker.run(entry).await });
        }
    }
}

/// Single media category of a batch, from file extensions.
fn batch_category(files: &[String]) -> Result<MediaCategory, OrchestratorError> {
    let mut category = None;
    for file in files {
        let this = MediaCategory::from_path(Path::new(file)).ok_or_else(|| {
            OrchestratorError::validation(format!("unsupported file type: '{}'", file))
        })?;
        match category {
            None => category = Some(this),
            Some(existing) if existing != this => {
                return Err(OrchestratorError::validation(
                    "a task cannot mix audio and video files",
                ))
            }
            Some(_) => {}
        }
    }
    category.ok_or_else(|| OrchestratorError::validation("no files to convert"))
}

fn relative_name(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
