//! In-memory task store.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use super::types::{RegistryConfig, RegistryError, Task, TaskSnapshot, TaskSummary};

/// One registered task plus its idle and settle signals.
#[derive(Debug)]
pub struct TaskEntry {
    id: String,
    task: RwLock<Task>,
    /// `true` while no worker is running the task.
    idle: watch::Sender<bool>,
    /// Bumped whenever a claimed job is released or the run state flips.
    settled: watch::Sender<u64>,
}

impl TaskEntry {
    fn new(task: Task) -> Self {
        let (idle, _) = watch::channel(true);
        let (settled, _) = watch::channel(0);
        Self {
            id: task.id.clone(),
            task: RwLock::new(task),
            idle,
            settled,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Task> {
        self.task.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, Task> {
        self.task.write().await
    }

    pub async fn snapshot(&self) -> TaskSnapshot {
        self.task.read().await.snapshot()
    }

    pub fn is_idle(&self) -> bool {
        *self.idle.borrow()
    }

    /// Only called with the task's write lock held.
    pub(crate) fn set_idle(&self, idle: bool) {
        self.idle.send_replace(idle);
    }

    /// Resolves once no worker is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.idle.subscribe();
        // the sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|idle| *idle).await;
    }

    pub(crate) fn mark_settled(&self) {
        self.settled.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Resolves once `done` holds, re-checked after every settle.
    pub(crate) async fn wait_until<F>(&self, mut done: F)
    where
        F: FnMut(&Task) -> bool,
    {
        let mut rx = self.settled.subscribe();
        loop {
            if done(&*self.task.read().await) {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Process-wide map of task id to task.
///
/// Cheap to clone; every clone shares the same map.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<String, Arc<TaskEntry>>>>,
    config: RegistryConfig,
}

impl TaskRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// A fresh task identifier.
    pub fn next_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Registers a task under its id.
    pub async fn create(&self, task: Task) -> Arc<TaskEntry> {
        let entry = Arc::new(TaskEntry::new(task));
        self.tasks
            .write()
            .await
            .insert(entry.id.clone(), Arc::clone(&entry));
        debug!("Registered task {}", entry.id);
        entry
    }

    pub async fn get(&self, id: &str) -> Result<Arc<TaskEntry>, RegistryError> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Drops a task. Callers stop its processes first.
    pub async fn remove(&self, id: &str) -> Result<Arc<TaskEntry>, RegistryError> {
        self.tasks
            .write()
            .await
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Summaries of every task, newest first.
    pub async fn list(&self) -> Vec<TaskSummary> {
        let entries = self.entries().await;
        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            summaries.push(entry.read().await.summary());
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    pub async fn entries(&self) -> Vec<Arc<TaskEntry>> {
        self.tasks.read().await.values().cloned().collect()
    }

    /// Evicts finished, idle tasks older than the retention window.
    ///
    /// A task with any non-terminal job is never evicted.
    pub async fn sweep(&self) -> Vec<String> {
        let retention = ChronoDuration::from_std(self.config.retention())
            .unwrap_or_else(|_| ChronoDuration::days(36500));
        let cutoff = Utc::now() - retention;

        let mut expired = Vec::new();
        for entry in self.entries().await {
            if !entry.is_idle() {
                continue;
            }
            let task = entry.read().await;
            let done = task.all_terminal() && task.finished_at.is_some_and(|at| at <= cutoff);
            if done {
                expired.push(entry.id.clone());
            }
        }

        if expired.is_empty() {
            return expired;
        }

        let mut tasks = self.tasks.write().await;
        expired.retain(|id| match tasks.get(id) {
            Some(entry) if entry.is_idle() => {
                tasks.remove(id);
                true
            }
            _ => false,
        });
        drop(tasks);

        for id in &expired {
            info!("Evicted finished task {}", id);
        }
        expired
    }
}
