//! Testing utilities and mock implementations.
//!
//! [`MockTranscoder`] stands in for ffmpeg so the orchestrator can be
//! exercised end to end without external binaries.
//!
//! # Example
//!
//! ```rust,ignore
//! use avcnv_core::testing::{fixtures, MockTranscoder};
//!
//! let dir = tempfile::TempDir::new()?;
//! let env = fixtures::TestEnv::new(dir.path()).await?;
//! env.add_upload("a.wav").await?;
//! let orchestrator = env.orchestrator(MockTranscoder::new());
//! ```

mod mock_transcoder;

pub use mock_transcoder::{MockOutcome, MockScript, MockTranscoder};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::catalog::{CatalogError, FileCatalog, FileSource, StorageConfig};
    use crate::converter::Transcoder;
    use crate::orchestrator::{OrchestratorConfig, TaskOrchestrator};
    use crate::registry::{RegistryConfig, TaskRegistry, TaskSnapshot};

    /// Storage directories under a scratch base directory.
    pub struct TestEnv {
        pub catalog: Arc<FileCatalog>,
    }

    impl TestEnv {
        pub async fn new(base: &Path) -> Result<Self, CatalogError> {
            let catalog = Arc::new(FileCatalog::new(StorageConfig::under(base)));
            catalog.ensure_dirs().await?;
            Ok(Self { catalog })
        }

        /// Writes a small source file and returns its path.
        pub async fn add_file(&self, source: FileSource, name: &str) -> io::Result<PathBuf> {
            let path = self.catalog.root(source).join(name);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, b"source media").await?;
            Ok(path)
        }

        pub async fn add_upload(&self, name: &str) -> io::Result<PathBuf> {
            self.add_file(FileSource::Upload, name).await
        }

        pub fn output_dir(&self) -> PathBuf {
            self.catalog.config().output_dir.clone()
        }

        pub fn orchestrator<T: Transcoder>(&self, transcoder: T) -> TaskOrchestrator<T> {
            self.orchestrator_with(Arc::new(transcoder), OrchestratorConfig::default())
        }

        pub fn orchestrator_with<T: Transcoder>(
            &self,
            transcoder: Arc<T>,
            config: OrchestratorConfig,
        ) -> TaskOrchestrator<T> {
            TaskOrchestrator::new(
                config,
                transcoder,
                Arc::clone(&self.catalog),
                TaskRegistry::new(RegistryConfig::default()),
            )
        }
    }

    /// Polls a task until `done` holds, panicking after `timeout`.
    pub async fn wait_for<T, F>(
        orchestrator: &TaskOrchestrator<T>,
        task_id: &str,
        timeout: Duration,
        mut done: F,
    ) -> TaskSnapshot
    where
        T: Transcoder,
        F: FnMut(&TaskSnapshot) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let snapshot = match orchestrator.status(task_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => panic!("task {} unavailable: {}", task_id, e),
            };
            if done(&snapshot) {
                return snapshot;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting on task {}: {:?}", task_id, snapshot);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
