//! Trait definitions for the converter module.

use async_trait::async_trait;
use std::path::Path;

use super::error::ConverterError;
use super::process::ProcessHandle;
use super::types::{MediaInfo, TranscodeJob};

/// A transcoding engine driven as an external process.
#[async_trait]
pub trait Transcoder: Send + Sync + 'static {
    /// Returns the name of this transcoder implementation.
    fn name(&self) -> &str;

    /// Inspects a source file: category and duration.
    ///
    /// Fails with `UnreadableMedia` when the headers cannot be parsed and
    /// with `Spawn` when the probe tool itself cannot run.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConverterError>;

    /// Launches exactly one transcoding process for `job`.
    ///
    /// Arguments derive deterministically from the job's options. The
    /// returned handle streams diagnostics and reports the exit.
    async fn start(&self, job: &TranscodeJob) -> Result<ProcessHandle, ConverterError>;

    /// Validates that the transcoder is properly configured and ready.
    async fn validate(&self) -> Result<(), ConverterError>;
}
