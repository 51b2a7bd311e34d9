//! Types for the task orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogError, FileSource};
use crate::converter::{ConversionOptions, ConverterError, OutputFormat};
use crate::registry::RegistryError;

/// Errors surfaced by orchestrator operations.
///
/// File-level failures never show up here; they are recorded on the job.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Request rejected before any task was created.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl OrchestratorError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    /// Stable identifier for API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Catalog(CatalogError::NotFound { .. }) => "not_found",
            Self::Catalog(CatalogError::InvalidName { .. } | CatalogError::TooLarge { .. }) => {
                "validation_error"
            }
            Self::Catalog(CatalogError::Io(_)) => "io_error",
        }
    }
}

impl From<RegistryError> for OrchestratorError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => Self::NotFound(id),
        }
    }
}

impl From<ConverterError> for OrchestratorError {
    fn from(err: ConverterError) -> Self {
        match err {
            ConverterError::Validation { reason } => Self::Validation(reason),
            other => Self::Validation(other.to_string()),
        }
    }
}

/// A batch conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Names relative to the source root, in processing order.
    pub files: Vec<String>,
    #[serde(default = "default_source")]
    pub source: FileSource,
    pub output_format: OutputFormat,
    #[serde(default)]
    pub options: ConversionOptions,
}

fn default_source() -> FileSource {
    FileSource::Upload
}

impl ConversionRequest {
    pub fn new(files: Vec<String>, source: FileSource, output_format: OutputFormat) -> Self {
        Self {
            files,
            source,
            output_format,
            options: ConversionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialize_defaults() {
        let json = r#"{ "files": ["a.wav"], "output_format": "mp3" }"#;
        let request: ConversionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.source, FileSource::Upload);
        assert_eq!(request.output_format, OutputFormat::Mp3);
        assert_eq!(request.options, ConversionOptions::default());
    }

    #[test]
    fn test_request_rejects_unknown_option() {
        let json = r#"{ "files": ["a.wav"], "output_format": "mp3", "options": { "colour": 1 } }"#;
        assert!(serde_json::from_str::<ConversionRequest>(json).is_err());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            OrchestratorError::validation("mixed").kind(),
            "validation_error"
        );
        let err: OrchestratorError = RegistryError::NotFound("t".into()).into();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.to_string(), "Task not found: t");

        let err: OrchestratorError = CatalogError::NotFound {
            path: "upload/a.wav".into(),
        }
        .into();
        assert_eq!(err.kind(), "not_found");
    }
}
