//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while probing or transcoding a single file.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// Options or format pairing rejected before any process starts.
    #[error("Invalid conversion options: {reason}")]
    Validation { reason: String },

    /// The engine could not parse the container or codec headers.
    #[error("Unreadable media {path}: {reason}")]
    UnreadableMedia { path: PathBuf, reason: String },

    /// The engine binary is missing or could not be started.
    #[error("Failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The engine exited with a non-zero status.
    #[error("Encoder exited with code {}: {}", fmt_code(.code), .diagnostic_tail)]
    Encode {
        code: Option<i32>,
        diagnostic_tail: String,
    },

    /// A stop was requested before the process exited on its own.
    #[error("Conversion terminated")]
    Terminated,

    /// I/O error around the conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl ConverterError {
    /// Creates a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Creates an unreadable media error.
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnreadableMedia {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a spawn error.
    pub fn spawn(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is the expected outcome of a stop request.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Short machine-readable kind, used in logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::UnreadableMedia { .. } => "unreadable_media",
            Self::Spawn { .. } => "spawn_error",
            Self::Encode { .. } => "encode_error",
            Self::Terminated => "terminated",
            Self::Io(_) => "io_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_error_display() {
        let err = ConverterError::Encode {
            code: Some(1),
            diagnostic_tail: "Unknown encoder 'libfoo'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Encoder exited with code 1: Unknown encoder 'libfoo'"
        );

        let err = ConverterError::Encode {
            code: None,
            diagnostic_tail: String::new(),
        };
        assert!(err.to_string().contains("signal"));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(ConverterError::validation("x").kind(), "validation_error");
        assert_eq!(ConverterError::spawn("ffmpeg", "missing").kind(), "spawn_error");
        assert!(ConverterError::Terminated.is_terminated());
        assert!(!ConverterError::unreadable("/a.mp3", "bad").is_terminated());
    }
}
