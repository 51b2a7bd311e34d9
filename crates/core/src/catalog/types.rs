use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::converter::MediaCategory;

/// Where a source file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSource {
    Upload,
    Local,
    Output,
}

impl FileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Local => "local",
            Self::Output => "output",
        }
    }

    /// Whether listings descend into subdirectories.
    pub fn is_recursive(&self) -> bool {
        !matches!(self, Self::Upload)
    }
}

impl fmt::Display for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileSource {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upload" => Ok(Self::Upload),
            "local" => Ok(Self::Local),
            "output" => Ok(Self::Output),
            _ => Err(CatalogError::InvalidName {
                name: s.to_string(),
                reason: "unknown file source".to_string(),
            }),
        }
    }
}

/// Storage directories and upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("localfiles")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            local_dir: default_local_dir(),
            output_dir: default_output_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl StorageConfig {
    /// All three directories under one base, as used by tests.
    pub fn under(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            upload_dir: base.join("uploads"),
            local_dir: base.join("localfiles"),
            output_dir: base.join("outputs"),
            ..Default::default()
        }
    }
}

/// A listed media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// Path relative to the source root, `/`-separated.
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub media_type: Option<MediaCategory>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// What to do when an upload collides with an existing file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    #[default]
    Overwrite,
    /// Append a counter to the stem: `song.mp3` -> `song1.mp3`.
    Rename,
    Skip,
}

/// Result of an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub success: bool,
    /// Final stored name, which differs from the request under `rename`.
    pub filename: String,
    pub message: String,
}

/// Errors from the file catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("Invalid file name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
