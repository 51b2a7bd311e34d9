//! File system backed catalog.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::types::{
    CatalogError, ConflictStrategy, FileInfo, FileSource, StorageConfig, UploadOutcome,
};
use crate::converter::{MediaCategory, OutputFormat};

/// Resolves, lists and stores media files under the three source roots.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    config: StorageConfig,
}

impl FileCatalog {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Root directory of a source.
    pub fn root(&self, source: FileSource) -> &Path {
        match source {
            FileSource::Upload => &self.config.upload_dir,
            FileSource::Local => &self.config.local_dir,
            FileSource::Output => &self.config.output_dir,
        }
    }

    /// Creates the source roots if missing.
    pub async fn ensure_dirs(&self) -> Result<(), CatalogError> {
        for source in [FileSource::Upload, FileSource::Local, FileSource::Output] {
            fs::create_dir_all(self.root(source)).await?;
        }
        Ok(())
    }

    /// Resolves a relative name to an existing file inside the source root.
    ///
    /// Rejects absolute names, `..` components and symlinks escaping the root.
    pub async fn resolve(&self, source: FileSource, name: &str) -> Result<PathBuf, CatalogError> {
        let relative = sanitize_relative(name)?;
        let root = self.root(source);
        let candidate = root.join(&relative);

        let resolved = match fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CatalogError::NotFound {
                    path: format!("{}/{}", source, name),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let root = fs::canonicalize(root).await?;
        if !resolved.starts_with(&root) {
            return Err(CatalogError::invalid(name, "path escapes the source directory"));
        }

        let meta = fs::metadata(&resolved).await?;
        if !meta.is_file() {
            return Err(CatalogError::NotFound {
                path: format!("{}/{}", source, name),
            });
        }
        Ok(resolved)
    }

    /// Final output location: source subdirectories kept, extension replaced.
    pub fn output_path(&self, name: &str, format: OutputFormat) -> Result<PathBuf, CatalogError> {
        let relative = sanitize_relative(name)?;
        Ok(self
            .config
            .output_dir
            .join(relative.with_extension(format.extension())))
    }

    /// Lists supported media files of a source, sorted by name.
    pub async fn list(&self, source: FileSource) -> Result<Vec<FileInfo>, CatalogError> {
        let root = self.root(source);
        if fs::metadata(root).await.is_err() {
            fs::create_dir_all(root).await?;
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let name = entry.file_name();
                // hidden entries include in-flight staging files
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }

                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if source.is_recursive() {
                        pending.push(path);
                    }
                    continue;
                }

                let Some(media_type) = MediaCategory::from_path(&path) else {
                    continue;
                };
                let meta = entry.metadata().await?;
                if !meta.is_file() {
                    continue;
                }

                let relative = path.strip_prefix(root).unwrap_or(&path);
                files.push(FileInfo {
                    filename: to_slash(relative),
                    size: meta.len(),
                    media_type: Some(media_type),
                    last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                    path,
                });
            }
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        debug!(source = %source, count = files.len(), "Listed files");
        Ok(files)
    }

    /// Stores an uploaded file in the upload root.
    pub async fn save_upload(
        &self,
        filename: &str,
        content: &[u8],
        strategy: ConflictStrategy,
    ) -> Result<UploadOutcome, CatalogError> {
        let name = upload_name(filename)?;

        let size = content.len() as u64;
        if size > self.config.max_upload_bytes {
            return Err(CatalogError::TooLarge {
                size,
                limit: self.config.max_upload_bytes,
            });
        }

        if MediaCategory::from_path(Path::new(&name)).is_none() {
            return Err(CatalogError::invalid(&name, "unsupported file format"));
        }

        fs::create_dir_all(&self.config.upload_dir).await?;
        let Some(target) = resolve_conflict(self.config.upload_dir.join(&name), strategy).await
        else {
            info!(filename = %name, "Upload skipped, file exists");
            return Ok(UploadOutcome {
                success: false,
                filename: name,
                message: "Skipped, a file with the same name exists".to_string(),
            });
        };

        fs::write(&target, content).await?;
        let stored = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(name);
        info!(filename = %stored, size, ?strategy, "Upload stored");

        Ok(UploadOutcome {
            success: true,
            filename: stored,
            message: "Upload complete".to_string(),
        })
    }

    /// Deletes one file from a source.
    pub async fn delete(&self, source: FileSource, name: &str) -> Result<(), CatalogError> {
        let path = self.resolve(source, name).await?;
        fs::remove_file(&path).await?;
        info!(source = %source, filename = %name, "File deleted");
        Ok(())
    }
}

/// Hidden staging file next to `final_path`, unique per task and job index.
pub fn staging_path(final_path: &Path, task_id: &str, index: usize) -> PathBuf {
    let stem = final_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = final_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let task8: String = task_id.chars().filter(|c| *c != '-').take(8).collect();
    let name = format!(".{}.{}-{}.partial.{}", stem, task8, index, ext);
    match final_path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Removes a partial artifact; missing files are fine.
pub async fn discard_partial(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Discarded partial output");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to discard partial output");
            Err(e)
        }
    }
}

/// Moves a finished staging file to its final path and returns its size.
pub async fn promote(staging: &Path, final_path: &Path) -> io::Result<u64> {
    fs::rename(staging, final_path).await?;
    Ok(fs::metadata(final_path).await?.len())
}

fn sanitize_relative(name: &str) -> Result<PathBuf, CatalogError> {
    let normalized = name.replace('\\', "/");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::invalid(name, "empty file name"));
    }

    let mut relative = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return Err(CatalogError::invalid(name, "path must stay inside its directory")),
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(CatalogError::invalid(name, "empty file name"));
    }
    Ok(relative)
}

fn upload_name(filename: &str) -> Result<String, CatalogError> {
    let relative = sanitize_relative(filename)?;
    if relative.components().count() != 1 {
        return Err(CatalogError::invalid(filename, "uploads cannot contain directories"));
    }
    Ok(relative.to_string_lossy().into_owned())
}

async fn resolve_conflict(path: PathBuf, strategy: ConflictStrategy) -> Option<PathBuf> {
    if !fs::try_exists(&path).await.unwrap_or(false) {
        return Some(path);
    }

    match strategy {
        ConflictStrategy::Overwrite => Some(path),
        ConflictStrategy::Skip => None,
        ConflictStrategy::Rename => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let suffix = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

            let mut counter = 1u32;
            loop {
                let candidate = parent.join(format!("{}{}{}", stem, counter, suffix));
                if !fs::try_exists(&candidate).await.unwrap_or(false) {
                    return Some(candidate);
                }
                counter += 1;
            }
        }
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
