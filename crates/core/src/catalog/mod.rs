//! File Catalog: the upload, local and output directories.
//!
//! Resolves source names to readable paths, decides where outputs land and
//! handles uploads. Names are always relative to a source root and never
//! escape it.

mod fs;
mod types;

pub use fs::{discard_partial, promote, staging_path, FileCatalog};
pub use types::*;
