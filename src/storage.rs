//! Resolution of uploaded import files on local disk.
//!
//! Jobs reference their source file by a path relative to a storage base
//! directory, configured with `IMPORT_STORAGE_PATH`. Resolution refuses
//! parent-directory components so a job record cannot point outside the
//! storage root.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

const STORAGE_PATH_ENV: &str = "IMPORT_STORAGE_PATH";
const DEFAULT_STORAGE_PATH: &str = "./storage";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid file path `{0}`: parent traversal is not allowed")]
    Traversal(String),
    #[error("file not found: {0}")]
    Missing(String),
}

/// Locates import files under a fixed base directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base: PathBuf,
}

impl FileStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Build from `IMPORT_STORAGE_PATH`, defaulting to `./storage`.
    pub fn from_env() -> Self {
        let base = std::env::var(STORAGE_PATH_ENV)
            .unwrap_or_else(|_| DEFAULT_STORAGE_PATH.to_string());
        Self::new(base)
    }

    /// Resolve a stored relative path against the base directory.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let relative_path = Path::new(relative);
        if relative_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(StorageError::Traversal(relative.to_string()));
        }
        Ok(self.base.join(relative_path))
    }

    /// Resolve and require that the file exists.
    pub fn resolve_existing(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let path = self.resolve(relative)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(StorageError::Missing(relative.to_string()))
        }
    }
}
