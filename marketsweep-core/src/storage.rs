use crate::error::{ImportError, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Destination for downloaded listing images.
pub trait BlobStore {
    /// Stores `bytes` under the relative `path` and returns the stored path.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<String>;
}

/// Blob store rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(ImportError::InvalidInput(format!(
                "blob path must be relative and stay inside the store: '{}'",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<String> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, bytes)?;

        debug!(path, size = bytes.len(), "Stored blob");
        Ok(path.to_string())
    }
}
