//! Resource roots backed by directories on disk.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{validate_relative_path, ResourceProvider};

/// Roots are directories under `base`; a relative root path is resolved
/// against it, an absolute one is used as is.
#[derive(Debug, Clone)]
pub struct FsResourceProvider {
    base: PathBuf,
}

impl FsResourceProvider {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn root_dir(&self, root: &str) -> PathBuf {
        self.base.join(root)
    }

    fn file_path(&self, root: &str, path: &str) -> io::Result<PathBuf> {
        validate_relative_path(path)?;
        let mut full = self.root_dir(root);
        full.extend(path.split('/').filter(|part| !part.is_empty() && *part != "."));
        Ok(full)
    }
}

#[async_trait]
impl ResourceProvider for FsResourceProvider {
    async fn open(&self, root: &str) -> io::Result<()> {
        let dir = self.root_dir(root);
        let meta = tokio::fs::metadata(&dir).await?;
        if !meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", dir.display()),
            ));
        }
        Ok(())
    }

    async fn enumerate(&self, root: &str) -> io::Result<Vec<String>> {
        let dir = self.root_dir(root);
        let mut files = Vec::new();
        let mut pending = vec![(dir, String::new())];
        while let Some((current, prefix)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let relative = if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}/{name}")
                };
                let kind = entry.file_type().await?;
                if kind.is_dir() {
                    pending.push((entry.path(), relative));
                } else if kind.is_file() {
                    files.push(relative);
                }
            }
        }
        files.sort();
        debug!(root, count = files.len(), "Enumerated resource root");
        Ok(files)
    }

    async fn read(&self, root: &str, path: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.file_path(root, path)?).await
    }

    async fn write(&self, root: &str, path: &str, content: &[u8]) -> io::Result<()> {
        let full = self.file_path(root, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await
    }
}
