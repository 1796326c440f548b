//! In-memory resource provider for tests.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{validate_relative_path, ResourceProvider};

#[derive(Default)]
pub(crate) struct MemoryResourceProvider {
    roots: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    fail_open: Mutex<HashSet<String>>,
    open_delay: Mutex<Option<Duration>>,
    closed: Mutex<Vec<String>>,
}

impl MemoryResourceProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_file(self, root: &str, path: &str, content: &[u8]) -> Self {
        self.roots
            .lock()
            .unwrap()
            .entry(root.to_string())
            .or_default()
            .insert(path.to_string(), content.to_vec());
        self
    }

    pub(crate) fn with_root(self, root: &str) -> Self {
        self.roots.lock().unwrap().entry(root.to_string()).or_default();
        self
    }

    /// `open(root)` fails with an I/O error.
    pub(crate) fn fail_open(self, root: &str) -> Self {
        self.fail_open.lock().unwrap().insert(root.to_string());
        self
    }

    /// Every `open` sleeps first.
    pub(crate) fn slow_open(self, delay: Duration) -> Self {
        *self.open_delay.lock().unwrap() = Some(delay);
        self
    }

    pub(crate) fn file(&self, root: &str, path: &str) -> Option<Vec<u8>> {
        self.roots.lock().unwrap().get(root)?.get(path).cloned()
    }

    pub(crate) fn files(&self, root: &str) -> Vec<String> {
        self.roots
            .lock()
            .unwrap()
            .get(root)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

fn not_found(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{what} not found"))
}

#[async_trait]
impl ResourceProvider for MemoryResourceProvider {
    async fn open(&self, root: &str) -> io::Result<()> {
        let delay = *self.open_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_open.lock().unwrap().contains(root) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "cannot open"));
        }
        if self.roots.lock().unwrap().contains_key(root) {
            Ok(())
        } else {
            Err(not_found(root))
        }
    }

    async fn enumerate(&self, root: &str) -> io::Result<Vec<String>> {
        Ok(self
            .roots
            .lock()
            .unwrap()
            .get(root)
            .ok_or_else(|| not_found(root))?
            .keys()
            .cloned()
            .collect())
    }

    async fn read(&self, root: &str, path: &str) -> io::Result<Vec<u8>> {
        self.file(root, path).ok_or_else(|| not_found(path))
    }

    async fn write(&self, root: &str, path: &str, content: &[u8]) -> io::Result<()> {
        validate_relative_path(path)?;
        self.roots
            .lock()
            .unwrap()
            .entry(root.to_string())
            .or_default()
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn close(&self, root: &str) -> io::Result<()> {
        self.closed.lock().unwrap().push(root.to_string());
        Ok(())
    }
}
