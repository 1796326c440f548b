//! Access to the files behind shared resource roots.

mod fs;
#[cfg(test)]
mod memory;

pub use fs::FsResourceProvider;
#[cfg(test)]
pub(crate) use memory::MemoryResourceProvider;

use std::collections::BTreeMap;
use std::io;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Root path -> files to share. `None` shares the whole root.
pub type ResourceSelection = BTreeMap<String, Option<Vec<String>>>;

/// Filesystem or IDE collaborator. Roots are addressed by path, files by a
/// `/`-separated path relative to their root. Every call may fail.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn open(&self, root: &str) -> io::Result<()>;

    async fn enumerate(&self, root: &str) -> io::Result<Vec<String>>;

    async fn read(&self, root: &str, path: &str) -> io::Result<Vec<u8>>;

    /// Create or replace a file, creating parent directories and the root
    /// itself when missing.
    async fn write(&self, root: &str, path: &str, content: &[u8]) -> io::Result<()>;

    async fn close(&self, _root: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Lowercase hex SHA-256 of `content`.
pub fn checksum(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Last path component of a root, used as its display name.
pub fn root_name(root: &str) -> String {
    root.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(root)
        .to_string()
}

/// Reject paths that could escape their root.
pub fn validate_relative_path(path: &str) -> io::Result<()> {
    let invalid = |why: &str| {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("rejected path \"{path}\": {why}"),
        ))
    };
    if path.is_empty() {
        return invalid("empty");
    }
    if path.starts_with('/') || path.starts_with('\\') || path.contains(':') {
        return invalid("absolute");
    }
    if path.split(['/', '\\']).any(|part| part == "..") {
        return invalid("parent component");
    }
    Ok(())
}

/// Reject a root name that is not a single plain path component.
pub fn validate_root_name(name: &str) -> io::Result<()> {
    validate_relative_path(name)?;
    if name.contains(['/', '\\']) || name == "." {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("rejected root name \"{name}\": not a single component"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_hex_sha256() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn root_name_takes_last_component() {
        assert_eq!(root_name("/work/parser"), "parser");
        assert_eq!(root_name("parser/"), "parser");
        assert_eq!(root_name("parser"), "parser");
    }

    #[test]
    fn relative_paths_are_validated() {
        assert!(validate_relative_path("src/lib.rs").is_ok());
        assert!(validate_relative_path("a..b/c").is_ok());
        assert!(validate_relative_path("../etc/passwd").is_err());
        assert!(validate_relative_path("src/../../x").is_err());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("C:\\x").is_err());
        assert!(validate_relative_path("").is_err());
    }

    #[test]
    fn root_names_are_single_components() {
        assert!(validate_root_name("parser").is_ok());
        assert!(validate_root_name("my.project").is_ok());
        assert!(validate_root_name("..").is_err());
        assert!(validate_root_name(".").is_err());
        assert!(validate_root_name("/tmp/elsewhere").is_err());
        assert!(validate_root_name("inbox/parser").is_err());
        assert!(validate_root_name("a\\b").is_err());
        assert!(validate_root_name("").is_err());
    }
}
