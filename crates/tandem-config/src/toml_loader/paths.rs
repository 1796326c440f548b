//! Where `config.toml` lives, and seeding it on first run.

use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tandem_common::ConfigError;

use super::template::default_config_toml;

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "TANDEM_CONFIG";

/// `$TANDEM_CONFIG` if set, otherwise `tandem/config.toml` in the user's
/// config directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    resolve_config_path(std::env::var_os(CONFIG_ENV), dirs::config_dir())
}

fn resolve_config_path(
    overridden: Option<OsString>,
    config_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = overridden.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    config_dir
        .map(|dir| dir.join("tandem").join("config.toml"))
        .ok_or_else(|| {
            ConfigError::ParseError(format!("no user config directory; set {CONFIG_ENV}"))
        })
}

/// Write the commented template to `path`. A file already there is left
/// untouched.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let failed =
        |e: std::io::Error| ConfigError::ParseError(format!("cannot seed {}: {e}", path.display()));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(failed)?;
    }
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => file
            .write_all(default_config_toml().as_bytes())
            .map_err(failed),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(failed(e)),
    }
}
