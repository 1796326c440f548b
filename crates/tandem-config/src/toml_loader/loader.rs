//! Reading `config.toml` into a [`TandemConfig`].

use crate::schema::TandemConfig;
use std::io::ErrorKind;
use std::path::Path;
use tandem_common::ConfigError;
use tracing::{debug, info};

use super::paths::{create_default_config, default_config_path};

/// Parse the config at `path`. Sections and keys absent from the file keep
/// their defaults. Range checks are left to [`crate::validation`].
pub fn load_from_path(path: &Path) -> Result<TandemConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };

    let config: TandemConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;

    debug!(path = %path.display(), version = %config.protocol.version, "Config parsed");
    Ok(config)
}

/// Load the config at [`default_config_path`], writing the commented
/// template there first on a fresh install.
pub fn load_default() -> Result<TandemConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            create_default_config(&path)?;
            info!(path = %path.display(), "Wrote default config");
            Ok(TandemConfig::default())
        }
        loaded => loaded,
    }
}
