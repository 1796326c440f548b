//! On-disk settings for tandem.
//!
//! One `config.toml` with `[session]`, `[negotiation]`, `[protocol]` and
//! `[logging]` tables. Anything missing falls back to its default, so an
//! empty file is a valid config.
//!
//! ```rust,no_run
//! let config = tandem_config::load_config().expect("config");
//! assert!(config.negotiation.acceptance_timeout_secs > 0);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    LogLevel, LoggingConfig, NegotiationSettings, ProtocolSettings, SessionSettings,
    TandemConfig, CONFIG_SCHEMA_VERSION,
};
pub use toml_loader::{default_config_path, load_from_path, CONFIG_ENV};

use tandem_common::ConfigError;

/// Load, seeding on first run, and validate the config at
/// [`default_config_path`].
pub fn load_config() -> Result<TandemConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load and validate config from an explicit path.
pub fn load_config_from(path: &std::path::Path) -> Result<TandemConfig, ConfigError> {
    let config = toml_loader::load_from_path(path)?;
    validation::validate(&config)?;
    Ok(config)
}

/// The effective config as indented JSON, for logging and diagnostics.
pub fn config_to_json(config: &TandemConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let config = TandemConfig::default();
        let json = config_to_json(&config);
        assert!(json.contains("\"session\""));
        assert!(json.contains("\"negotiation\""));
        assert!(json.contains("\"protocol\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = TandemConfig::default();
        let json = config_to_json(&config);
        let parsed: TandemConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.protocol.version, "2.0");
        assert_eq!(parsed.session.lock_timeout_ms, 10_000);
    }

    #[test]
    fn load_config_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session]\nlock_timeout_ms = 1\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
