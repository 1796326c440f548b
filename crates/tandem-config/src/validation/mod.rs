//! Full configuration validation.
//!
//! Validates numeric ranges and the protocol table. Each domain has its own
//! submodule; this orchestrator calls them all and collects errors into a
//! single `ConfigError`.

mod helpers;
mod limits;
mod protocol;

#[cfg(test)]
mod tests;

use crate::schema::TandemConfig;
use tandem_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &TandemConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    limits::validate_session(&mut errors, config);
    limits::validate_negotiation(&mut errors, config);
    protocol::validate_protocol(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
