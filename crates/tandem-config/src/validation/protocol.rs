//! Validation for the protocol version and compatibility table.

use crate::schema::TandemConfig;

use super::helpers::validate_version;

/// Every version mentioned anywhere must parse; the local version must have
/// a compatibility entry.
pub(crate) fn validate_protocol(errors: &mut Vec<String>, config: &TandemConfig) {
    let protocol = &config.protocol;
    validate_version(errors, "protocol.version", &protocol.version);

    for (local, remotes) in &protocol.compatibility {
        validate_version(errors, "protocol.compatibility key", local);
        for remote in remotes {
            validate_version(
                errors,
                &format!("protocol.compatibility.\"{local}\""),
                remote,
            );
        }
    }

    if !protocol.compatibility.contains_key(&protocol.version) {
        errors.push(format!(
            "protocol.compatibility has no entry for local version \"{}\"",
            protocol.version
        ));
    }
}
