//! Shared range-validation helpers used by all domain validators.

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error if `value` is not a `major.minor[.patch]` version string.
pub(crate) fn validate_version(errors: &mut Vec<String>, name: &str, value: &str) {
    let parts: Vec<&str> = value.split('.').collect();
    let well_formed = (2..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    if !well_formed {
        errors.push(format!("{name} = \"{value}\" is not a valid version"));
    }
}
