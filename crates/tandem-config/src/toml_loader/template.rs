//! The commented `config.toml` written on first run.

/// Every setting at its default, each with a comment on what it governs.
pub(crate) fn default_config_toml() -> String {
    r##"# tandem configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[session]
# lock_timeout_ms = 10000       # 100-60000, wait for the start/stop lock
# drain_timeout_ms = 10000      # 100-60000, wait for negotiations on stop

[negotiation]
# acceptance_timeout_secs = 60  # 1-3600
# response_timeout_secs = 30    # 1-3600
# monitor_poll_ms = 100         # 10-5000

[protocol]
version = "2.0"

[protocol.compatibility]
"2.0" = ["2.0"]

[logging]
# level = "info"                # trace, debug, info, warn, error
"##
    .to_string()
}
