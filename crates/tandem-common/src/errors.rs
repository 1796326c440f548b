use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller drove the session state machine into an impossible
    /// transition (e.g. stopping while the same task is starting).
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("session.lock_timeout_ms = 0".into());
        assert_eq!(
            err.to_string(),
            "config validation error: session.lock_timeout_ms = 0"
        );
    }

    #[test]
    fn tandem_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: TandemError = config_err.into();
        assert!(matches!(err, TandemError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn tandem_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: TandemError = io_err.into();
        assert!(matches!(err, TandemError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn tandem_error_other_variants() {
        let err = TandemError::Transport("peer unreachable".into());
        assert_eq!(err.to_string(), "transport error: peer unreachable");

        let err = TandemError::Protocol("unexpected message".into());
        assert_eq!(err.to_string(), "protocol error: unexpected message");

        let err = TandemError::IllegalState("stop while starting".into());
        assert_eq!(err.to_string(), "illegal state: stop while starting");

        let err = TandemError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
