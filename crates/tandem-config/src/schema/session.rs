//! Session manager and negotiation timing configuration types.

use serde::{Deserialize, Serialize};

/// Start/stop coordination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// How long start/stop/invite wait for the start/stop lock (valid range: 100-60000).
    pub lock_timeout_ms: u64,
    /// How long stop waits for in-flight negotiations to drain (valid range: 100-60000).
    pub drain_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 10_000,
            drain_timeout_ms: 10_000,
        }
    }
}

/// Per-step negotiation timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationSettings {
    /// How long an invitation waits for the invitee to answer (valid range: 1-3600).
    pub acceptance_timeout_secs: u64,
    /// How long any other protocol step waits for the peer (valid range: 1-3600).
    pub response_timeout_secs: u64,
    /// How often a running negotiation checks its progress monitor (valid range: 10-5000).
    pub monitor_poll_ms: u64,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            acceptance_timeout_secs: 60,
            response_timeout_secs: 30,
            monitor_poll_ms: 100,
        }
    }
}
