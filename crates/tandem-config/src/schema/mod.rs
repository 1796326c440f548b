//! Configuration schema types for tandem.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod protocol;
mod session;
mod system;

pub use protocol::*;
pub use session::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for tandem.
///
/// Every option has a default; only override what you want to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct TandemConfig {
    pub session: SessionSettings,
    pub negotiation: NegotiationSettings,
    pub protocol: ProtocolSettings,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
