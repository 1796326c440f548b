//! Protocol version and compatibility table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Local protocol version and the remote versions it can talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Version announced in invitations, `major.minor[.patch]`.
    pub version: String,
    /// Local version -> remote versions known to interoperate with it.
    pub compatibility: BTreeMap<String, Vec<String>>,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        let mut compatibility = BTreeMap::new();
        compatibility.insert("2.0".to_string(), vec!["2.0".to_string()]);
        Self {
            version: "2.0".into(),
            compatibility,
        }
    }
}
