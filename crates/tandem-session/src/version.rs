//! Protocol versions and the compatibility table consulted during
//! session negotiation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tandem_common::TandemError;

/// A `major.minor[.patch]` protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProtocolVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = TandemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TandemError::Protocol(format!("invalid protocol version \"{s}\""));
        let parts: Vec<&str> = s.trim().split('.').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(invalid());
        }
        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = TandemError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ProtocolVersion> for String {
    fn from(v: ProtocolVersion) -> Self {
        v.to_string()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

/// Result of comparing a remote version against the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Ok,
    /// The remote side runs an older, unsupported version.
    TooOld,
    /// The remote side runs a newer, unsupported version.
    TooNew,
}

/// Local version -> remote versions known to interoperate with it.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityTable {
    entries: HashMap<ProtocolVersion, Vec<ProtocolVersion>>,
}

impl CompatibilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, local: ProtocolVersion, remotes: Vec<ProtocolVersion>) -> Self {
        self.entries.insert(local, remotes);
        self
    }

    /// Build the table from its textual configuration form.
    pub fn from_strings(table: &BTreeMap<String, Vec<String>>) -> Result<Self, TandemError> {
        let mut entries = HashMap::new();
        for (local, remotes) in table {
            let remotes = remotes
                .iter()
                .map(|r| r.parse())
                .collect::<Result<Vec<ProtocolVersion>, _>>()?;
            entries.insert(local.parse()?, remotes);
        }
        Ok(Self { entries })
    }

    /// Identical versions always interoperate. Otherwise the remote must be
    /// listed for the local version, or it is classified by ordering.
    pub fn determine(&self, local: ProtocolVersion, remote: ProtocolVersion) -> Compatibility {
        if local == remote {
            return Compatibility::Ok;
        }
        let listed = self
            .entries
            .get(&local)
            .is_some_and(|remotes| remotes.contains(&remote));
        if listed {
            Compatibility::Ok
        } else if remote < local {
            Compatibility::TooOld
        } else {
            Compatibility::TooNew
        }
    }
}

/// Classify `remote` against `local` using `table`.
pub fn determine_compatibility(
    local: ProtocolVersion,
    remote: ProtocolVersion,
    table: &CompatibilityTable,
) -> Compatibility {
    table.determine(local, remote)
}
