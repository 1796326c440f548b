//! Value types describing session membership and shared roots.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tandem_common::{PeerId, ResourceRootId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub peer: PeerId,
    pub permission: Permission,
    pub is_host: bool,
}

/// A resource root known to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedRoot {
    pub id: ResourceRootId,
    pub owner: PeerId,
    /// Root path on the owner's side for local roots, local target path for
    /// roots received from a peer.
    pub path: String,
    /// `None` once the root is completely shared.
    pub files: Option<BTreeSet<String>>,
}

impl SharedRoot {
    pub fn is_complete(&self) -> bool {
        self.files.is_none()
    }
}

/// What `share_root` changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    /// The root was not shared before.
    Added,
    /// A partially shared root grew. `None` means it is now complete,
    /// otherwise the newly added files.
    Extended(Option<Vec<String>>),
    /// Nothing new to share.
    Unchanged,
}
