//! The live collaboration context.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tandem_common::{PeerId, ResourceRootId, SessionId};
use tracing::debug;

use super::types::{Participant, Permission, ShareOutcome, SharedRoot};
use crate::protocol::ParticipantInfo;

/// Participants and shared roots of one session.
///
/// Exactly one participant is the host and can never be removed. Mutations
/// go through short critical sections so the session can be shared between
/// the manager and running negotiations.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    host: PeerId,
    local: PeerId,
    participants: RwLock<BTreeMap<PeerId, Participant>>,
    roots: RwLock<BTreeMap<ResourceRootId, SharedRoot>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Session {
    /// A new session hosted by `local`, who is its only participant.
    pub fn hosted(id: SessionId, local: PeerId) -> Self {
        let mut participants = BTreeMap::new();
        participants.insert(
            local.clone(),
            Participant {
                peer: local.clone(),
                permission: Permission::ReadWrite,
                is_host: true,
            },
        );
        Self {
            id,
            host: local.clone(),
            local,
            participants: RwLock::new(participants),
            roots: RwLock::new(BTreeMap::new()),
        }
    }

    /// The local view of a session hosted by someone else. `known` is the
    /// participant list sent by the host; the host and the local peer are
    /// added when missing.
    pub fn joined(id: SessionId, host: PeerId, local: PeerId, known: &[ParticipantInfo]) -> Self {
        let mut participants: BTreeMap<PeerId, Participant> = known
            .iter()
            .map(|info| {
                (
                    info.peer.clone(),
                    Participant {
                        peer: info.peer.clone(),
                        permission: info.permission,
                        is_host: info.peer == host,
                    },
                )
            })
            .collect();
        participants
            .entry(host.clone())
            .or_insert_with(|| Participant {
                peer: host.clone(),
                permission: Permission::ReadWrite,
                is_host: true,
            });
        participants
            .entry(local.clone())
            .or_insert_with(|| Participant {
                peer: local.clone(),
                permission: Permission::ReadOnly,
                is_host: false,
            });
        Self {
            id,
            host,
            local,
            participants: RwLock::new(participants),
            roots: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn host(&self) -> &PeerId {
        &self.host
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    /// True when the local peer hosts this session.
    pub fn is_host(&self) -> bool {
        self.local == self.host
    }

    // -- participants --

    pub fn is_participant(&self, peer: &PeerId) -> bool {
        read(&self.participants).contains_key(peer)
    }

    pub fn participant(&self, peer: &PeerId) -> Option<Participant> {
        read(&self.participants).get(peer).cloned()
    }

    pub fn participants(&self) -> Vec<Participant> {
        read(&self.participants).values().cloned().collect()
    }

    /// Everyone except the local peer.
    pub fn remote_participants(&self) -> Vec<PeerId> {
        read(&self.participants)
            .keys()
            .filter(|peer| **peer != self.local)
            .cloned()
            .collect()
    }

    pub fn participant_infos(&self) -> Vec<ParticipantInfo> {
        read(&self.participants)
            .values()
            .map(|p| ParticipantInfo {
                peer: p.peer.clone(),
                permission: p.permission,
                host: p.is_host,
            })
            .collect()
    }

    /// Adds `peer` unless already present. Returns whether it was added.
    pub fn add_participant(&self, peer: PeerId, permission: Permission) -> bool {
        let mut participants = write(&self.participants);
        if participants.contains_key(&peer) {
            return false;
        }
        debug!(session_id = %self.id, peer = %peer, ?permission, "Participant added");
        participants.insert(
            peer.clone(),
            Participant {
                peer,
                permission,
                is_host: false,
            },
        );
        true
    }

    /// Removes a non-host participant.
    pub fn remove_participant(&self, peer: &PeerId) -> bool {
        if *peer == self.host {
            return false;
        }
        let removed = write(&self.participants).remove(peer).is_some();
        if removed {
            debug!(session_id = %self.id, peer = %peer, "Participant removed");
        }
        removed
    }

    pub fn permission(&self, peer: &PeerId) -> Option<Permission> {
        read(&self.participants).get(peer).map(|p| p.permission)
    }

    pub fn set_permission(&self, peer: &PeerId, permission: Permission) -> bool {
        match write(&self.participants).get_mut(peer) {
            Some(participant) => {
                participant.permission = permission;
                true
            }
            None => false,
        }
    }

    pub fn has_write_access(&self, peer: &PeerId) -> bool {
        self.permission(peer) == Some(Permission::ReadWrite)
    }

    // -- shared roots --

    /// Mark a root (or more of its files) as shared.
    ///
    /// The whole check-and-update runs under one write lock, so two callers
    /// sharing the same root cannot both see it as new. A root that is
    /// already completely shared is never offered again.
    pub fn share_root(
        &self,
        id: ResourceRootId,
        owner: PeerId,
        path: &str,
        files: Option<Vec<String>>,
    ) -> ShareOutcome {
        let mut roots = write(&self.roots);
        let Some(existing) = roots.get_mut(&id) else {
            roots.insert(
                id.clone(),
                SharedRoot {
                    id,
                    owner,
                    path: path.to_string(),
                    files: files.map(|f| f.into_iter().collect()),
                },
            );
            return ShareOutcome::Added;
        };

        let Some(shared) = existing.files.as_mut() else {
            return ShareOutcome::Unchanged;
        };
        match files {
            None => {
                existing.files = None;
                ShareOutcome::Extended(None)
            }
            Some(files) => {
                let added: Vec<String> = files
                    .into_iter()
                    .filter(|file| shared.insert(file.clone()))
                    .collect();
                if added.is_empty() {
                    ShareOutcome::Unchanged
                } else {
                    ShareOutcome::Extended(Some(added))
                }
            }
        }
    }

    pub fn root(&self, id: &ResourceRootId) -> Option<SharedRoot> {
        read(&self.roots).get(id).cloned()
    }

    pub fn roots(&self) -> Vec<SharedRoot> {
        read(&self.roots).values().cloned().collect()
    }

    /// The root `owner` shares from `path`, if any.
    pub fn root_by_path(&self, owner: &PeerId, path: &str) -> Option<SharedRoot> {
        read(&self.roots)
            .values()
            .find(|root| root.owner == *owner && root.path == path)
            .cloned()
    }

    pub fn roots_owned_by(&self, owner: &PeerId) -> Vec<SharedRoot> {
        read(&self.roots)
            .values()
            .filter(|root| root.owner == *owner)
            .cloned()
            .collect()
    }
}
