//! Bookkeeping for in-flight negotiations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tandem_common::{NegotiationId, PeerId};
use tokio::sync::Notify;
use tokio::time::Instant;

use super::handle::NegotiationHandle;
use super::{Direction, NegotiationKind, NegotiationRecord};

struct Entry {
    peer: PeerId,
    kind: NegotiationKind,
    direction: Direction,
    handle: Weak<NegotiationHandle>,
}

/// Tracks running negotiations by id without owning them.
///
/// Has its own lock, separate from the session manager's start/stop lock.
/// Strong references produced by lookups are only ever dropped after the
/// lock is released, since dropping the last one re-enters `remove`.
#[derive(Default)]
pub struct NegotiationRegistry {
    entries: Mutex<HashMap<NegotiationId, Entry>>,
    drained: Notify,
}

impl NegotiationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NegotiationId, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn add(&self, handle: &Arc<NegotiationHandle>) {
        self.lock().insert(
            handle.id().clone(),
            Entry {
                peer: handle.peer().clone(),
                kind: handle.kind(),
                direction: handle.direction(),
                handle: Arc::downgrade(handle),
            },
        );
    }

    pub(crate) fn remove(&self, id: &NegotiationId) -> bool {
        let (removed, empty) = {
            let mut entries = self.lock();
            let removed = entries.remove(id).is_some();
            (removed, entries.is_empty())
        };
        if removed && empty {
            self.drained.notify_waiters();
        }
        removed
    }

    pub fn get(&self, id: &NegotiationId) -> Option<Arc<NegotiationHandle>> {
        self.lock().get(id).and_then(|entry| entry.handle.upgrade())
    }

    /// True if a negotiation of `kind` with `peer` is tracked.
    pub fn exists_for_peer(&self, peer: &PeerId, kind: NegotiationKind) -> bool {
        self.lock()
            .values()
            .any(|entry| entry.peer == *peer && entry.kind == kind)
    }

    /// True if any negotiation of `kind` in `direction` is tracked.
    pub fn contains(&self, kind: NegotiationKind, direction: Direction) -> bool {
        self.lock()
            .values()
            .any(|entry| entry.kind == kind && entry.direction == direction)
    }

    /// Snapshot of every live negotiation.
    pub fn list(&self) -> Vec<Arc<NegotiationHandle>> {
        self.lock()
            .values()
            .filter_map(|entry| entry.handle.upgrade())
            .collect()
    }

    pub fn list_for_peer(&self, peer: &PeerId) -> Vec<Arc<NegotiationHandle>> {
        self.lock()
            .values()
            .filter(|entry| entry.peer == *peer)
            .filter_map(|entry| entry.handle.upgrade())
            .collect()
    }

    pub fn records(&self) -> Vec<NegotiationRecord> {
        self.list().iter().map(|handle| handle.record()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait until no negotiation is tracked. Returns false on timeout.
    pub async fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.is_empty();
            }
        }
    }
}
