//! The session manager: single owner of the active session.

mod dispatch;
mod lifecycle;
mod listener;
mod sharing;

#[cfg(test)]
mod tests;

pub use listener::SessionLifecycleListener;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use tandem_common::{PeerId, ResourceRootId, SessionId};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::SessionConfig;
use crate::negotiation::{NegotiationHandler, NegotiationRecord, NegotiationRegistry};
use crate::resources::ResourceProvider;
use crate::session::Session;
use crate::transport::Transport;
use crate::version::{Compatibility, ProtocolVersion};

/// `NoSession -> Starting -> Active -> Stopping -> NoSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    NoSession,
    Starting,
    Active,
    Stopping,
}

/// Which transition the current task is inside, for catching re-entrant
/// start/stop calls made from listener callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Starting,
    Stopping,
}

tokio::task_local! {
    static TRANSITION: Transition;
}

// ---------------------------------------------------------------------------
// Session Manager
// ---------------------------------------------------------------------------

/// Single entry point for starting, joining and stopping a session.
///
/// At most one session is active at a time. Start and stop are serialized
/// by a lock acquired with a timeout; when it cannot be acquired in time the
/// request is logged and dropped. Invitations and resource sharing spawn
/// negotiations which run concurrently and are handed to the installed
/// [`NegotiationHandler`].
pub struct SessionManager {
    me: Weak<SessionManager>,
    local: PeerId,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    resources: Arc<dyn ResourceProvider>,
    handler: RwLock<Option<Arc<dyn NegotiationHandler>>>,
    listeners: RwLock<Vec<Arc<dyn SessionLifecycleListener>>>,
    registry: Arc<NegotiationRegistry>,
    session: watch::Sender<Option<Arc<Session>>>,
    state: Mutex<ManagerState>,
    start_stop_lock: tokio::sync::Mutex<()>,
    /// Session a pending incoming invitation is about to join, and its host.
    expected_session: Mutex<Option<(SessionId, PeerId)>>,
    shutdown: CancellationToken,
}

impl SessionManager {
    /// Build the manager and start routing inbound transport events.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        resources: Arc<dyn ResourceProvider>,
    ) -> Arc<Self> {
        let events = transport.subscribe();
        let (session, _) = watch::channel(None);
        let manager = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            local: transport.local_peer().clone(),
            config,
            transport,
            resources,
            handler: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
            registry: Arc::new(NegotiationRegistry::new()),
            session,
            state: Mutex::new(ManagerState::NoSession),
            start_stop_lock: tokio::sync::Mutex::new(()),
            expected_session: Mutex::new(None),
            shutdown: CancellationToken::new(),
        });
        match events {
            Some(events) => {
                tokio::spawn(dispatch::run(
                    Arc::downgrade(&manager),
                    events,
                    manager.shutdown.clone(),
                ));
            }
            None => warn!(peer = %manager.local, "Transport inbox already taken; inbound messages will not be routed"),
        }
        manager
    }

    // -- accessors --

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn resources(&self) -> &Arc<dyn ResourceProvider> {
        &self.resources
    }

    pub fn registry(&self) -> &Arc<NegotiationRegistry> {
        &self.registry
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.borrow().clone()
    }

    /// Watch the active session come and go.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Session>>> {
        self.session.subscribe()
    }

    pub fn state(&self) -> ManagerState {
        *self.lock_state()
    }

    pub fn negotiations(&self) -> Vec<NegotiationRecord> {
        self.registry.records()
    }

    pub fn set_negotiation_handler(&self, handler: Arc<dyn NegotiationHandler>) {
        *self
            .handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handler);
    }

    pub(crate) fn handler(&self) -> Option<Arc<dyn NegotiationHandler>> {
        self.handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn arc(&self) -> Option<Arc<SessionManager>> {
        self.me.upgrade()
    }

    // -- listeners --

    pub fn add_listener(&self, listener: Arc<dyn SessionLifecycleListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn SessionLifecycleListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Call `f` on every listener in registration order. A panic in one
    /// listener is logged and does not stop the rest.
    fn notify(&self, event: &'static str, f: impl Fn(&dyn SessionLifecycleListener)) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for (index, listener) in listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
                error!(event, listener = index, "Session listener panicked");
            }
        }
    }

    pub(crate) fn fire_resources_available(&self, session: &Session, root: &ResourceRootId) {
        debug!(session_id = %session.id(), root = %root, "Resources available");
        self.notify("resources_available", |l| l.resources_available(session, root));
    }

    // -- state --

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ManagerState) {
        *self.lock_state() = state;
    }

    /// Move from `from` to `to`; false if the manager was not in `from`.
    fn try_transition(&self, from: ManagerState, to: ManagerState) -> bool {
        let mut state = self.lock_state();
        if *state != from {
            return false;
        }
        *state = to;
        true
    }

    /// Acquire the start/stop lock within the configured timeout.
    async fn acquire_lock(
        &self,
        operation: &'static str,
    ) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match tokio::time::timeout(self.config.lock_timeout, self.start_stop_lock.lock()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.config.lock_timeout.as_millis() as u64,
                    "Timed out waiting for the start/stop lock; request dropped"
                );
                None
            }
        }
    }

    // -- expected session --

    pub(crate) fn expect_session(&self, session_id: &SessionId, host: &PeerId) {
        *self
            .expected_session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) =
            Some((session_id.clone(), host.clone()));
    }

    pub(crate) fn forget_expected_session(&self, session_id: &SessionId) {
        let mut expected = self
            .expected_session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if expected.as_ref().is_some_and(|(id, _)| id == session_id) {
            *expected = None;
        }
    }

    fn clear_expected_session(&self) {
        *self
            .expected_session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    fn is_expected(&self, session_id: &SessionId, host: &PeerId) -> bool {
        self.expected_session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|(id, expected_host)| id == session_id && expected_host == host)
    }

    /// Wait until the session `id` is active.
    pub(crate) async fn wait_for_session(
        &self,
        id: &SessionId,
        timeout: Duration,
    ) -> Option<Arc<Session>> {
        let mut rx = self.session.subscribe();
        let wait = rx.wait_for(|s| s.as_ref().is_some_and(|s| s.id() == id));
        let session = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(session)) => session.clone(),
            _ => None,
        };
        session
    }

    // -- versions --

    /// Err with a reason unless `remote` may talk to us.
    pub(crate) fn version_accepted(
        &self,
        peer: &PeerId,
        remote: ProtocolVersion,
    ) -> Result<(), String> {
        let compatibility = self.config.compatibility.determine(self.config.version, remote);
        if compatibility == Compatibility::Ok {
            return Ok(());
        }
        let overridden = self
            .handler()
            .is_some_and(|handler| handler.accept_version_mismatch(peer, compatibility));
        if overridden {
            warn!(peer = %peer, remote = %remote, ?compatibility, "Proceeding despite protocol version mismatch");
            return Ok(());
        }
        Err(format!(
            "protocol version {remote} of {peer} is incompatible with {} ({compatibility:?})",
            self.config.version
        ))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
