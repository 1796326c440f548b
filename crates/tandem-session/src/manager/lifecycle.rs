//! Starting, joining and stopping the session.

use std::sync::Arc;

use futures_util::future::join_all;
use tandem_common::{PeerId, ResourceRootId, Result, SessionId, TandemError};
use tracing::{debug, info, warn};

use super::{ManagerState, SessionManager, Transition, TRANSITION};
use crate::negotiation::CancelOption;
use crate::protocol::{NegotiationMessage, ParticipantInfo};
use crate::resources::ResourceSelection;
use crate::session::Session;

impl SessionManager {
    /// Host a new session and share the selected resource roots.
    ///
    /// A no-op (logged) when a session is already active, when the start/stop
    /// lock cannot be acquired in time, or when called from inside a start.
    /// Roots that fail to open are skipped. Calling it while the same task
    /// is stopping the session is a caller bug and returns
    /// [`TandemError::IllegalState`].
    pub async fn start_session(&self, selection: ResourceSelection) -> Result<()> {
        match TRANSITION.try_with(|t| *t) {
            Ok(Transition::Starting) => {
                warn!("start_session called while already starting; ignoring");
                return Ok(());
            }
            Ok(Transition::Stopping) => {
                return Err(TandemError::IllegalState(
                    "start_session called while stopping the session".into(),
                ));
            }
            Err(_) => {}
        }
        let Some(_guard) = self.acquire_lock("start_session").await else {
            return Ok(());
        };
        TRANSITION
            .scope(Transition::Starting, self.start_locked(selection))
            .await;
        Ok(())
    }

    async fn start_locked(&self, selection: ResourceSelection) {
        if !self.try_transition(ManagerState::NoSession, ManagerState::Starting) {
            warn!(state = ?self.state(), "A session is already active; start request ignored");
            return;
        }
        let session = Arc::new(Session::hosted(SessionId::new(), self.local.clone()));
        info!(session_id = %session.id(), host = %self.local, "Starting session");

        self.notify("session_starting", |l| l.session_starting(&session));
        self.session.send_replace(Some(Arc::clone(&session)));
        self.set_state(ManagerState::Active);
        self.notify("session_started", |l| l.session_started(&session));

        for (root, files) in selection {
            if let Err(e) = self.resources.open(&root).await {
                warn!(root = %root, error = %e, "Could not open resource root; skipping it");
                continue;
            }
            let id = ResourceRootId::new();
            session.share_root(id.clone(), self.local.clone(), &root, files);
            self.fire_resources_available(&session, &id);
        }
        info!(session_id = %session.id(), roots = session.roots().len(), "Session started");
    }

    /// Enter a session hosted by `host`. Called once an incoming invitation
    /// has been confirmed; does no network I/O itself.
    pub fn join_session(
        &self,
        session_id: SessionId,
        host: PeerId,
        participants: &[ParticipantInfo],
    ) -> Result<Arc<Session>> {
        if !self.try_transition(ManagerState::NoSession, ManagerState::Starting) {
            return Err(TandemError::IllegalState(format!(
                "cannot join session {session_id}: another session is active"
            )));
        }
        let session = Arc::new(Session::joined(
            session_id,
            host,
            self.local.clone(),
            participants,
        ));
        info!(session_id = %session.id(), host = %session.host(), "Joining session");

        self.notify("session_starting", |l| l.session_starting(&session));
        self.session.send_replace(Some(Arc::clone(&session)));
        self.set_state(ManagerState::Active);
        self.clear_expected_session();
        self.notify("session_started", |l| l.session_started(&session));
        Ok(session)
    }

    /// Leave or end the active session.
    ///
    /// Cancels every running negotiation (notifying peers), waits a bounded
    /// time for them to finish, then tears the session down regardless.
    /// Without an active session this only resets invitation state. Calling
    /// it while the same task is starting a session returns
    /// [`TandemError::IllegalState`].
    pub async fn stop_session(&self) -> Result<()> {
        match TRANSITION.try_with(|t| *t) {
            Ok(Transition::Starting) => {
                return Err(TandemError::IllegalState(
                    "stop_session called while starting the session".into(),
                ));
            }
            Ok(Transition::Stopping) => {
                debug!("stop_session called while already stopping; ignoring");
                return Ok(());
            }
            Err(_) => {}
        }
        let Some(_guard) = self.acquire_lock("stop_session").await else {
            return Ok(());
        };
        TRANSITION
            .scope(Transition::Stopping, self.stop_locked())
            .await;
        Ok(())
    }

    async fn stop_locked(&self) {
        let Some(session) = self.session() else {
            self.clear_expected_session();
            debug!("No active session to stop");
            return;
        };
        if !self.try_transition(ManagerState::Active, ManagerState::Stopping) {
            warn!(state = ?self.state(), "Session is not active; stop request ignored");
            return;
        }
        info!(session_id = %session.id(), "Stopping session");

        let pending = self.registry.list();
        if !pending.is_empty() {
            debug!(count = pending.len(), "Cancelling running negotiations");
            join_all(
                pending
                    .iter()
                    .map(|n| n.local_cancel("session is stopping", CancelOption::NotifyPeer)),
            )
            .await;
        }
        drop(pending);
        if !self
            .registry
            .wait_until_empty(self.config.drain_timeout)
            .await
        {
            warn!(
                remaining = self.registry.len(),
                timeout_ms = self.config.drain_timeout.as_millis() as u64,
                "Negotiations did not finish in time; stopping anyway"
            );
        }

        self.notify("session_ending", |l| l.session_ending(&session));

        for peer in session.remote_participants() {
            let message = NegotiationMessage::LeaveSession {
                session_id: session.id().clone(),
            };
            if let Err(e) = self.transport.send(&peer, message).await {
                warn!(peer = %peer, error = %e, "Could not notify peer about leaving");
            }
        }
        for root in session.roots_owned_by(&self.local) {
            if let Err(e) = self.resources.close(&root.path).await {
                warn!(root = %root.path, error = %e, "Could not release resource root");
            }
        }

        self.session.send_replace(None);
        self.set_state(ManagerState::NoSession);
        self.clear_expected_session();
        info!(session_id = %session.id(), "Session stopped");
        self.notify("session_ended", |l| l.session_ended(&session));
    }
}
