//! Invitee side of joining a session.

use std::sync::Arc;

use tandem_common::{NegotiationId, PeerId, SessionId};
use tracing::{info, warn};

use super::handle::{unexpected, Abort, NegotiationHandle};
use super::{
    CancelOption, Direction, NegotiationKind, NegotiationOutcome, NegotiationState,
};
use crate::manager::SessionManager;
use crate::progress::ProgressMonitor;
use crate::protocol::NegotiationMessage;
use crate::version::ProtocolVersion;

pub struct IncomingSessionNegotiation {
    handle: Arc<NegotiationHandle>,
    manager: Arc<SessionManager>,
    session_id: SessionId,
    remote_version: ProtocolVersion,
    description: String,
}

impl IncomingSessionNegotiation {
    pub(crate) fn new(
        manager: Arc<SessionManager>,
        inviter: PeerId,
        negotiation_id: NegotiationId,
        session_id: SessionId,
        remote_version: ProtocolVersion,
        description: String,
    ) -> Arc<Self> {
        let handle = NegotiationHandle::register(
            manager.registry(),
            Arc::clone(manager.transport()),
            manager.config().monitor_poll_interval,
            negotiation_id,
            inviter,
            NegotiationKind::Session,
            Direction::Incoming,
            NegotiationState::Proposed,
        );
        Arc::new(Self {
            handle,
            manager,
            session_id,
            remote_version,
            description,
        })
    }

    pub fn handle(&self) -> &Arc<NegotiationHandle> {
        &self.handle
    }

    /// The peer that sent the invitation and hosts the session.
    pub fn inviter(&self) -> &PeerId {
        self.handle.peer()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn remote_version(&self) -> ProtocolVersion {
        self.remote_version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Accept the invitation and join the session once the host confirms.
    pub async fn accept(&self, monitor: &dyn ProgressMonitor) -> NegotiationOutcome {
        if !self.handle.begin_run() {
            return self.handle.wait_terminal().await;
        }
        monitor.begin("joining session", 1);
        let result = self.join(monitor).await;
        if result.is_err() {
            self.manager.forget_expected_session(&self.session_id);
        }
        let outcome = self.handle.conclude(result).await;
        monitor.done();
        outcome
    }

    /// Decline the invitation. The inviter is told.
    pub async fn reject(&self, reason: impl Into<String>) {
        self.handle
            .local_cancel(reason, CancelOption::NotifyPeer)
            .await;
    }

    async fn join(&self, monitor: &dyn ProgressMonitor) -> Result<(), Abort> {
        let config = self.manager.config();
        let host = self.handle.peer();

        self.handle.set_state(NegotiationState::Accepted);
        self.manager
            .version_accepted(host, self.remote_version)
            .map_err(Abort::Failed)?;
        self.handle.checkpoint(monitor)?;
        if let Some(current) = self.manager.session() {
            return Err(Abort::Failed(format!(
                "already in session {}",
                current.id()
            )));
        }

        self.manager.expect_session(&self.session_id, host);
        self.manager
            .transport()
            .send(
                host,
                NegotiationMessage::InvitationAccepted {
                    negotiation_id: self.handle.id().clone(),
                    version: config.version,
                },
            )
            .await
            .map_err(|e| Abort::Failed(format!("could not accept invitation: {e}")))?;

        self.handle.set_state(NegotiationState::Completing);
        let participants = match self
            .handle
            .next_message(config.response_timeout, monitor, "invitation completion")
            .await?
        {
            NegotiationMessage::InvitationCompleted {
                session_id,
                participants,
                ..
            } if session_id == self.session_id => participants,
            other => return Err(unexpected(&other, "invitation completion")),
        };

        self.manager
            .join_session(self.session_id.clone(), host.clone(), &participants)
            .map_err(|e| Abort::Failed(e.to_string()))?;
        info!(session_id = %self.session_id, host = %host, "Joined session");
        let confirmation = NegotiationMessage::InvitationJoined {
            negotiation_id: self.handle.id().clone(),
        };
        if let Err(e) = self.manager.transport().send(host, confirmation).await {
            warn!(host = %host, error = %e, "Could not confirm joining");
        }
        monitor.worked(1);
        Ok(())
    }
}
