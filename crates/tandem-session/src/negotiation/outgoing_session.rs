//! Host side of inviting a peer into the session.

use std::sync::Arc;

use tandem_common::{NegotiationId, PeerId};
use tracing::info;

use super::handle::{unexpected, Abort, NegotiationHandle};
use super::{Direction, NegotiationKind, NegotiationOutcome, NegotiationState};
use crate::manager::SessionManager;
use crate::progress::ProgressMonitor;
use crate::protocol::NegotiationMessage;
use crate::session::{Permission, Session};

pub struct OutgoingSessionNegotiation {
    handle: Arc<NegotiationHandle>,
    manager: Arc<SessionManager>,
    session: Arc<Session>,
    description: String,
}

impl OutgoingSessionNegotiation {
    /// Registered on construction, before anyone can drive it.
    pub(crate) fn new(
        manager: Arc<SessionManager>,
        session: Arc<Session>,
        peer: PeerId,
        description: String,
    ) -> Arc<Self> {
        let handle = NegotiationHandle::register(
            manager.registry(),
            Arc::clone(manager.transport()),
            manager.config().monitor_poll_interval,
            NegotiationId::new(),
            peer,
            NegotiationKind::Session,
            Direction::Outgoing,
            NegotiationState::Created,
        );
        Arc::new(Self {
            handle,
            manager,
            session,
            description,
        })
    }

    pub fn handle(&self) -> &Arc<NegotiationHandle> {
        &self.handle
    }

    pub fn peer(&self) -> &PeerId {
        self.handle.peer()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Send the invitation and drive it to a terminal state.
    pub async fn run(&self, monitor: &dyn ProgressMonitor) -> NegotiationOutcome {
        if !self.handle.begin_run() {
            return self.handle.wait_terminal().await;
        }
        monitor.begin("inviting peer", 1);
        let result = self.invite(monitor).await;
        let outcome = self.handle.conclude(result).await;
        if outcome.is_completed() {
            self.manager
                .post_outgoing_invitation_completed(&self.session, self.handle.peer());
        }
        monitor.done();
        outcome
    }

    async fn invite(&self, monitor: &dyn ProgressMonitor) -> Result<(), Abort> {
        let config = self.manager.config();
        let peer = self.handle.peer();
        let negotiation_id = self.handle.id().clone();

        self.handle.set_state(NegotiationState::Proposed);
        self.manager
            .transport()
            .send(
                peer,
                NegotiationMessage::Invitation {
                    session_id: self.session.id().clone(),
                    negotiation_id: negotiation_id.clone(),
                    version: config.version,
                    description: self.description.clone(),
                },
            )
            .await
            .map_err(|e| Abort::Failed(format!("could not send invitation: {e}")))?;
        info!(session_id = %self.session.id(), peer = %peer, "Invitation sent");

        self.handle.set_state(NegotiationState::AwaitingAcceptance);
        let remote_version = match self
            .handle
            .next_message(config.acceptance_timeout, monitor, "invitation acceptance")
            .await?
        {
            NegotiationMessage::InvitationAccepted { version, .. } => version,
            NegotiationMessage::InvitationRejected { reason, .. } => {
                return Err(Abort::Remote(reason));
            }
            other => return Err(unexpected(&other, "invitation acceptance")),
        };

        self.handle.set_state(NegotiationState::Accepted);
        self.manager
            .version_accepted(peer, remote_version)
            .map_err(Abort::Failed)?;
        self.handle.checkpoint(monitor)?;

        self.handle.set_state(NegotiationState::Completing);
        self.session
            .add_participant(peer.clone(), Permission::ReadOnly);
        let joined = self.complete(negotiation_id, monitor).await;
        if joined.is_err() {
            self.session.remove_participant(peer);
        }
        joined?;
        monitor.worked(1);
        Ok(())
    }

    /// Hand the participant list to the invitee and wait until it reports
    /// that it joined.
    async fn complete(
        &self,
        negotiation_id: NegotiationId,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), Abort> {
        let peer = self.handle.peer();
        self.manager
            .transport()
            .send(
                peer,
                NegotiationMessage::InvitationCompleted {
                    negotiation_id,
                    session_id: self.session.id().clone(),
                    participants: self.session.participant_infos(),
                },
            )
            .await
            .map_err(|e| Abort::Failed(format!("could not complete invitation: {e}")))?;

        match self
            .handle
            .next_message(self.manager.config().response_timeout, monitor, "join confirmation")
            .await?
        {
            NegotiationMessage::InvitationJoined { .. } => Ok(()),
            other => Err(unexpected(&other, "join confirmation")),
        }
    }
}
