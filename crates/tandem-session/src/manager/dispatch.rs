//! Routing of inbound transport events.

use std::sync::{Arc, Weak};

use futures_util::future::join_all;
use tandem_common::{NegotiationId, PeerId, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SessionManager;
use crate::negotiation::{
    CancelOption, Direction, IncomingProjectNegotiation, IncomingSessionNegotiation,
    NegotiationKind,
};
use crate::protocol::{FileListManifest, NegotiationMessage};
use crate::session::Permission;
use crate::transport::TransportEvent;
use crate::version::ProtocolVersion;

/// Event loop; ends when the manager is dropped or the transport closes.
pub(super) async fn run(
    manager: Weak<SessionManager>,
    mut events: mpsc::Receiver<TransportEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.handle_event(event).await;
    }
    debug!("Transport event loop finished");
}

impl SessionManager {
    async fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Message { from, message } => {
                debug!(from = %from, kind = message.name(), "Inbound message");
                self.route_message(from, message).await;
            }
            TransportEvent::PeerLost { peer } => self.peer_lost(peer).await,
        }
    }

    async fn route_message(self: &Arc<Self>, from: PeerId, message: NegotiationMessage) {
        match message {
            NegotiationMessage::Invitation {
                session_id,
                negotiation_id,
                version,
                description,
            } => {
                self.on_invitation(from, session_id, negotiation_id, version, description)
                    .await
            }
            NegotiationMessage::ProjectOffer {
                session_id,
                negotiation_id,
                manifests,
            } => {
                self.on_project_offer(from, session_id, negotiation_id, manifests)
                    .await
            }
            NegotiationMessage::PermissionChanged {
                session_id,
                peer,
                permission,
            } => self.on_permission_changed(&from, &session_id, &peer, permission),
            NegotiationMessage::LeaveSession { session_id } => {
                self.on_leave(from, &session_id).await
            }
            other => self.forward(&from, other),
        }
    }

    /// Hand a reply to the negotiation it belongs to.
    fn forward(&self, from: &PeerId, message: NegotiationMessage) {
        let Some(id) = message.negotiation_id().cloned() else {
            return;
        };
        match self.registry.get(&id) {
            Some(negotiation) if negotiation.peer() == from => negotiation.deliver(message),
            Some(_) => {
                warn!(from = %from, negotiation_id = %id, "Message from wrong peer; dropped");
            }
            None => {
                debug!(
                    from = %from,
                    negotiation_id = %id,
                    kind = message.name(),
                    "No running negotiation; message dropped"
                );
            }
        }
    }

    async fn reply_cancel(&self, to: &PeerId, negotiation_id: NegotiationId, reason: &str) {
        let message = NegotiationMessage::Cancel {
            negotiation_id,
            reason: reason.to_string(),
        };
        if let Err(e) = self.transport.send(to, message).await {
            warn!(peer = %to, error = %e, "Could not send cancellation");
        }
    }

    async fn on_invitation(
        self: &Arc<Self>,
        from: PeerId,
        session_id: SessionId,
        negotiation_id: NegotiationId,
        version: ProtocolVersion,
        description: String,
    ) {
        let refusal = if self.session().is_some() {
            Some("already in a session")
        } else if self
            .registry
            .contains(NegotiationKind::Session, Direction::Incoming)
        {
            Some("another invitation is pending")
        } else if self.handler().is_none() {
            Some("invitations are not accepted")
        } else {
            None
        };
        if let Some(reason) = refusal {
            info!(from = %from, session_id = %session_id, reason, "Rejecting invitation");
            let message = NegotiationMessage::InvitationRejected {
                negotiation_id,
                reason: reason.to_string(),
            };
            if let Err(e) = self.transport.send(&from, message).await {
                warn!(peer = %from, error = %e, "Could not reject invitation");
            }
            return;
        }

        info!(from = %from, session_id = %session_id, "Invitation received");
        let negotiation = IncomingSessionNegotiation::new(
            Arc::clone(self),
            from,
            negotiation_id,
            session_id,
            version,
            description,
        );
        if let Some(handler) = self.handler() {
            handler.handle_incoming_session_negotiation(negotiation);
        }
    }

    async fn on_project_offer(
        self: &Arc<Self>,
        from: PeerId,
        session_id: SessionId,
        negotiation_id: NegotiationId,
        manifests: Vec<FileListManifest>,
    ) {
        let refusal = match self.session() {
            Some(session) if session.id() == &session_id => {
                if session.has_write_access(&from) {
                    None
                } else {
                    Some("offering peer has no write access")
                }
            }
            _ if self.is_expected(&session_id, &from) => None,
            _ => Some("unknown session"),
        };
        let refusal = refusal.or_else(|| {
            self.handler()
                .is_none()
                .then_some("project offers are not accepted")
        });
        if let Some(reason) = refusal {
            info!(from = %from, session_id = %session_id, reason, "Refusing project offer");
            self.reply_cancel(&from, negotiation_id, reason).await;
            return;
        }

        debug!(from = %from, roots = manifests.len(), "Project offer received");
        let negotiation = IncomingProjectNegotiation::new(
            Arc::clone(self),
            from,
            negotiation_id,
            session_id,
            manifests,
        );
        if let Some(handler) = self.handler() {
            handler.handle_incoming_project_negotiation(negotiation);
        }
    }

    fn on_permission_changed(
        &self,
        from: &PeerId,
        session_id: &SessionId,
        peer: &PeerId,
        permission: Permission,
    ) {
        let Some(session) = self.session().filter(|s| s.id() == session_id) else {
            return;
        };
        if session.host() != from {
            warn!(from = %from, "Permission change from non-host ignored");
            return;
        }
        if session.set_permission(peer, permission) {
            info!(peer = %peer, ?permission, "Permission changed by host");
        }
    }

    async fn on_leave(self: &Arc<Self>, from: PeerId, session_id: &SessionId) {
        let Some(session) = self.session().filter(|s| s.id() == session_id) else {
            return;
        };
        if *session.host() == from {
            info!(session_id = %session_id, "Host ended the session");
            self.spawn_stop();
        } else {
            info!(session_id = %session_id, peer = %from, "Participant left");
            session.remove_participant(&from);
            self.cancel_peer_negotiations(&from, "peer left the session").await;
        }
    }

    async fn peer_lost(self: &Arc<Self>, peer: PeerId) {
        info!(peer = %peer, "Lost connection to peer");
        self.cancel_peer_negotiations(&peer, "connection to peer lost")
            .await;
        let Some(session) = self.session() else {
            return;
        };
        if *session.host() == peer && !session.is_host() {
            self.spawn_stop();
        } else {
            session.remove_participant(&peer);
        }
    }

    async fn cancel_peer_negotiations(&self, peer: &PeerId, reason: &str) {
        let negotiations = self.registry.list_for_peer(peer);
        join_all(
            negotiations
                .iter()
                .map(|n| n.local_cancel(reason, CancelOption::SilentlyCancel)),
        )
        .await;
    }

    /// Stop from a separate task so the event loop keeps routing the
    /// replies the stop is waiting for.
    fn spawn_stop(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = manager.stop_session().await {
                warn!(error = %e, "Could not stop session");
            }
        });
    }
}
