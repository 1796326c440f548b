//! Inviting peers, sharing resources and changing permissions.

use std::sync::Arc;

use tandem_common::{PeerId, ResourceRootId};
use tracing::{debug, error, info, warn};

use super::SessionManager;
use crate::negotiation::{
    CancelOption, NegotiationKind, OutgoingProjectNegotiation, OutgoingSessionNegotiation,
    RootOffer,
};
use crate::protocol::NegotiationMessage;
use crate::resources::ResourceSelection;
use crate::session::{Permission, Session, ShareOutcome};

impl SessionManager {
    /// Invite `peer` into the hosted session.
    ///
    /// Returns the new negotiation after handing it to the negotiation
    /// handler, or `None` (logged) when there is no hosted session, the peer
    /// already participates, or an invitation for it is already running.
    pub async fn invite(
        &self,
        peer: PeerId,
        description: impl Into<String>,
    ) -> Option<Arc<OutgoingSessionNegotiation>> {
        let negotiation = {
            let _guard = self.acquire_lock("invite").await?;
            let Some(session) = self.session() else {
                warn!(peer = %peer, "No active session; invitation dropped");
                return None;
            };
            if !session.is_host() {
                warn!(peer = %peer, "Only the host can invite; invitation dropped");
                return None;
            }
            if session.is_participant(&peer) {
                debug!(peer = %peer, "Peer already participates; invitation dropped");
                return None;
            }
            if self.registry.exists_for_peer(&peer, NegotiationKind::Session) {
                debug!(peer = %peer, "Invitation already pending; duplicate dropped");
                return None;
            }
            OutgoingSessionNegotiation::new(self.arc()?, session, peer, description.into())
        };

        info!(peer = %negotiation.peer(), "Inviting peer");
        match self.handler() {
            Some(handler) => handler.handle_outgoing_session_negotiation(Arc::clone(&negotiation)),
            None => {
                warn!("No negotiation handler installed; cancelling invitation");
                negotiation
                    .handle()
                    .local_cancel("no negotiation handler", CancelOption::SilentlyCancel)
                    .await;
            }
        }
        Some(negotiation)
    }

    /// Invite several peers with the same description.
    pub async fn invite_all(
        &self,
        peers: impl IntoIterator<Item = PeerId>,
        description: &str,
    ) -> Vec<Arc<OutgoingSessionNegotiation>> {
        let mut negotiations = Vec::new();
        for peer in peers {
            if let Some(negotiation) = self.invite(peer, description).await {
                negotiations.push(negotiation);
            }
        }
        negotiations
    }

    /// Share more resource roots, or more files of already shared roots,
    /// with every remote participant.
    ///
    /// Requires write access. The check is made once up front; a permission
    /// revoked while this runs is caught by the receivers, which refuse
    /// offers from peers without write access in their own view.
    pub async fn add_resources_to_session(
        &self,
        selection: ResourceSelection,
    ) -> Vec<Arc<OutgoingProjectNegotiation>> {
        let Some(session) = self.session() else {
            warn!("No active session; resources not shared");
            return Vec::new();
        };
        if !session.has_write_access(&self.local) {
            error!(peer = %self.local, "No write access; resources not shared");
            return Vec::new();
        }

        let mut offers = Vec::new();
        for (root, files) in selection {
            let existing = session.root_by_path(&self.local, &root);
            if existing.is_none() {
                if let Err(e) = self.resources.open(&root).await {
                    warn!(root = %root, error = %e, "Could not open resource root; skipping it");
                    continue;
                }
            }
            let id = existing
                .map(|r| r.id)
                .unwrap_or_else(ResourceRootId::new);
            match session.share_root(id.clone(), self.local.clone(), &root, files.clone()) {
                ShareOutcome::Added => {
                    self.fire_resources_available(&session, &id);
                    offers.push(RootOffer {
                        id,
                        path: root,
                        files,
                    });
                }
                ShareOutcome::Extended(added) => offers.push(RootOffer {
                    id,
                    path: root,
                    files: added,
                }),
                ShareOutcome::Unchanged => {
                    debug!(root = %root, "Resource root already shared");
                }
            }
        }
        if offers.is_empty() {
            return Vec::new();
        }

        session
            .remote_participants()
            .into_iter()
            .filter_map(|peer| self.offer_roots(&session, peer, offers.clone()))
            .collect()
    }

    /// Change a participant's permission and tell everyone. Host only.
    pub async fn change_permission(&self, peer: &PeerId, permission: Permission) -> bool {
        let Some(session) = self.session() else {
            warn!(peer = %peer, "No active session; permission unchanged");
            return false;
        };
        if !session.is_host() {
            warn!(peer = %peer, "Only the host can change permissions");
            return false;
        }
        if *peer == self.local || !session.set_permission(peer, permission) {
            warn!(peer = %peer, "Not a remote participant; permission unchanged");
            return false;
        }
        info!(peer = %peer, ?permission, "Permission changed");
        for remote in session.remote_participants() {
            let message = NegotiationMessage::PermissionChanged {
                session_id: session.id().clone(),
                peer: peer.clone(),
                permission,
            };
            if let Err(e) = self.transport.send(&remote, message).await {
                warn!(peer = %remote, error = %e, "Could not announce permission change");
            }
        }
        true
    }

    /// Tell listeners a peer joined, then offer it the roots we share.
    pub(crate) fn post_outgoing_invitation_completed(&self, session: &Arc<Session>, peer: &PeerId) {
        self.notify("post_outgoing_invitation_completed", |l| {
            l.post_outgoing_invitation_completed(session, peer)
        });

        if !session.has_write_access(&self.local) {
            return;
        }
        let offers: Vec<RootOffer> = session
            .roots_owned_by(&self.local)
            .into_iter()
            .map(|root| RootOffer {
                id: root.id,
                path: root.path,
                files: root.files.map(|files| files.into_iter().collect()),
            })
            .collect();
        if !offers.is_empty() {
            self.offer_roots(session, peer.clone(), offers);
        }
    }

    fn offer_roots(
        &self,
        session: &Arc<Session>,
        peer: PeerId,
        offers: Vec<RootOffer>,
    ) -> Option<Arc<OutgoingProjectNegotiation>> {
        let negotiation =
            OutgoingProjectNegotiation::new(self.arc()?, Arc::clone(session), peer, offers);
        match self.handler() {
            Some(handler) => handler.handle_outgoing_project_negotiation(Arc::clone(&negotiation)),
            None => {
                // Dropping the only reference deregisters it.
                warn!("No negotiation handler installed; project offer dropped");
                return None;
            }
        }
        Some(negotiation)
    }
}
