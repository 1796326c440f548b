//! The embedding application's side of a negotiation.

use std::collections::HashMap;
use std::sync::Arc;

use tandem_common::PeerId;
use tracing::{info, warn};

use super::{
    IncomingProjectNegotiation, IncomingSessionNegotiation, OutgoingProjectNegotiation,
    OutgoingSessionNegotiation,
};
use crate::progress::NullProgressMonitor;
use crate::resources::validate_root_name;
use crate::version::Compatibility;

/// Receives every negotiation the session manager creates.
///
/// Each method gets an already registered negotiation and is responsible
/// for eventually driving it (`run`, `accept`, `reject`). Methods are
/// called from the manager's tasks and must not block; long work belongs on
/// a spawned task.
pub trait NegotiationHandler: Send + Sync {
    fn handle_outgoing_session_negotiation(&self, negotiation: Arc<OutgoingSessionNegotiation>);

    fn handle_incoming_session_negotiation(&self, negotiation: Arc<IncomingSessionNegotiation>);

    fn handle_outgoing_project_negotiation(&self, negotiation: Arc<OutgoingProjectNegotiation>);

    fn handle_incoming_project_negotiation(&self, negotiation: Arc<IncomingProjectNegotiation>);

    /// Called when the peer's protocol version is not listed as compatible.
    /// Returning true proceeds anyway.
    fn accept_version_mismatch(&self, _peer: &PeerId, _compatibility: Compatibility) -> bool {
        false
    }
}

/// Runs every outgoing negotiation and accepts every incoming one.
///
/// Incoming roots are written to `<target_base>/<root name>`.
#[derive(Debug, Clone)]
pub struct AutoAcceptHandler {
    target_base: String,
}

impl AutoAcceptHandler {
    pub fn new(target_base: impl Into<String>) -> Self {
        Self {
            target_base: target_base.into(),
        }
    }

    /// `None` for names that are not a single plain path component.
    fn target_for(&self, name: &str) -> Option<String> {
        if let Err(e) = validate_root_name(name) {
            warn!(error = %e, "Declining offered root");
            return None;
        }
        let base = self.target_base.trim_end_matches('/');
        if base.is_empty() {
            Some(name.to_string())
        } else {
            Some(format!("{base}/{name}"))
        }
    }
}

impl NegotiationHandler for AutoAcceptHandler {
    fn handle_outgoing_session_negotiation(&self, negotiation: Arc<OutgoingSessionNegotiation>) {
        tokio::spawn(async move {
            negotiation.run(&NullProgressMonitor).await;
        });
    }

    fn handle_incoming_session_negotiation(&self, negotiation: Arc<IncomingSessionNegotiation>) {
        info!(
            inviter = %negotiation.inviter(),
            description = %negotiation.description(),
            "Accepting invitation"
        );
        tokio::spawn(async move {
            negotiation.accept(&NullProgressMonitor).await;
        });
    }

    fn handle_outgoing_project_negotiation(&self, negotiation: Arc<OutgoingProjectNegotiation>) {
        tokio::spawn(async move {
            negotiation.run(&NullProgressMonitor).await;
        });
    }

    fn handle_incoming_project_negotiation(&self, negotiation: Arc<IncomingProjectNegotiation>) {
        let targets: HashMap<_, _> = negotiation
            .manifests()
            .iter()
            .filter_map(|m| Some((m.root_id.clone(), self.target_for(&m.name)?)))
            .collect();
        tokio::spawn(async move {
            negotiation.accept(targets, &NullProgressMonitor).await;
        });
    }

    fn accept_version_mismatch(&self, peer: &PeerId, compatibility: Compatibility) -> bool {
        warn!(peer = %peer, ?compatibility, "Refusing incompatible protocol version");
        false
    }
}
