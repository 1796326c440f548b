//! Messages exchanged between peers while negotiating.
//!
//! The transport owns the wire encoding. These types only fix the shape of
//! each message so both sides agree on what they carry. Every message that
//! belongs to a negotiation carries its `NegotiationId`, which the session
//! manager uses to route it.

use serde::{Deserialize, Serialize};
use tandem_common::{NegotiationId, PeerId, ResourceRootId, SessionId};

use crate::session::Permission;
use crate::version::ProtocolVersion;

/// One file inside a resource root manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// `/`-separated path relative to the root.
    pub path: String,
    pub size: u64,
    /// Lowercase hex SHA-256 of the content.
    pub checksum: String,
}

/// Everything a receiver needs to reconcile one root with its local copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListManifest {
    pub root_id: ResourceRootId,
    /// Human-readable root name, used to pick a local target.
    pub name: String,
    pub files: Vec<FileEntry>,
    /// True when the whole root is shared rather than a subset of files.
    pub complete: bool,
}

/// Files of one root the receiver still needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    pub root_id: ResourceRootId,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub peer: PeerId,
    pub permission: Permission,
    pub host: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NegotiationMessage {
    // -- session negotiation --
    Invitation {
        session_id: SessionId,
        negotiation_id: NegotiationId,
        version: ProtocolVersion,
        description: String,
    },
    InvitationAccepted {
        negotiation_id: NegotiationId,
        version: ProtocolVersion,
    },
    InvitationRejected {
        negotiation_id: NegotiationId,
        reason: String,
    },
    InvitationCompleted {
        negotiation_id: NegotiationId,
        session_id: SessionId,
        participants: Vec<ParticipantInfo>,
    },
    /// The invitee joined; the host may now count it as a participant.
    InvitationJoined {
        negotiation_id: NegotiationId,
    },

    // -- project negotiation --
    ProjectOffer {
        session_id: SessionId,
        negotiation_id: NegotiationId,
        manifests: Vec<FileListManifest>,
    },
    ProjectResponse {
        negotiation_id: NegotiationId,
        wanted: Vec<FileRequest>,
    },
    FileData {
        negotiation_id: NegotiationId,
        root_id: ResourceRootId,
        path: String,
        content: Vec<u8>,
    },
    TransferComplete {
        negotiation_id: NegotiationId,
    },
    ProjectAcknowledged {
        negotiation_id: NegotiationId,
    },

    // -- either kind --
    Cancel {
        negotiation_id: NegotiationId,
        reason: String,
    },

    // -- session-wide --
    PermissionChanged {
        session_id: SessionId,
        peer: PeerId,
        permission: Permission,
    },
    LeaveSession {
        session_id: SessionId,
    },
}

impl NegotiationMessage {
    /// The negotiation this message belongs to, if any.
    pub fn negotiation_id(&self) -> Option<&NegotiationId> {
        match self {
            Self::Invitation { negotiation_id, .. }
            | Self::InvitationAccepted { negotiation_id, .. }
            | Self::InvitationRejected { negotiation_id, .. }
            | Self::InvitationCompleted { negotiation_id, .. }
            | Self::InvitationJoined { negotiation_id }
            | Self::ProjectOffer { negotiation_id, .. }
            | Self::ProjectResponse { negotiation_id, .. }
            | Self::FileData { negotiation_id, .. }
            | Self::TransferComplete { negotiation_id }
            | Self::ProjectAcknowledged { negotiation_id }
            | Self::Cancel { negotiation_id, .. } => Some(negotiation_id),
            Self::PermissionChanged { .. } | Self::LeaveSession { .. } => None,
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Invitation { .. } => "invitation",
            Self::InvitationAccepted { .. } => "invitation_accepted",
            Self::InvitationRejected { .. } => "invitation_rejected",
            Self::InvitationCompleted { .. } => "invitation_completed",
            Self::InvitationJoined { .. } => "invitation_joined",
            Self::ProjectOffer { .. } => "project_offer",
            Self::ProjectResponse { .. } => "project_response",
            Self::FileData { .. } => "file_data",
            Self::TransferComplete { .. } => "transfer_complete",
            Self::ProjectAcknowledged { .. } => "project_acknowledged",
            Self::Cancel { .. } => "cancel",
            Self::PermissionChanged { .. } => "permission_changed",
            Self::LeaveSession { .. } => "leave_session",
        }
    }
}
