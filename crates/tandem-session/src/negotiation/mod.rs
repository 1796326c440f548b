//! Negotiations: bounded, cancellable exchanges that bring a peer into the
//! session or hand it shared resources.
//!
//! Each negotiation is driven by the embedding application through a
//! [`NegotiationHandler`], runs on its own task, and tracks itself in the
//! [`NegotiationRegistry`] until it reaches a terminal state.

mod handle;
mod handler;
mod incoming_project;
mod incoming_session;
mod outgoing_project;
mod outgoing_session;
mod registry;


pub use handle::NegotiationHandle;
pub(crate) use handle::Abort;
pub use handler::{AutoAcceptHandler, NegotiationHandler};
pub use incoming_project::IncomingProjectNegotiation;
pub use incoming_session::IncomingSessionNegotiation;
pub use outgoing_project::{OutgoingProjectNegotiation, RootOffer};
pub use outgoing_session::OutgoingSessionNegotiation;
pub use registry::NegotiationRegistry;

use std::fmt;

use tandem_common::{NegotiationId, PeerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationKind {
    Session,
    Project,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Union of the session and project negotiation state machines.
///
/// Session: `Created -> Proposed -> AwaitingAcceptance -> Accepted ->
/// Completing -> Completed`. Project: `Created -> Offered ->
/// NegotiatingFileList -> Transferring -> Completed`. `Cancelled` and
/// `Failed` are reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    Created,
    Proposed,
    AwaitingAcceptance,
    Accepted,
    Completing,
    Offered,
    NegotiatingFileList,
    Transferring,
    Completed,
    Cancelled,
    Failed,
}

impl NegotiationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Whether a local cancellation tells the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOption {
    NotifyPeer,
    /// Used when the peer is known to be gone.
    SilentlyCancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelledBy {
    Local,
    Remote,
}

/// How a negotiation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    Completed,
    Cancelled { reason: String, by: CancelledBy },
    Failed { reason: String },
}

impl NegotiationOutcome {
    pub fn state(&self) -> NegotiationState {
        match self {
            Self::Completed => NegotiationState::Completed,
            Self::Cancelled { .. } => NegotiationState::Cancelled,
            Self::Failed { .. } => NegotiationState::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Snapshot of one tracked negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationRecord {
    pub id: NegotiationId,
    pub peer: PeerId,
    pub kind: NegotiationKind,
    pub direction: Direction,
    pub state: NegotiationState,
}
