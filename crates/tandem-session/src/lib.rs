//! Session lifecycle coordination for tandem.
//!
//! A [`SessionManager`] owns the single active [`Session`] of a peer and
//! spawns negotiations that invite peers into it and hand them shared
//! resource roots. The network, the file system and user interaction are
//! collaborators behind the [`Transport`], [`ResourceProvider`] and
//! [`NegotiationHandler`] traits.

pub mod config;
pub mod manager;
pub mod negotiation;
pub mod progress;
pub mod protocol;
pub mod resources;
pub mod session;
pub mod transport;
pub mod version;

#[cfg(test)]
mod testing;

pub use config::SessionConfig;
pub use manager::{ManagerState, SessionLifecycleListener, SessionManager};
pub use negotiation::{
    AutoAcceptHandler, CancelOption, CancelledBy, Direction, IncomingProjectNegotiation,
    IncomingSessionNegotiation, NegotiationHandle, NegotiationHandler, NegotiationKind,
    NegotiationOutcome, NegotiationRecord, NegotiationRegistry, NegotiationState,
    OutgoingProjectNegotiation, OutgoingSessionNegotiation, RootOffer,
};
pub use progress::{NullProgressMonitor, ProgressMonitor, TokenProgressMonitor};
pub use protocol::{FileEntry, FileListManifest, FileRequest, NegotiationMessage, ParticipantInfo};
pub use resources::{FsResourceProvider, ResourceProvider, ResourceSelection};
pub use session::{Participant, Permission, Session, ShareOutcome, SharedRoot};
pub use transport::{HubTransport, LocalHub, Transport, TransportEvent};
pub use version::{determine_compatibility, Compatibility, CompatibilityTable, ProtocolVersion};
