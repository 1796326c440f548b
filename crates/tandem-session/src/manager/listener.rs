use tandem_common::{PeerId, ResourceRootId};

use crate::session::Session;

/// Observer of session lifecycle events. Every method defaults to a no-op.
///
/// Callbacks run synchronously on the task that caused the event, in
/// registration order. A panicking listener is logged and skipped.
pub trait SessionLifecycleListener: Send + Sync {
    fn session_starting(&self, _session: &Session) {}

    fn session_started(&self, _session: &Session) {}

    fn session_ending(&self, _session: &Session) {}

    fn session_ended(&self, _session: &Session) {}

    fn resources_available(&self, _session: &Session, _root: &ResourceRootId) {}

    /// A peer finished joining through an outgoing invitation.
    fn post_outgoing_invitation_completed(&self, _session: &Session, _peer: &PeerId) {}
}
