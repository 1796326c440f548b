//! Shared fixtures for the crate's tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tandem_common::{PeerId, ResourceRootId};

use crate::config::SessionConfig;
use crate::manager::{SessionLifecycleListener, SessionManager};
use crate::negotiation::{
    IncomingProjectNegotiation, IncomingSessionNegotiation, NegotiationHandler,
    OutgoingProjectNegotiation, OutgoingSessionNegotiation,
};
use crate::resources::{ResourceProvider, ResourceSelection};
use crate::session::Session;
use crate::transport::LocalHub;

/// Short timeouts so failing tests fail quickly.
pub(crate) fn fast_config() -> SessionConfig {
    SessionConfig {
        lock_timeout: Duration::from_secs(2),
        drain_timeout: Duration::from_secs(2),
        acceptance_timeout: Duration::from_secs(5),
        response_timeout: Duration::from_secs(5),
        monitor_poll_interval: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}

pub(crate) async fn manager_on(
    hub: &LocalHub,
    name: &str,
    resources: Arc<dyn ResourceProvider>,
    config: SessionConfig,
) -> Arc<SessionManager> {
    let transport = hub.connect(name).await;
    SessionManager::new(config, transport, resources)
}

pub(crate) fn whole_roots(roots: &[&str]) -> ResourceSelection {
    roots.iter().map(|root| (root.to_string(), None)).collect()
}

/// Poll `check` until it holds, failing the test after five seconds.
pub(crate) async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Records every lifecycle callback as a short string.
#[derive(Default)]
pub(crate) struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl SessionLifecycleListener for RecordingListener {
    fn session_starting(&self, _session: &Session) {
        self.push("starting".into());
    }

    fn session_started(&self, _session: &Session) {
        self.push("started".into());
    }

    fn session_ending(&self, _session: &Session) {
        self.push("ending".into());
    }

    fn session_ended(&self, _session: &Session) {
        self.push("ended".into());
    }

    fn resources_available(&self, _session: &Session, root: &ResourceRootId) {
        self.push(format!("resources:{root}"));
    }

    fn post_outgoing_invitation_completed(&self, _session: &Session, peer: &PeerId) {
        self.push(format!("joined:{peer}"));
    }
}

pub(crate) struct PanickingListener;

impl SessionLifecycleListener for PanickingListener {
    fn session_started(&self, _session: &Session) {
        panic!("listener failure");
    }
}

/// Keeps every negotiation it is handed without driving it.
#[derive(Default)]
pub(crate) struct HoldingHandler {
    pub(crate) outgoing_sessions: Mutex<Vec<Arc<OutgoingSessionNegotiation>>>,
    pub(crate) incoming_sessions: Mutex<Vec<Arc<IncomingSessionNegotiation>>>,
    pub(crate) outgoing_projects: Mutex<Vec<Arc<OutgoingProjectNegotiation>>>,
    pub(crate) incoming_projects: Mutex<Vec<Arc<IncomingProjectNegotiation>>>,
}

impl NegotiationHandler for HoldingHandler {
    fn handle_outgoing_session_negotiation(&self, negotiation: Arc<OutgoingSessionNegotiation>) {
        self.outgoing_sessions.lock().unwrap().push(negotiation);
    }

    fn handle_incoming_session_negotiation(&self, negotiation: Arc<IncomingSessionNegotiation>) {
        self.incoming_sessions.lock().unwrap().push(negotiation);
    }

    fn handle_outgoing_project_negotiation(&self, negotiation: Arc<OutgoingProjectNegotiation>) {
        self.outgoing_projects.lock().unwrap().push(negotiation);
    }

    fn handle_incoming_project_negotiation(&self, negotiation: Arc<IncomingProjectNegotiation>) {
        self.incoming_projects.lock().unwrap().push(negotiation);
    }
}

/// Drops every negotiation it is handed.
pub(crate) struct DroppingHandler;

impl NegotiationHandler for DroppingHandler {
    fn handle_outgoing_session_negotiation(&self, _negotiation: Arc<OutgoingSessionNegotiation>) {}

    fn handle_incoming_session_negotiation(&self, _negotiation: Arc<IncomingSessionNegotiation>) {}

    fn handle_outgoing_project_negotiation(&self, _negotiation: Arc<OutgoingProjectNegotiation>) {}

    fn handle_incoming_project_negotiation(&self, _negotiation: Arc<IncomingProjectNegotiation>) {}
}
