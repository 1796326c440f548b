//! Two in-process peers: a host shares directories and a guest receives them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tandem_common::{PeerId, ResourceRootId, TandemError};
use tandem_session::{
    AutoAcceptHandler, FsResourceProvider, LocalHub, NegotiationOutcome, ResourceSelection,
    Session, SessionConfig, SessionLifecycleListener, SessionManager,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// What to share, from where, and where the guest keeps it.
pub struct DemoPlan {
    pub host: PeerId,
    pub guest: PeerId,
    pub source: PathBuf,
    pub target: PathBuf,
    pub roots: Vec<String>,
}

/// Reports each root the guest finished receiving.
struct ReceiptListener {
    received: mpsc::UnboundedSender<ResourceRootId>,
}

impl SessionLifecycleListener for ReceiptListener {
    fn resources_available(&self, session: &Session, root: &ResourceRootId) {
        if let Some(shared) = session.root(root) {
            info!(root = %root, path = %shared.path, owner = %shared.owner, "Root received");
        }
        let _ = self.received.send(root.clone());
    }
}

/// Run the demo to completion and return the number of roots delivered.
pub async fn run(config: SessionConfig, plan: DemoPlan) -> Result<usize, TandemError> {
    let hub = LocalHub::new();

    let host = SessionManager::new(
        config.clone(),
        hub.connect(plan.host.clone()).await,
        Arc::new(FsResourceProvider::new(&plan.source)),
    );
    host.set_negotiation_handler(Arc::new(AutoAcceptHandler::new("")));

    let guest = SessionManager::new(
        config.clone(),
        hub.connect(plan.guest.clone()).await,
        Arc::new(FsResourceProvider::new(&plan.target)),
    );
    guest.set_negotiation_handler(Arc::new(AutoAcceptHandler::new("")));
    let (received_tx, mut received_rx) = mpsc::unbounded_channel();
    guest.add_listener(Arc::new(ReceiptListener {
        received: received_tx,
    }));

    let selection: ResourceSelection = plan.roots.iter().map(|r| (r.clone(), None)).collect();
    host.start_session(selection).await?;
    let shared = host.session().map(|s| s.roots().len()).unwrap_or(0);
    if shared == 0 {
        host.stop_session().await?;
        return Err(TandemError::Other(format!(
            "nothing to share under {}",
            plan.source.display()
        )));
    }
    info!(roots = shared, "Host session started");

    let invitation = host
        .invite(plan.guest.clone(), "tandem demo")
        .await
        .ok_or_else(|| TandemError::Other(format!("could not invite {}", plan.guest)))?;
    let outcome = invitation.handle().wait_terminal().await;
    if outcome != NegotiationOutcome::Completed {
        host.stop_session().await?;
        return Err(TandemError::Other(format!("invitation ended as {outcome:?}")));
    }

    let mut delivered = 0;
    let patience = config.acceptance_timeout + config.response_timeout;
    while delivered < shared {
        match tokio::time::timeout(patience, received_rx.recv()).await {
            Ok(Some(_)) => delivered += 1,
            Ok(None) => break,
            Err(_) => {
                warn!(delivered, expected = shared, "Gave up waiting for shared roots");
                break;
            }
        }
    }

    host.stop_session().await?;
    wait_for_leave(&guest, config.drain_timeout + Duration::from_secs(1)).await;
    Ok(delivered)
}

async fn wait_for_leave(guest: &SessionManager, limit: Duration) {
    let mut sessions = guest.subscribe();
    let left = tokio::time::timeout(limit, sessions.wait_for(|s| s.is_none()))
        .await
        .is_ok();
    if !left {
        warn!("Guest did not leave in time; stopping it locally");
        if let Err(e) = guest.stop_session().await {
            warn!(error = %e, "Could not stop guest session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(source: &std::path::Path, target: &std::path::Path, roots: &[&str]) -> DemoPlan {
        DemoPlan {
            host: PeerId::from("host"),
            guest: PeerId::from("guest"),
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            roots: roots.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn quick() -> SessionConfig {
        SessionConfig {
            acceptance_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(2),
            monitor_poll_interval: Duration::from_millis(10),
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn guest_receives_shared_directory() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("site/css")).unwrap();
        std::fs::write(source.path().join("site/index.html"), "<h1>hi</h1>").unwrap();
        std::fs::write(source.path().join("site/css/main.css"), "h1 {}").unwrap();

        let delivered = run(quick(), plan(source.path(), target.path(), &["site"]))
            .await
            .unwrap();

        assert_eq!(delivered, 1);
        let copied = std::fs::read_to_string(target.path().join("site/css/main.css")).unwrap();
        assert_eq!(copied, "h1 {}");
    }

    #[tokio::test]
    async fn missing_source_is_an_error() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();

        let result = run(quick(), plan(source.path(), target.path(), &["absent"])).await;

        assert!(matches!(result, Err(TandemError::Other(_))));
    }
}
