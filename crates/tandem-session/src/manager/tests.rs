//! Tests for session start/join/stop and the manager's guards.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tandem_common::{PeerId, SessionId, TandemError};

use super::{ManagerState, SessionLifecycleListener, SessionManager, Transition, TRANSITION};
use crate::config::SessionConfig;
use crate::negotiation::{NegotiationKind, NegotiationState};
use crate::protocol::ParticipantInfo;
use crate::resources::{MemoryResourceProvider, ResourceSelection};
use crate::session::Permission;
use crate::testing::{
    fast_config, manager_on, whole_roots, DroppingHandler, HoldingHandler, PanickingListener,
    RecordingListener,
};
use crate::transport::LocalHub;

async fn host_with(
    provider: MemoryResourceProvider,
    config: SessionConfig,
) -> (Arc<SessionManager>, Arc<RecordingListener>) {
    let hub = LocalHub::new();
    let manager = manager_on(&hub, "host", Arc::new(provider), config).await;
    let listener = Arc::new(RecordingListener::default());
    manager.add_listener(listener.clone());
    (manager, listener)
}

async fn host() -> (Arc<SessionManager>, Arc<RecordingListener>) {
    host_with(MemoryResourceProvider::new(), fast_config()).await
}

// -- start / join --

#[tokio::test]
async fn start_session_creates_hosted_session() {
    let (manager, listener) = host().await;
    assert_eq!(manager.state(), ManagerState::NoSession);

    manager.start_session(ResourceSelection::new()).await.unwrap();

    let session = manager.session().expect("session should be active");
    assert!(session.is_host());
    assert_eq!(session.host(), manager.local_peer());
    assert_eq!(session.participants().len(), 1);
    assert_eq!(manager.state(), ManagerState::Active);
    assert_eq!(listener.events(), vec!["starting", "started"]);
}

#[tokio::test]
async fn second_start_leaves_original_session() {
    let (manager, listener) = host().await;
    manager.start_session(ResourceSelection::new()).await.unwrap();
    let first = manager.session().unwrap().id().clone();

    manager.start_session(ResourceSelection::new()).await.unwrap();

    assert_eq!(manager.session().unwrap().id(), &first);
    assert_eq!(listener.events(), vec!["starting", "started"]);
}

#[tokio::test]
async fn join_while_active_is_rejected() {
    let (manager, _) = host().await;
    manager.start_session(ResourceSelection::new()).await.unwrap();
    let first = manager.session().unwrap().id().clone();

    let err = manager
        .join_session(SessionId::new(), PeerId::from("other"), &[])
        .unwrap_err();

    assert!(matches!(err, TandemError::IllegalState(_)));
    assert_eq!(manager.session().unwrap().id(), &first);
}

#[tokio::test]
async fn start_after_join_is_ignored() {
    let (manager, _) = host().await;
    let joined = manager
        .join_session(SessionId::from("s1"), PeerId::from("alice"), &[])
        .unwrap();
    assert!(!joined.is_host());

    manager.start_session(ResourceSelection::new()).await.unwrap();

    assert_eq!(manager.session().unwrap().id(), &SessionId::from("s1"));
}

#[tokio::test]
async fn joined_session_uses_host_participants() {
    let (manager, listener) = host().await;
    let participants = vec![ParticipantInfo {
        peer: PeerId::from("alice"),
        permission: Permission::ReadWrite,
        host: true,
    }];

    let session = manager
        .join_session(SessionId::from("s1"), PeerId::from("alice"), &participants)
        .unwrap();

    assert_eq!(session.host(), &PeerId::from("alice"));
    assert_eq!(session.permission(manager.local_peer()), Some(Permission::ReadOnly));
    assert_eq!(manager.state(), ManagerState::Active);
    assert_eq!(listener.events(), vec!["starting", "started"]);
}

// -- resources --

#[tokio::test]
async fn unopenable_root_is_skipped() {
    let provider = MemoryResourceProvider::new()
        .with_file("rootA", "a.txt", b"a")
        .with_file("rootB", "b.txt", b"b")
        .fail_open("rootB");
    let (manager, listener) = host_with(provider, fast_config()).await;

    manager
        .start_session(whole_roots(&["rootA", "rootB"]))
        .await
        .unwrap();

    let session = manager.session().unwrap();
    assert_eq!(manager.state(), ManagerState::Active);
    let roots = session.roots();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].path, "rootA");
    let available: Vec<String> = listener
        .events()
        .into_iter()
        .filter(|e| e.starts_with("resources:"))
        .collect();
    assert_eq!(available, vec![format!("resources:{}", roots[0].id)]);
}

#[tokio::test]
async fn adding_shared_root_again_offers_nothing() {
    let provider = MemoryResourceProvider::new().with_file("proj", "a.txt", b"a");
    let (manager, _) = host_with(provider, fast_config()).await;
    manager.set_negotiation_handler(Arc::new(HoldingHandler::default()));
    manager.start_session(whole_roots(&["proj"])).await.unwrap();
    manager
        .session()
        .unwrap()
        .add_participant(PeerId::from("bob"), Permission::ReadOnly);

    let offered = manager.add_resources_to_session(whole_roots(&["proj"])).await;

    assert!(offered.is_empty());
}

#[tokio::test]
async fn adding_resources_offers_to_each_remote_participant() {
    let provider = MemoryResourceProvider::new()
        .with_root("proj")
        .with_file("docs", "guide.md", b"read me");
    let (manager, listener) = host_with(provider, fast_config()).await;
    let handler = Arc::new(HoldingHandler::default());
    manager.set_negotiation_handler(handler.clone());
    manager.start_session(whole_roots(&["proj"])).await.unwrap();
    let session = manager.session().unwrap();
    session.add_participant(PeerId::from("bob"), Permission::ReadOnly);
    session.add_participant(PeerId::from("carol"), Permission::ReadOnly);

    let offered = manager.add_resources_to_session(whole_roots(&["docs"])).await;

    assert_eq!(offered.len(), 2);
    assert_eq!(handler.outgoing_projects.lock().unwrap().len(), 2);
    assert!(offered.iter().all(|n| n.roots()[0].path == "docs"));
    assert_eq!(session.roots().len(), 2);
    assert_eq!(
        listener
            .events()
            .iter()
            .filter(|e| e.starts_with("resources:"))
            .count(),
        2
    );
}

#[tokio::test]
async fn read_only_peer_cannot_add_resources() {
    let provider = MemoryResourceProvider::new().with_root("proj");
    let (manager, _) = host_with(provider, fast_config()).await;
    manager.set_negotiation_handler(Arc::new(HoldingHandler::default()));
    manager
        .join_session(SessionId::from("s1"), PeerId::from("alice"), &[])
        .unwrap();

    let offered = manager.add_resources_to_session(whole_roots(&["proj"])).await;

    assert!(offered.is_empty());
    assert!(manager.session().unwrap().roots().is_empty());
}

// -- stop --

#[tokio::test]
async fn stop_without_session_is_noop() {
    let (manager, listener) = host().await;
    manager.stop_session().await.unwrap();
    manager.stop_session().await.unwrap();
    assert_eq!(manager.state(), ManagerState::NoSession);
    assert!(listener.events().is_empty());
}

#[tokio::test]
async fn stop_tears_down_session_in_order() {
    let provider = Arc::new(MemoryResourceProvider::new().with_root("proj"));
    let hub = LocalHub::new();
    let manager = manager_on(&hub, "host", provider.clone(), fast_config()).await;
    let listener = Arc::new(RecordingListener::default());
    manager.add_listener(listener.clone());
    let mut watch = manager.subscribe();
    manager.start_session(whole_roots(&["proj"])).await.unwrap();
    assert!(watch.borrow_and_update().is_some());

    manager.stop_session().await.unwrap();

    assert!(manager.session().is_none());
    assert!(watch.borrow_and_update().is_none());
    assert_eq!(manager.state(), ManagerState::NoSession);
    assert_eq!(provider.closed(), vec!["proj"]);
    let events = listener.events();
    let tail: Vec<&str> = events.iter().rev().take(2).rev().map(String::as_str).collect();
    assert_eq!(tail, vec!["ending", "ended"]);
}

#[tokio::test]
async fn stop_cancels_idle_negotiations() {
    let (manager, _) = host().await;
    manager.set_negotiation_handler(Arc::new(HoldingHandler::default()));
    manager.start_session(ResourceSelection::new()).await.unwrap();
    let negotiation = manager
        .invite(PeerId::from("bob"), "pair?")
        .await
        .expect("invitation should be created");

    manager.stop_session().await.unwrap();

    assert_eq!(negotiation.handle().state(), NegotiationState::Cancelled);
    assert!(manager.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_gives_up_on_lock_held_by_slow_start() {
    let provider = MemoryResourceProvider::new()
        .with_root("proj")
        .slow_open(Duration::from_millis(1500));
    let config = SessionConfig {
        lock_timeout: Duration::from_millis(200),
        ..fast_config()
    };
    let (manager, _) = host_with(provider, config).await;

    let starter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start_session(whole_roots(&["proj"])).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let began = Instant::now();
    manager.stop_session().await.unwrap();
    let waited = began.elapsed();

    assert!(waited >= Duration::from_millis(150), "stop returned too early: {waited:?}");
    assert!(waited < Duration::from_millis(1000), "stop blocked for {waited:?}");
    starter.await.unwrap().unwrap();
    assert!(manager.session().is_some());
    assert_eq!(manager.session().unwrap().roots().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_is_bounded_by_unresponsive_negotiation() {
    let config = SessionConfig {
        drain_timeout: Duration::from_millis(300),
        ..fast_config()
    };
    let (manager, listener) = host_with(MemoryResourceProvider::new(), config).await;
    manager.set_negotiation_handler(Arc::new(HoldingHandler::default()));
    manager.start_session(ResourceSelection::new()).await.unwrap();
    let negotiation = manager.invite(PeerId::from("bob"), "pair?").await.unwrap();
    // Claimed by a driver that never reaches a suspension point again.
    assert!(negotiation.handle().begin_run());

    let began = Instant::now();
    manager.stop_session().await.unwrap();
    let waited = began.elapsed();

    assert!(waited >= Duration::from_millis(300));
    assert!(waited < Duration::from_millis(1500), "stop blocked for {waited:?}");
    assert!(manager.session().is_none());
    assert!(listener.events().contains(&"ended".to_string()));
    assert_eq!(manager.registry().len(), 1);
}

// -- invitations --

#[tokio::test]
async fn duplicate_invite_creates_one_negotiation() {
    let (manager, _) = host().await;
    let handler = Arc::new(HoldingHandler::default());
    manager.set_negotiation_handler(handler.clone());
    manager.start_session(ResourceSelection::new()).await.unwrap();
    let bob = PeerId::from("bob");

    let first = manager.invite(bob.clone(), "pair?").await;
    let second = manager.invite(bob.clone(), "pair?").await;

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(handler.outgoing_sessions.lock().unwrap().len(), 1);
    let for_bob: Vec<_> = manager
        .negotiations()
        .into_iter()
        .filter(|r| r.peer == bob && r.kind == NegotiationKind::Session)
        .collect();
    assert_eq!(for_bob.len(), 1);
}

#[tokio::test]
async fn invite_all_skips_participants() {
    let (manager, _) = host().await;
    let handler = Arc::new(HoldingHandler::default());
    manager.set_negotiation_handler(handler.clone());
    manager.start_session(ResourceSelection::new()).await.unwrap();
    manager
        .session()
        .unwrap()
        .add_participant(PeerId::from("bob"), Permission::ReadOnly);

    let invited = manager
        .invite_all(
            [PeerId::from("bob"), PeerId::from("carol"), PeerId::from("dave")],
            "pair?",
        )
        .await;

    let mut peers: Vec<_> = invited.iter().map(|n| n.peer().clone()).collect();
    peers.sort();
    assert_eq!(peers, vec![PeerId::from("carol"), PeerId::from("dave")]);
}

#[tokio::test]
async fn invite_without_session_is_dropped() {
    let (manager, _) = host().await;
    manager.set_negotiation_handler(Arc::new(HoldingHandler::default()));
    assert!(manager.invite(PeerId::from("bob"), "pair?").await.is_none());
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn guest_cannot_invite() {
    let (manager, _) = host().await;
    manager.set_negotiation_handler(Arc::new(HoldingHandler::default()));
    manager
        .join_session(SessionId::from("s1"), PeerId::from("alice"), &[])
        .unwrap();
    assert!(manager.invite(PeerId::from("bob"), "pair?").await.is_none());
}

#[tokio::test]
async fn abandoned_invitation_deregisters_itself() {
    let (manager, _) = host().await;
    manager.set_negotiation_handler(Arc::new(DroppingHandler));
    manager.start_session(ResourceSelection::new()).await.unwrap();

    let negotiation = manager.invite(PeerId::from("bob"), "pair?").await.unwrap();
    assert_eq!(manager.registry().len(), 1);
    drop(negotiation);

    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn invitation_without_handler_is_cancelled() {
    let (manager, _) = host().await;
    manager.start_session(ResourceSelection::new()).await.unwrap();

    let negotiation = manager.invite(PeerId::from("bob"), "pair?").await.unwrap();

    assert_eq!(negotiation.handle().state(), NegotiationState::Cancelled);
    assert!(manager.registry().is_empty());
}

// -- permissions --

#[tokio::test]
async fn only_host_changes_permissions() {
    let (manager, _) = host().await;
    manager
        .join_session(SessionId::from("s1"), PeerId::from("alice"), &[])
        .unwrap();
    let own = manager.local_peer().clone();
    assert!(!manager.change_permission(&own, Permission::ReadWrite).await);
    assert!(!manager.session().unwrap().has_write_access(&own));
}

#[tokio::test]
async fn host_grants_write_access() {
    let (manager, _) = host().await;
    manager.start_session(ResourceSelection::new()).await.unwrap();
    let bob = PeerId::from("bob");
    manager
        .session()
        .unwrap()
        .add_participant(bob.clone(), Permission::ReadOnly);

    // bob is not connected; the broadcast failure is only logged.
    assert!(manager.change_permission(&bob, Permission::ReadWrite).await);
    assert!(manager.session().unwrap().has_write_access(&bob));
    assert!(!manager
        .change_permission(&PeerId::from("nobody"), Permission::ReadWrite)
        .await);
}

// -- listeners and re-entrancy --

#[tokio::test]
async fn panicking_listener_does_not_starve_others() {
    let hub = LocalHub::new();
    let manager = manager_on(
        &hub,
        "host",
        Arc::new(MemoryResourceProvider::new()),
        fast_config(),
    )
    .await;
    let recording = Arc::new(RecordingListener::default());
    manager.add_listener(Arc::new(PanickingListener));
    manager.add_listener(recording.clone());

    manager.start_session(ResourceSelection::new()).await.unwrap();

    assert_eq!(recording.events(), vec!["starting", "started"]);
    assert_eq!(manager.state(), ManagerState::Active);
}

#[tokio::test]
async fn removed_listener_is_not_called() {
    let (manager, listener) = host().await;
    let as_dyn: Arc<dyn SessionLifecycleListener> = listener.clone();
    manager.remove_listener(&as_dyn);
    manager.start_session(ResourceSelection::new()).await.unwrap();
    assert!(listener.events().is_empty());
}

#[tokio::test]
async fn stop_inside_start_is_illegal() {
    let (manager, _) = host().await;
    let result = TRANSITION
        .scope(Transition::Starting, manager.stop_session())
        .await;
    assert!(matches!(result, Err(TandemError::IllegalState(_))));
}

#[tokio::test]
async fn start_inside_stop_is_illegal() {
    let (manager, _) = host().await;
    let result = TRANSITION
        .scope(Transition::Stopping, manager.start_session(ResourceSelection::new()))
        .await;
    assert!(matches!(result, Err(TandemError::IllegalState(_))));
    assert!(manager.session().is_none());
}

#[tokio::test]
async fn recursive_start_is_ignored() {
    let (manager, _) = host().await;
    TRANSITION
        .scope(Transition::Starting, manager.start_session(ResourceSelection::new()))
        .await
        .unwrap();
    assert!(manager.session().is_none());
}
