//! In-process transport: a hub that maps peer ids to inbound channels.
//!
//! Used by the demo binary and by tests to run several peers inside one
//! process without a network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tandem_common::{PeerId, TandemError};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use super::{Transport, TransportEvent};
use crate::protocol::NegotiationMessage;

const INBOX_CAPACITY: usize = 1024;

/// Thread-safe registry of connected peers.
#[derive(Clone, Default)]
pub struct LocalHub {
    peers: Arc<RwLock<HashMap<PeerId, mpsc::Sender<TransportEvent>>>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `peer` to the hub. A reconnecting peer replaces its old inbox.
    pub async fn connect(&self, peer: impl Into<PeerId>) -> Arc<HubTransport> {
        let peer = peer.into();
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.peers.write().await.insert(peer.clone(), tx);
        info!(peer = %peer, "Peer connected to hub");
        Arc::new(HubTransport {
            local: peer,
            hub: self.clone(),
            inbox: Mutex::new(Some(rx)),
        })
    }

    /// Drop `peer` and tell every remaining peer it is gone.
    pub async fn disconnect(&self, peer: &PeerId) -> bool {
        let remaining: Vec<mpsc::Sender<TransportEvent>> = {
            let mut map = self.peers.write().await;
            if map.remove(peer).is_none() {
                return false;
            }
            map.values().cloned().collect()
        };
        info!(peer = %peer, "Peer disconnected from hub");
        for tx in remaining {
            let _ = tx
                .send(TransportEvent::PeerLost { peer: peer.clone() })
                .await;
        }
        true
    }

    pub async fn is_connected(&self, peer: &PeerId) -> bool {
        self.peers.read().await.contains_key(peer)
    }

    /// Number of connected peers.
    pub async fn count(&self) -> usize {
        self.peers.read().await.len()
    }

    async fn route(
        &self,
        from: &PeerId,
        to: &PeerId,
        message: NegotiationMessage,
    ) -> tandem_common::Result<()> {
        let tx = self
            .peers
            .read()
            .await
            .get(to)
            .cloned()
            .ok_or_else(|| TandemError::Transport(format!("peer {to} is not connected")))?;
        debug!(from = %from, to = %to, kind = message.name(), "Routing message");
        tx.send(TransportEvent::Message {
            from: from.clone(),
            message,
        })
        .await
        .map_err(|_| TandemError::Transport(format!("inbox of {to} is closed")))
    }
}

/// One peer's view of a [`LocalHub`].
pub struct HubTransport {
    local: PeerId,
    hub: LocalHub,
    inbox: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
}

impl HubTransport {
    pub fn hub(&self) -> &LocalHub {
        &self.hub
    }
}

#[async_trait]
impl Transport for HubTransport {
    fn local_peer(&self) -> &PeerId {
        &self.local
    }

    async fn send(&self, to: &PeerId, message: NegotiationMessage) -> tandem_common::Result<()> {
        self.hub.route(&self.local, to, message).await
    }

    fn subscribe(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.inbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}
