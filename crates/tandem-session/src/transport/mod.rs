//! Message transport between peers.
//!
//! The real network layer lives outside this crate. The session core only
//! needs to send a message to one peer and receive a stream of inbound
//! events; per-peer delivery is assumed FIFO.

mod hub;

pub use hub::{HubTransport, LocalHub};

use async_trait::async_trait;
use tandem_common::PeerId;
use tokio::sync::mpsc;

use crate::protocol::NegotiationMessage;

/// Something that happened on the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Message {
        from: PeerId,
        message: NegotiationMessage,
    },
    /// The transport lost its connection to `peer`.
    PeerLost { peer: PeerId },
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Address other peers use to reach us.
    fn local_peer(&self) -> &PeerId;

    async fn send(&self, to: &PeerId, message: NegotiationMessage) -> tandem_common::Result<()>;

    /// Hand out the inbound event stream. Only the first caller gets it.
    fn subscribe(&self) -> Option<mpsc::Receiver<TransportEvent>>;
}
