//! Transport-agnostic message channel.
//!
//! The simulation consumes [`InboundEvent`]s and answers through a
//! [`MessageSink`]; any concrete transport binds to these two seams.

use crate::messages::Message;

/// Transport-assigned identifier of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Something the transport observed on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A new connection was accepted.
    Connected(PeerId),
    /// A fully parsed message arrived.
    Message(PeerId, Message),
    /// A frame arrived but could not be decoded.
    Malformed(PeerId, String),
    /// The connection closed.
    Disconnected(PeerId),
}

impl InboundEvent {
    pub fn peer(&self) -> PeerId {
        match self {
            InboundEvent::Connected(p)
            | InboundEvent::Message(p, _)
            | InboundEvent::Malformed(p, _)
            | InboundEvent::Disconnected(p) => *p,
        }
    }
}

/// Outbound side of the channel. Delivery is best effort.
pub trait MessageSink {
    /// Queue a message for one peer.
    fn send(&mut self, peer: PeerId, message: Message);

    /// Queue the same message for several peers.
    fn broadcast(&mut self, peers: &[PeerId], message: Message) {
        for &peer in peers {
            self.send(peer, message.clone());
        }
    }

    /// Close a connection after flushing what was queued for it.
    fn disconnect(&mut self, peer: PeerId);
}

/// A [`MessageSink`] that keeps everything in memory. Used by tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Every delivered message in order, broadcasts expanded per peer.
    pub sent: Vec<(PeerId, Message)>,
    /// Peers that were told to disconnect.
    pub disconnected: Vec<PeerId>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered to `peer`.
    pub fn to_peer(&self, peer: PeerId) -> impl Iterator<Item = &Message> {
        self.sent
            .iter()
            .filter(move |(p, _)| *p == peer)
            .map(|(_, m)| m)
    }

    /// Drop everything recorded so far.
    pub fn clear(&mut self) {
        self.sent.clear();
        self.disconnected.clear();
    }
}

impl MessageSink for RecordingSink {
    fn send(&mut self, peer: PeerId, message: Message) {
        self.sent.push((peer, message));
    }

    fn disconnect(&mut self, peer: PeerId) {
        self.disconnected.push(peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{EntityDespawn, Ping};

    #[test]
    fn test_broadcast_expands_per_peer() {
        let mut sink = RecordingSink::new();
        let msg = Message::EntityDespawn(EntityDespawn { id: 3 });
        sink.broadcast(&[PeerId(1), PeerId(2)], msg.clone());
        assert_eq!(sink.sent.len(), 2);
        assert_eq!(sink.to_peer(PeerId(2)).next(), Some(&msg));
    }

    #[test]
    fn test_event_peer() {
        let ev = InboundEvent::Message(PeerId(4), Message::Ping(Ping { client_time: 0.0 }));
        assert_eq!(ev.peer(), PeerId(4));
        assert_eq!(InboundEvent::Disconnected(PeerId(9)).peer(), PeerId(9));
    }
}
