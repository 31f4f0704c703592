//! Client session lifecycle: Connected → Authenticated → Disconnected.
//!
//! A session is created when the transport reports a connection, promoted
//! after a successful handshake and marked disconnected on DISCONNECT or
//! transport loss. Disconnected sessions are reaped at the next tick
//! boundary, which is when their player entity is despawned.

use std::collections::BTreeMap;

use strata_protocol::PeerId;
use tracing::{debug, info};

use crate::auth::AuthError;
use crate::entity::EntityId;

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport connected, no handshake yet.
    Connected,
    /// Handshake accepted; a player entity exists.
    Authenticated,
    /// Ended; awaiting the next tick boundary.
    Disconnected,
}

/// Per-connection session data.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSession {
    pub peer: PeerId,
    pub state: ConnectionState,
    /// Control-plane client id, set by the handshake.
    pub client_id: Option<String>,
    /// Player entity, set by the handshake.
    pub entity_id: Option<EntityId>,
    /// Malformed or disallowed messages received so far.
    pub protocol_errors: u32,
}

/// All sessions, iterated in peer order.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: BTreeMap<PeerId, ClientSession>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new connection. Reconnecting an existing peer id is a no-op.
    pub fn connect(&mut self, peer: PeerId) {
        self.sessions.entry(peer).or_insert_with(|| {
            debug!(%peer, "Session connected");
            ClientSession {
                peer,
                state: ConnectionState::Connected,
                client_id: None,
                entity_id: None,
                protocol_errors: 0,
            }
        });
    }

    pub fn get(&self, peer: PeerId) -> Option<&ClientSession> {
        self.sessions.get(&peer)
    }

    pub fn state(&self, peer: PeerId) -> Option<ConnectionState> {
        self.sessions.get(&peer).map(|s| s.state)
    }

    /// Check that `peer` may authenticate as `client_id`.
    pub fn can_authenticate(&self, peer: PeerId, client_id: &str) -> Result<(), AuthError> {
        if self.state(peer) == Some(ConnectionState::Authenticated) {
            return Err(AuthError::AlreadyAuthenticated);
        }
        let taken = self.sessions.values().any(|s| {
            s.peer != peer
                && s.state == ConnectionState::Authenticated
                && s.client_id.as_deref() == Some(client_id)
        });
        if taken {
            return Err(AuthError::DuplicateClient(client_id.to_string()));
        }
        Ok(())
    }

    /// Promote a connection after a successful handshake.
    pub fn authenticate(&mut self, peer: PeerId, client_id: &str, entity_id: EntityId) {
        self.connect(peer);
        if let Some(session) = self.sessions.get_mut(&peer) {
            session.state = ConnectionState::Authenticated;
            session.client_id = Some(client_id.to_string());
            session.entity_id = Some(entity_id);
            info!(%peer, client_id, entity_id, "Session authenticated");
        }
    }

    /// Mark a session ended. Returns `true` if it was live.
    pub fn mark_disconnected(&mut self, peer: PeerId) -> bool {
        match self.sessions.get_mut(&peer) {
            Some(session) if session.state != ConnectionState::Disconnected => {
                session.state = ConnectionState::Disconnected;
                debug!(%peer, "Session marked disconnected");
                true
            }
            _ => false,
        }
    }

    /// Count a protocol error against a peer and return the new total.
    pub fn record_protocol_error(&mut self, peer: PeerId) -> u32 {
        match self.sessions.get_mut(&peer) {
            Some(session) => {
                session.protocol_errors += 1;
                session.protocol_errors
            }
            None => 0,
        }
    }

    /// Authenticated peers in ascending order.
    pub fn authenticated_peers(&self) -> Vec<PeerId> {
        self.sessions
            .values()
            .filter(|s| s.state == ConnectionState::Authenticated)
            .map(|s| s.peer)
            .collect()
    }

    /// Authenticated sessions in ascending peer order.
    pub fn authenticated(&self) -> impl Iterator<Item = &ClientSession> {
        self.sessions
            .values()
            .filter(|s| s.state == ConnectionState::Authenticated)
    }

    /// Remove and return every disconnected session.
    pub fn reap_disconnected(&mut self) -> Vec<ClientSession> {
        let gone: Vec<PeerId> = self
            .sessions
            .values()
            .filter(|s| s.state == ConnectionState::Disconnected)
            .map(|s| s.peer)
            .collect();
        gone.into_iter()
            .filter_map(|peer| self.sessions.remove(&peer))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut table = SessionTable::new();
        let peer = PeerId(1);
        table.connect(peer);
        assert_eq!(table.state(peer), Some(ConnectionState::Connected));
        assert!(table.authenticated_peers().is_empty());

        table.authenticate(peer, "client_a", 7);
        assert_eq!(table.state(peer), Some(ConnectionState::Authenticated));
        assert_eq!(table.authenticated_peers(), vec![peer]);

        assert!(table.mark_disconnected(peer));
        assert!(!table.mark_disconnected(peer));
        assert!(table.authenticated_peers().is_empty());

        let reaped = table.reap_disconnected();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].entity_id, Some(7));
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_client_rejected() {
        let mut table = SessionTable::new();
        table.authenticate(PeerId(1), "client_a", 1);
        table.connect(PeerId(2));
        assert_eq!(
            table.can_authenticate(PeerId(2), "client_a"),
            Err(AuthError::DuplicateClient("client_a".into()))
        );
        assert!(table.can_authenticate(PeerId(2), "client_b").is_ok());
        assert_eq!(
            table.can_authenticate(PeerId(1), "client_c"),
            Err(AuthError::AlreadyAuthenticated)
        );
    }

    #[test]
    fn test_protocol_error_counter() {
        let mut table = SessionTable::new();
        table.connect(PeerId(3));
        assert_eq!(table.record_protocol_error(PeerId(3)), 1);
        assert_eq!(table.record_protocol_error(PeerId(3)), 2);
        assert_eq!(table.record_protocol_error(PeerId(4)), 0);
    }
}
