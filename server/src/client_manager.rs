//! Connection bookkeeping for the world server
//!
//! Each accepted TCP connection gets a connection id and an ordered outbound
//! queue. The queue is drained by one writer task per connection, so every
//! client sees the messages addressed to it in exactly the order they were
//! enqueued. A connection only receives world traffic once it has completed
//! the connect handshake and is bound to a player.

use log::{info, warn};
use shared::protocol::Envelope;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::UnboundedSender;

/// One live connection and the player it speaks for
#[derive(Debug)]
pub struct Client {
    /// Unique connection identifier assigned by the server
    pub id: u32,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// Player bound by the connect handshake
    pub player_id: Option<u32>,
    pub name: Option<String>,
    outbound: UnboundedSender<Envelope>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, outbound: UnboundedSender<Envelope>) -> Self {
        Self {
            id,
            addr,
            player_id: None,
            name: None,
            outbound,
        }
    }

    /// Queues an envelope for this connection's writer.
    ///
    /// Returns false if the writer is gone; the reader side notices the
    /// broken connection and cleans up.
    pub fn send(&self, envelope: Envelope) -> bool {
        self.outbound.send(envelope).is_ok()
    }
}

/// Manages all live connections
pub struct ClientManager {
    /// Connected clients indexed by connection id
    clients: HashMap<u32, Client>,
    /// Next available connection id
    next_client_id: u32,
    /// Maximum number of concurrent connections allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection. Returns `None` when the server is full.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        outbound: UnboundedSender<Envelope>,
    ) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Connection {} opened from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, outbound));
        Some(client_id)
    }

    /// Drops a connection and with it the outbound queue
    pub fn remove_client(&mut self, client_id: u32) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!("Connection {} closed", client.id);
        Some(client)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Completes the handshake for a connection
    pub fn bind_player(&mut self, client_id: u32, player_id: u32, name: &str) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.player_id = Some(player_id);
                client.name = Some(name.to_string());
                true
            }
            None => false,
        }
    }

    pub fn player_of(&self, client_id: u32) -> Option<u32> {
        self.clients.get(&client_id).and_then(|client| client.player_id)
    }

    /// Connection currently speaking for `player_id`
    pub fn find_by_player(&self, player_id: u32) -> Option<u32> {
        self.clients
            .values()
            .find(|client| client.player_id == Some(player_id))
            .map(|client| client.id)
    }

    pub fn send_to_client(&self, client_id: u32, envelope: Envelope) {
        if let Some(client) = self.clients.get(&client_id) {
            if !client.send(envelope) {
                warn!("Outbound queue for connection {} is closed", client_id);
            }
        }
    }

    pub fn send_to_player(&self, player_id: u32, envelope: Envelope) {
        if let Some(client_id) = self.find_by_player(player_id) {
            self.send_to_client(client_id, envelope);
        }
    }

    /// Queues an envelope for every connection bound to a player
    pub fn broadcast(&self, envelope: &Envelope) {
        for client in self.clients.values() {
            if client.player_id.is_some() && !client.send(envelope.clone()) {
                warn!("Outbound queue for connection {} is closed", client.id);
            }
        }
    }

    /// Ids of the players currently online, ascending
    pub fn player_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.clients.values().filter_map(|c| c.player_id).collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of open connections
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no connections are open
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::Packet;
    use tokio::sync::mpsc;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        assert_eq!(manager.add_client(test_addr(), tx1), Some(1));
        assert!(manager.add_client(test_addr(), tx2).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let (tx, _rx) = mpsc::unbounded_channel();
        let client_id = manager.add_client(test_addr(), tx).unwrap();

        assert!(manager.remove_client(client_id).is_some());
        assert!(manager.remove_client(client_id).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_broadcast_skips_unbound_connections() {
        let mut manager = ClientManager::new(4);
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let bound = manager.add_client(test_addr(), tx1).unwrap();
        manager.add_client(test_addr(), tx2).unwrap();
        assert!(manager.bind_player(bound, 42, "ada"));

        manager.broadcast(&Envelope::new(0, Packet::Heartbeat));

        assert_eq!(rx1.try_recv().unwrap().packet, Packet::Heartbeat);
        assert!(rx2.try_recv().is_err());
        assert_eq!(manager.player_ids(), vec![42]);
    }

    #[test]
    fn test_send_to_player_preserves_order() {
        let mut manager = ClientManager::new(4);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client_id = manager.add_client(test_addr(), tx).unwrap();
        manager.bind_player(client_id, 7, "bob");

        for player_id in 1..=3 {
            manager.send_to_player(7, Envelope::new(0, Packet::PlayerLeft { player_id }));
        }
        for player_id in 1..=3 {
            assert_eq!(
                rx.try_recv().unwrap().packet,
                Packet::PlayerLeft { player_id }
            );
        }
        assert_eq!(manager.find_by_player(7), Some(client_id));
        assert_eq!(manager.player_of(client_id), Some(7));
    }

    #[test]
    fn test_send_to_closed_queue_does_not_panic() {
        let mut manager = ClientManager::new(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = manager.add_client(test_addr(), tx).unwrap();
        drop(rx);
        manager.send_to_client(client_id, Envelope::new(0, Packet::Heartbeat));
        assert!(!manager.get(client_id).unwrap().send(Envelope::new(0, Packet::Heartbeat)));
    }
}
