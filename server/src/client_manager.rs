//! Connection tracking for the presence relay
//!
//! This module handles the server-side bookkeeping of connected peers:
//! - Peer id assignment on join, capacity enforcement
//! - Address lookup so packets can be matched to the connection that sent them
//! - Activity tracking and timeout detection for peers that vanish without leaving
//!
//! It knows nothing about poses or rosters; that lives in [`crate::room`].

use log::info;
use shared::PeerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Default silence after which a connection is considered gone
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One connected peer as seen by the relay
#[derive(Debug)]
pub struct Client {
    /// Peer id assigned by the server
    pub id: PeerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: PeerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Marks the client as active now.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing has been heard from this client within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Ids are handed out monotonically from 1 and never reused within a server run, so
/// a late packet from a departed peer can never be mistaken for a newcomer.
pub struct ClientManager {
    /// Connected clients indexed by their peer id
    clients: HashMap<PeerId, Client>,
    /// Next available id for new connections
    next_client_id: PeerId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Returns the new peer id, or None if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<PeerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Returns true if the client was found and removed.
    pub fn remove_client(&mut self, client_id: &PeerId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PeerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// True if `client_id` is connected from exactly `addr`. Packets that claim an
    /// id belonging to another connection fail this check.
    pub fn owns(&self, client_id: PeerId, addr: SocketAddr) -> bool {
        self.clients
            .get(&client_id)
            .map_or(false, |client| client.addr == addr)
    }

    /// Records activity for a client. Returns false if the id is unknown.
    pub fn touch(&mut self, client_id: PeerId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Removes clients silent for longer than the configured timeout and returns
    /// their ids so the caller can announce the departures.
    pub fn check_timeouts(&mut self) -> Vec<PeerId> {
        let timed_out: Vec<PeerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(self.timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            info!("Client {} timed out", client_id);
            self.remove_client(client_id);
        }

        timed_out
    }

    /// All client ids with their addresses, for broadcasting
    pub fn get_client_addrs(&self) -> Vec<(PeerId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
