//! Server network layer: UDP relay with roster hand-off and sender exclusion

use crate::client_manager::ClientManager;
use crate::room::Room;
use log::{debug, error, info, warn};
use shared::{
    decode_packet, encode_packet, AnimationTag, Packet, PeerId, PeerInfo, ProtocolError,
    RosterEntry, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How often connections are checked for silence
pub const TIMEOUT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Sent to an address that talks as a peer the relay no longer knows
pub const UNKNOWN_SESSION: &str = "Unknown session";

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    /// A join that failed validation; the sender gets told why
    InvalidJoin {
        addr: SocketAddr,
        reason: String,
    },
    ClientTimeout {
        client_id: PeerId,
    },
}

/// Messages sent from the relay loop to the sender task
#[derive(Debug)]
pub enum RelayMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<PeerId>,
    },
}

/// Presence relay. Forwards joins, moves and leaves between clients; it never
/// simulates or corrects movement.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    room: Room,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    relay_tx: mpsc::UnboundedSender<RelayMessage>,
    relay_rx: mpsc::UnboundedReceiver<RelayMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        max_clients: usize,
        timeout: Duration,
        room_code: &str,
    ) -> Result<Self, BoxError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients, timeout))),
            room: Room::new(room_code),
            server_tx,
            server_rx,
            relay_tx,
            relay_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BoxError> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                let (len, addr) = match socket.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                };

                let message = match decode_packet(&buffer[..len]) {
                    Ok(packet) if packet.is_client_bound() => {
                        warn!("Ignoring {} sent to the server by {}", packet.name(), addr);
                        continue;
                    }
                    Ok(packet) => ServerMessage::PacketReceived { packet, addr },
                    Err(e @ ProtocolError::InvalidDisplayName { .. }) => ServerMessage::InvalidJoin {
                        addr,
                        reason: e.to_string(),
                    },
                    Err(e) => {
                        warn!("Discarding packet from {}: {}", addr, e);
                        continue;
                    }
                };

                if let Err(e) = server_tx.send(message) {
                    error!("Failed to send packet to main loop: {}", e);
                    break;
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut relay_rx = std::mem::replace(&mut self.relay_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = relay_rx.recv().await {
                match message {
                    RelayMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    RelayMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TIMEOUT_CHECK_INTERVAL);

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), BoxError> {
        let data = encode_packet(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.relay_tx.send(RelayMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Queues `packet` for every client except `exclude`, normally its originator.
    fn broadcast_packet(&self, packet: Packet, exclude: Option<PeerId>) {
        if let Err(e) = self
            .relay_tx
            .send(RelayMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    fn reject(&self, reason: &str, addr: SocketAddr) {
        warn!("Rejecting {}: {}", addr, reason);
        self.send_packet(
            Packet::Rejected {
                reason: reason.to_string(),
            },
            addr,
        );
    }

    /// Drops a peer from the room and tells everyone else.
    fn announce_departure(&mut self, client_id: PeerId) {
        if self.room.leave(client_id).is_some() {
            self.broadcast_packet(Packet::PeerLeft { id: client_id }, Some(client_id));
        }
    }

    /// True if the packet's claimed id belongs to the connection it came from.
    async fn authorize(&self, client_id: PeerId, addr: SocketAddr) -> bool {
        let mut clients = self.clients.write().await;
        if clients.owns(client_id, addr) {
            clients.touch(client_id);
            true
        } else {
            debug!("Dropping packet for peer {} from {}", client_id, addr);
            false
        }
    }

    /// Processes one incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Join {
                protocol_version,
                profile,
                position,
                rotation,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    let error = ProtocolError::VersionMismatch {
                        got: protocol_version,
                        expected: PROTOCOL_VERSION,
                    };
                    self.reject(&error.to_string(), addr);
                    return;
                }

                // Replace the existing identity for this address, if any
                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.clients.write().await.remove_client(&existing_id);
                    self.announce_departure(existing_id);
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                let Some(client_id) = client_id else {
                    self.reject("Server full", addr);
                    return;
                };

                let local = PeerInfo::new(client_id, profile);
                let roster = self.room.join(local.clone(), position, rotation);
                self.send_packet(
                    Packet::Joined {
                        local: local.clone(),
                        roster,
                    },
                    addr,
                );
                self.broadcast_packet(
                    Packet::PeerJoined {
                        entry: RosterEntry {
                            peer: local,
                            position,
                            rotation,
                            animation: AnimationTag::Idle,
                        },
                    },
                    Some(client_id),
                );
            }

            Packet::Move {
                id,
                position,
                rotation,
                animation,
            } => {
                if !self.authorize(id, addr).await {
                    self.reject_stranger(addr, UNKNOWN_SESSION).await;
                    return;
                }

                self.room.update_pose(id, position, rotation, animation);
                self.broadcast_packet(
                    Packet::PeerMoved {
                        id,
                        position,
                        rotation,
                        animation,
                    },
                    Some(id),
                );
            }

            Packet::Heartbeat { id } => {
                if !self.authorize(id, addr).await {
                    self.reject_stranger(addr, UNKNOWN_SESSION).await;
                }
            }

            Packet::Leave { id } => {
                if !self.authorize(id, addr).await {
                    return;
                }

                self.clients.write().await.remove_client(&id);
                self.announce_departure(id);
            }

            other => {
                warn!("Unexpected {} from client at {}", other.name(), addr);
            }
        }
    }

    /// Rejects `addr` unless it belongs to a connected client. A timed-out client
    /// learns it has to join again; a connected one is never kicked by a bad packet.
    async fn reject_stranger(&self, addr: SocketAddr, reason: &str) {
        let known = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr).is_some()
        };
        if !known {
            self.reject(reason, addr);
        }
    }

    /// Main server loop; returns when the message channel closes.
    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully in room {}", self.room.code());

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr).await;
                }
                ServerMessage::InvalidJoin { addr, reason } => {
                    self.reject_stranger(addr, &reason).await;
                }
                ServerMessage::ClientTimeout { client_id } => {
                    self.announce_departure(client_id);
                }
            }
        }

        Ok(())
    }
}
