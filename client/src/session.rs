//! Explicit multiplayer session context
//!
//! `MultiplayerSession` owns everything the replication core needs: the peer registry,
//! the outbound throttler and both ends of the transport channels. The render loop
//! holds it by value and calls [`MultiplayerSession::frame`] once per frame; nothing
//! in here blocks on I/O.

use crate::motion::LocalPlayer;
use crate::reconciler;
use crate::registry::PeerRegistry;
use crate::throttle::Throttler;
use log::{debug, info, warn};
use shared::{
    AnimationTag, Packet, PeerId, PeerInfo, PeerProfile, ProtocolError, RosterEntry, Vec3,
    PROTOCOL_VERSION,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Keep-alive spacing while joined
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// How long to wait for a join response before asking again
pub const JOIN_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Typed events the transport pushes toward the core
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Joined {
        local: PeerInfo,
        roster: Vec<RosterEntry>,
    },
    PeerJoined(RosterEntry),
    PeerMoved {
        id: PeerId,
        position: Vec3,
        rotation: f32,
        animation: AnimationTag,
    },
    PeerLeft {
        id: PeerId,
    },
    Disconnected {
        reason: String,
    },
}

impl TryFrom<Packet> for InboundEvent {
    type Error = ProtocolError;

    fn try_from(packet: Packet) -> Result<Self, Self::Error> {
        match packet {
            Packet::Joined { local, roster } => Ok(InboundEvent::Joined { local, roster }),
            Packet::PeerJoined { entry } => Ok(InboundEvent::PeerJoined(entry)),
            Packet::PeerMoved {
                id,
                position,
                rotation,
                animation,
            } => Ok(InboundEvent::PeerMoved {
                id,
                position,
                rotation,
                animation,
            }),
            Packet::PeerLeft { id } => Ok(InboundEvent::PeerLeft { id }),
            Packet::Rejected { reason } => Ok(InboundEvent::Disconnected { reason }),
            other => Err(ProtocolError::UnexpectedPacket(other.name())),
        }
    }
}

/// Fire-and-forget requests the core hands to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    Join {
        profile: PeerProfile,
        position: Vec3,
        rotation: f32,
    },
    Move {
        id: PeerId,
        position: Vec3,
        rotation: f32,
        animation: AnimationTag,
    },
    Heartbeat {
        id: PeerId,
    },
    Leave {
        id: PeerId,
    },
}

impl From<OutboundRequest> for Packet {
    fn from(request: OutboundRequest) -> Self {
        match request {
            OutboundRequest::Join {
                profile,
                position,
                rotation,
            } => Packet::Join {
                protocol_version: PROTOCOL_VERSION,
                profile,
                position,
                rotation,
            },
            OutboundRequest::Move {
                id,
                position,
                rotation,
                animation,
            } => Packet::Move {
                id,
                position,
                rotation,
                animation,
            },
            OutboundRequest::Heartbeat { id } => Packet::Heartbeat { id },
            OutboundRequest::Leave { id } => Packet::Leave { id },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Idle,
    Joining,
    Joined(PeerId),
    Disconnected(String),
}

pub struct MultiplayerSession {
    profile: PeerProfile,
    state: ConnectionState,
    registry: PeerRegistry,
    throttler: Throttler,
    last_outbound: Option<Instant>,
    inbound: UnboundedReceiver<InboundEvent>,
    outbound: UnboundedSender<OutboundRequest>,
}

impl MultiplayerSession {
    pub fn new(
        profile: PeerProfile,
        spawn_position: Vec3,
        spawn_rotation: f32,
        outbound: UnboundedSender<OutboundRequest>,
        inbound: UnboundedReceiver<InboundEvent>,
    ) -> Self {
        Self {
            profile,
            state: ConnectionState::Idle,
            registry: PeerRegistry::new(),
            throttler: Throttler::new(spawn_position, spawn_rotation),
            last_outbound: None,
            inbound,
            outbound,
        }
    }

    pub fn profile(&self) -> &PeerProfile {
        &self.profile
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn local_id(&self) -> Option<PeerId> {
        match self.state {
            ConnectionState::Joined(id) => Some(id),
            _ => None,
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn throttler(&self) -> &Throttler {
        &self.throttler
    }

    /// Announces the local player at the last pose the room was told about, which is
    /// the spawn pose until something has been published.
    pub fn join(&mut self, now: Instant) {
        let announced = self.throttler.state();
        let (position, rotation) = (announced.last_sent_position, announced.last_sent_rotation);
        info!(
            "Joining as {} ({} {})",
            self.profile.display_name, self.profile.appearance.color, self.profile.appearance.class
        );
        self.state = ConnectionState::Joining;
        self.send(OutboundRequest::Join {
            profile: self.profile.clone(),
            position,
            rotation,
        });
        self.last_outbound = Some(now);
    }

    pub fn handle_event(&mut self, event: InboundEvent, now: Instant) {
        match event {
            InboundEvent::Joined { local, roster } => {
                info!(
                    "Joined as peer {} with {} others present",
                    local.id,
                    roster.len()
                );
                self.state = ConnectionState::Joined(local.id);
                self.registry.set_local_id(Some(local.id));
                for entry in roster {
                    self.registry.upsert_from_roster(entry, now);
                }
            }
            InboundEvent::PeerJoined(entry) => {
                self.registry.upsert_from_roster(entry, now);
            }
            InboundEvent::PeerMoved {
                id,
                position,
                rotation,
                animation,
            } => {
                self.registry
                    .apply_sample(id, position, rotation, animation, now);
            }
            InboundEvent::PeerLeft { id } => {
                self.registry.remove(id);
            }
            InboundEvent::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.registry.clear();
                self.registry.set_local_id(None);
                self.state = ConnectionState::Disconnected(reason);
            }
        }
    }

    /// Applies every queued inbound event in arrival order. Returns how many were applied.
    pub fn drain_inbound(&mut self, now: Instant) -> usize {
        let mut applied = 0;
        loop {
            match self.inbound.try_recv() {
                Ok(event) => {
                    self.handle_event(event, now);
                    applied += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !matches!(self.state, ConnectionState::Disconnected(_)) {
                        self.handle_event(
                            InboundEvent::Disconnected {
                                reason: "Transport closed".to_string(),
                            },
                            now,
                        );
                        applied += 1;
                    }
                    break;
                }
            }
        }
        applied
    }

    /// Sends the local pose if the throttler lets it through. Returns true if sent.
    pub fn publish_local(&mut self, local: &LocalPlayer, now: Instant) -> bool {
        let Some(id) = self.local_id() else {
            return false;
        };

        let animation = local.animation_tag();
        if !self
            .throttler
            .try_send(local.position, local.rotation, animation, now)
        {
            return false;
        }

        debug!(
            "Move ({:.2}, {:.2}, {:.2}) rot {:.2} {}",
            local.position.x,
            local.position.y,
            local.position.z,
            local.rotation,
            animation.as_str()
        );
        self.send(OutboundRequest::Move {
            id,
            position: local.position,
            rotation: local.rotation,
            animation,
        });
        self.last_outbound = Some(now);
        true
    }

    /// Keeps an idle but joined client alive on the relay, repeats an unanswered
    /// join and joins again after the relay dropped us. Returns true if anything was sent.
    pub fn heartbeat(&mut self, now: Instant) -> bool {
        let interval = match self.state {
            ConnectionState::Joined(_) => HEARTBEAT_INTERVAL,
            ConnectionState::Joining => JOIN_RETRY_INTERVAL,
            ConnectionState::Disconnected(_) if !self.outbound.is_closed() => JOIN_RETRY_INTERVAL,
            _ => return false,
        };

        if let Some(last) = self.last_outbound {
            if now.saturating_duration_since(last) < interval {
                return false;
            }
        }

        match self.local_id() {
            Some(id) => {
                self.send(OutboundRequest::Heartbeat { id });
                self.last_outbound = Some(now);
            }
            None => {
                debug!("Not in the room, joining again");
                self.join(now);
            }
        }
        true
    }

    /// One render frame: inbound events, reconciliation, then the outbound path.
    pub fn frame(&mut self, local: &LocalPlayer, now: Instant, dt: f32) {
        self.drain_inbound(now);
        reconciler::reconcile(&mut self.registry, now, dt);
        self.publish_local(local, now);
        self.heartbeat(now);
    }

    /// Best-effort goodbye; the session is gone afterwards either way.
    pub fn leave(self) {
        if let Some(id) = self.local_id() {
            info!("Leaving as peer {}", id);
            self.send(OutboundRequest::Leave { id });
        }
    }

    fn send(&self, request: OutboundRequest) {
        if let Err(e) = self.outbound.send(request) {
            warn!("Dropping outbound {:?}: transport closed", e.0);
        }
    }
}
