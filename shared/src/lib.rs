use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod appearance;
pub mod math;

pub use appearance::{Appearance, Color, PlayerClass};
pub use math::{shortest_angle_delta, wrap_angle, PlanarVelocity, Vec3};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_DISPLAY_NAME_LEN: usize = 16;
pub const MAX_DATAGRAM_SIZE: usize = 8192;

// World and local motion
pub const PLAY_AREA_RADIUS: f32 = 100.0;
pub const GROUND_HEIGHT: f32 = 0.0;
pub const GRAVITY: f32 = 20.0;
pub const JUMP_VELOCITY: f32 = 8.0;
pub const MOVE_SPEED: f32 = 5.0;
pub const RUN_MULTIPLIER: f32 = 2.0;
pub const CROUCH_MULTIPLIER: f32 = 0.5;
pub const TURN_SPEED: f32 = 3.0;

pub type PeerId = u32;

/// Animation a peer wants its avatar to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnimationTag {
    #[default]
    Idle,
    Walk,
    Run,
    Jump,
    Crouch,
}

impl AnimationTag {
    /// Seconds a one-shot animation plays before falling back to idle
    pub const JUMP_DURATION: f32 = 0.6;

    pub fn is_one_shot(&self) -> bool {
        matches!(self, AnimationTag::Jump)
    }

    pub fn one_shot_duration(&self) -> Option<f32> {
        match self {
            AnimationTag::Jump => Some(Self::JUMP_DURATION),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnimationTag::Idle => "idle",
            AnimationTag::Walk => "walk",
            AnimationTag::Run => "run",
            AnimationTag::Jump => "jump",
            AnimationTag::Crouch => "crouch",
        }
    }
}

/// What a client announces about itself when joining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerProfile {
    pub display_name: String,
    pub appearance: Appearance,
}

/// A profile once the relay has assigned it an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub display_name: String,
    pub appearance: Appearance,
}

impl PeerInfo {
    pub fn new(id: PeerId, profile: PeerProfile) -> Self {
        Self {
            id,
            display_name: profile.display_name,
            appearance: profile.appearance,
        }
    }
}

/// One present peer and its last known pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub peer: PeerInfo,
    pub position: Vec3,
    pub rotation: f32,
    /// Animation the relay last saw; `Idle` for a peer that has not moved yet
    pub animation: AnimationTag,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("packet codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("display name must be 1 to {max} characters, got {len}")]
    InvalidDisplayName { len: usize, max: usize },
    #[error("invalid color {0:?}, expected #rrggbb")]
    InvalidColor(String),
    #[error("unknown player class {0:?}")]
    UnknownClass(String),
    #[error("non-finite value in field `{0}`")]
    NonFinite(&'static str),
    #[error("unsupported protocol version {got}, expected {expected}")]
    VersionMismatch { got: u32, expected: u32 },
    #[error("packet {0} is not valid in this direction")]
    UnexpectedPacket(&'static str),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Join {
        protocol_version: u32,
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

    Joined {
        local: PeerInfo,
        roster: Vec<RosterEntry>,
    },
    PeerJoined {
        entry: RosterEntry,
    },
    PeerMoved {
        id: PeerId,
        position: Vec3,
        rotation: f32,
        animation: AnimationTag,
    },
    PeerLeft {
        id: PeerId,
    },
    Rejected {
        reason: String,
    },
}

impl Packet {
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Join { .. } => "Join",
            Packet::Move { .. } => "Move",
            Packet::Heartbeat { .. } => "Heartbeat",
            Packet::Leave { .. } => "Leave",
            Packet::Joined { .. } => "Joined",
            Packet::PeerJoined { .. } => "PeerJoined",
            Packet::PeerMoved { .. } => "PeerMoved",
            Packet::PeerLeft { .. } => "PeerLeft",
            Packet::Rejected { .. } => "Rejected",
        }
    }

    /// True for packets the relay sends to clients
    pub fn is_client_bound(&self) -> bool {
        matches!(
            self,
            Packet::Joined { .. }
                | Packet::PeerJoined { .. }
                | Packet::PeerMoved { .. }
                | Packet::PeerLeft { .. }
                | Packet::Rejected { .. }
        )
    }

    /// Rejects payloads that would corrupt peer state if applied.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Packet::Join {
                profile,
                position,
                rotation,
                ..
            } => {
                validate_display_name(&profile.display_name)?;
                validate_pose(position, *rotation)
            }
            Packet::Move {
                position, rotation, ..
            }
            | Packet::PeerMoved {
                position, rotation, ..
            } => validate_pose(position, *rotation),
            Packet::Joined { local, roster } => {
                validate_display_name(&local.display_name)?;
                roster.iter().try_for_each(validate_roster_entry)
            }
            Packet::PeerJoined { entry } => validate_roster_entry(entry),
            Packet::Heartbeat { .. }
            | Packet::Leave { .. }
            | Packet::PeerLeft { .. }
            | Packet::Rejected { .. } => Ok(()),
        }
    }
}

pub fn validate_display_name(name: &str) -> Result<(), ProtocolError> {
    let len = name.trim().chars().count();
    if len == 0 || len > MAX_DISPLAY_NAME_LEN {
        return Err(ProtocolError::InvalidDisplayName {
            len,
            max: MAX_DISPLAY_NAME_LEN,
        });
    }
    Ok(())
}

fn validate_pose(position: &Vec3, rotation: f32) -> Result<(), ProtocolError> {
    if !position.is_finite() {
        return Err(ProtocolError::NonFinite("position"));
    }
    if !rotation.is_finite() {
        return Err(ProtocolError::NonFinite("rotation"));
    }
    Ok(())
}

fn validate_roster_entry(entry: &RosterEntry) -> Result<(), ProtocolError> {
    validate_display_name(&entry.peer.display_name)?;
    validate_pose(&entry.position, entry.rotation)
}

pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    Ok(bincode::serialize(packet)?)
}

/// Decodes and validates a datagram. Anything malformed is rejected whole.
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, ProtocolError> {
    let packet: Packet = bincode::deserialize(bytes)?;
    packet.validate()?;
    Ok(packet)
}
