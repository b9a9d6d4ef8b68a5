//! Remote peer bookkeeping
//!
//! The registry is the only owner of remote peer state. Peers appear on an explicit
//! join (or roster entry) and disappear on an explicit leave or a transport-level
//! disconnect; there is no timeout eviction. Samples carry last-writer-wins
//! semantics per peer: each peer is the sole writer of its own state.

use crate::animation::AnimationState;
use log::{debug, info};
use shared::{AnimationTag, Appearance, PeerId, PeerInfo, PlanarVelocity, RosterEntry, Vec3};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Samples further apart than this do not update the velocity estimate
pub const VELOCITY_WINDOW: Duration = Duration::from_secs(1);

/// One pose received from the network
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub position: Vec3,
    pub rotation: f32,
    pub animation: AnimationTag,
    pub received_at: Instant,
}

/// Position and facing as displayed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: f32,
}

#[derive(Debug, Clone)]
pub struct PeerState {
    id: PeerId,
    display_name: String,
    appearance: Appearance,
    last_sample: Sample,
    previous_sample: Option<Sample>,
    sample_count: u64,
    animation_seq: u64,
    pub(crate) estimated_velocity: PlanarVelocity,
    pub(crate) rendered_pose: Pose,
    pub(crate) animation: AnimationState,
}

impl PeerState {
    fn new(
        info: PeerInfo,
        position: Vec3,
        rotation: f32,
        animation: AnimationTag,
        now: Instant,
    ) -> Self {
        Self {
            id: info.id,
            display_name: info.display_name,
            appearance: info.appearance,
            last_sample: Sample {
                position,
                rotation,
                animation,
                received_at: now,
            },
            previous_sample: None,
            sample_count: 0,
            animation_seq: 0,
            estimated_velocity: PlanarVelocity::ZERO,
            rendered_pose: Pose { position, rotation },
            animation: AnimationState::new(),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn appearance(&self) -> &Appearance {
        &self.appearance
    }

    /// Most recent pose; seeded from the join payload until the first move arrives
    pub fn last_sample(&self) -> &Sample {
        &self.last_sample
    }

    pub fn previous_sample(&self) -> Option<&Sample> {
        self.previous_sample.as_ref()
    }

    /// Number of move samples applied so far
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Sample number at which the current animation tag started arriving
    pub fn animation_seq(&self) -> u64 {
        self.animation_seq
    }

    pub fn estimated_velocity(&self) -> PlanarVelocity {
        self.estimated_velocity
    }

    pub fn rendered_pose(&self) -> &Pose {
        &self.rendered_pose
    }

    pub fn animation(&self) -> &AnimationState {
        &self.animation
    }

    pub fn last_update_timestamp(&self) -> Instant {
        self.last_sample.received_at
    }

    /// Seconds since the last sample, clamped at zero
    pub fn time_since_sample(&self, now: Instant) -> f32 {
        now.saturating_duration_since(self.last_sample.received_at)
            .as_secs_f32()
    }

    fn apply(&mut self, sample: Sample) {
        let dt = sample
            .received_at
            .saturating_duration_since(self.last_sample.received_at);

        if !dt.is_zero() && dt < VELOCITY_WINDOW {
            self.estimated_velocity = PlanarVelocity::between(
                &self.last_sample.position,
                &sample.position,
                dt.as_secs_f32(),
            );
        }

        self.sample_count += 1;
        if sample.animation != self.last_sample.animation {
            self.animation_seq = self.sample_count;
        }
        self.previous_sample = Some(self.last_sample);
        self.last_sample = sample;
    }
}

#[derive(Debug, Default)]
pub struct PeerRegistry {
    local_id: Option<PeerId>,
    peers: HashMap<PeerId, PeerState>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_id(&self) -> Option<PeerId> {
        self.local_id
    }

    /// Marks `id` as ourselves. It is never tracked as a remote peer.
    pub fn set_local_id(&mut self, id: Option<PeerId>) {
        self.local_id = id;
        if let Some(id) = id {
            self.peers.remove(&id);
        }
    }

    /// Creates a peer from a join event. Duplicate joins are ignored and keep the
    /// first join's fields. Returns true if a peer was created.
    pub fn upsert_from_join(
        &mut self,
        info: PeerInfo,
        position: Vec3,
        rotation: f32,
        now: Instant,
    ) -> bool {
        self.insert_peer(info, position, rotation, AnimationTag::Idle, now)
    }

    /// Like [`upsert_from_join`](Self::upsert_from_join), but also carries the
    /// animation the relay last saw, so a stationary peer shows it right away.
    pub fn upsert_from_roster(&mut self, entry: RosterEntry, now: Instant) -> bool {
        self.insert_peer(entry.peer, entry.position, entry.rotation, entry.animation, now)
    }

    fn insert_peer(
        &mut self,
        info: PeerInfo,
        position: Vec3,
        rotation: f32,
        animation: AnimationTag,
        now: Instant,
    ) -> bool {
        if Some(info.id) == self.local_id || self.peers.contains_key(&info.id) {
            debug!("Ignoring join for peer {}", info.id);
            return false;
        }

        info!(
            "Peer {} ({}, {} {}) joined at ({:.2}, {:.2}, {:.2}) {}",
            info.id,
            info.display_name,
            info.appearance.color,
            info.appearance.class,
            position.x,
            position.y,
            position.z,
            animation.as_str()
        );
        self.peers.insert(
            info.id,
            PeerState::new(info, position, rotation, animation, now),
        );
        true
    }

    /// Records a move sample. Unknown peers (already left, or join not yet seen)
    /// are ignored. Returns true if the sample was applied.
    pub fn apply_sample(
        &mut self,
        id: PeerId,
        position: Vec3,
        rotation: f32,
        animation: AnimationTag,
        now: Instant,
    ) -> bool {
        match self.peers.get_mut(&id) {
            Some(peer) => {
                peer.apply(Sample {
                    position,
                    rotation,
                    animation,
                    received_at: now,
                });
                true
            }
            None => {
                debug!("Dropping sample for unknown peer {}", id);
                false
            }
        }
    }

    /// Idempotent. Returns true if the peer was present.
    pub fn remove(&mut self, id: PeerId) -> bool {
        match self.peers.remove(&id) {
            Some(peer) => {
                info!("Peer {} ({}) left", id, peer.display_name);
                true
            }
            None => false,
        }
    }

    /// Forgets every peer, used when the transport reports a disconnect.
    pub fn clear(&mut self) {
        if !self.peers.is_empty() {
            info!("Clearing {} peers", self.peers.len());
        }
        self.peers.clear();
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerState> {
        self.peers.get(&id)
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.contains_key(&id)
    }

    /// Iterates every known peer in unspecified order. Call again to restart.
    pub fn all(&self) -> impl Iterator<Item = &PeerState> + '_ {
        self.peers.values()
    }

    pub(crate) fn all_mut(&mut self) -> impl Iterator<Item = &mut PeerState> + '_ {
        self.peers.values_mut()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
