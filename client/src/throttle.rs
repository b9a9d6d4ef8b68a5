//! Outbound update throttling
//!
//! The local pose is sampled every frame but only transmitted when enough time has
//! passed since the previous send and the pose actually changed. Suppressed samples
//! are never queued: the next frame's state supersedes them.

use shared::{shortest_angle_delta, AnimationTag, Vec3};
use std::time::{Duration, Instant};

/// Minimum spacing between two sends (about 30 Hz)
pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(33);
/// Summed absolute position change below which the pose counts as unchanged
pub const POSITION_EPSILON: f32 = 0.01;
/// Rotation change in radians below which the pose counts as unchanged
pub const ROTATION_EPSILON: f32 = 0.01;

/// What was last put on the wire for the local player
#[derive(Debug, Clone, PartialEq)]
pub struct LocalReplicationState {
    pub last_sent_position: Vec3,
    pub last_sent_rotation: f32,
    pub last_sent_at: Option<Instant>,
    pub current_animation: AnimationTag,
}

#[derive(Debug, Clone)]
pub struct Throttler {
    state: LocalReplicationState,
    min_interval: Duration,
}

impl Throttler {
    /// Starts from the pose announced at join, so an idle player sends nothing.
    pub fn new(initial_position: Vec3, initial_rotation: f32) -> Self {
        Self {
            state: LocalReplicationState {
                last_sent_position: initial_position,
                last_sent_rotation: initial_rotation,
                last_sent_at: None,
                current_animation: AnimationTag::Idle,
            },
            min_interval: MIN_SEND_INTERVAL,
        }
    }

    pub fn state(&self) -> &LocalReplicationState {
        &self.state
    }

    /// Time and magnitude gate. Pure: never mutates state.
    ///
    /// A change of animation tag alone also passes the magnitude gate so that
    /// stationary transitions (idle to crouch) still reach other peers.
    pub fn should_send(
        &self,
        position: Vec3,
        rotation: f32,
        animation: AnimationTag,
        now: Instant,
    ) -> bool {
        if let Some(last) = self.state.last_sent_at {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }

        let position_delta = position.manhattan_distance(&self.state.last_sent_position);
        let rotation_delta = shortest_angle_delta(self.state.last_sent_rotation, rotation).abs();

        position_delta >= POSITION_EPSILON
            || rotation_delta >= ROTATION_EPSILON
            || animation != self.state.current_animation
    }

    pub fn record_sent(
        &mut self,
        position: Vec3,
        rotation: f32,
        animation: AnimationTag,
        now: Instant,
    ) {
        self.state.last_sent_position = position;
        self.state.last_sent_rotation = rotation;
        self.state.last_sent_at = Some(now);
        self.state.current_animation = animation;
    }

    /// Gate and record in one step. Returns whether the caller should transmit.
    pub fn try_send(
        &mut self,
        position: Vec3,
        rotation: f32,
        animation: AnimationTag,
        now: Instant,
    ) -> bool {
        if !self.should_send(position, rotation, animation, now) {
            return false;
        }
        self.record_sent(position, rotation, animation, now);
        true
    }
}
