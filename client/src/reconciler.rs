//! Remote state reconciliation
//!
//! Runs once per render frame, independent of network arrival. For each peer it
//! dead-reckons a target pose from the last sample plus estimated velocity, then
//! blends the rendered pose toward that target so remote avatars never snap.
//!
//! Only the rendered pose, the decaying velocity estimate and the animation state are
//! touched here; samples are left to the registry.

use crate::registry::{PeerRegistry, PeerState, Pose};
use shared::{shortest_angle_delta, wrap_angle, Vec3};
use std::time::Instant;

/// Longest stretch (seconds) a peer is extrapolated past its last sample
pub const EXTRAPOLATION_CAP: f32 = 0.1;
/// Blend responsiveness; `dt * BLEND_RATE` of the gap is closed per frame
pub const BLEND_RATE: f32 = 15.0;
/// Per-frame velocity multiplier once a peer has gone quiet
pub const VELOCITY_DECAY: f32 = 0.9;

/// Where `peer` should be shown at `now` according to dead reckoning.
///
/// Height is never extrapolated.
pub fn predict_target(peer: &PeerState, now: Instant) -> Pose {
    let sample = peer.last_sample();
    let window = peer.time_since_sample(now).min(EXTRAPOLATION_CAP);
    let velocity = peer.estimated_velocity();

    Pose {
        position: Vec3::new(
            sample.position.x + velocity.x * window,
            sample.position.y,
            sample.position.z + velocity.z * window,
        ),
        rotation: sample.rotation,
    }
}

pub fn blend_factor(dt: f32) -> f32 {
    (dt * BLEND_RATE).clamp(0.0, 1.0)
}

/// Turns `current` toward `target` along the shorter arc; result is in `(-π, π]`.
pub fn blend_rotation(current: f32, target: f32, factor: f32) -> f32 {
    wrap_angle(current + shortest_angle_delta(current, target) * factor)
}

fn lerp(from: f32, to: f32, factor: f32) -> f32 {
    from + (to - from) * factor
}

/// Advances one peer by a frame of `dt` seconds.
pub fn reconcile_peer(peer: &mut PeerState, now: Instant, dt: f32) {
    let target = predict_target(peer, now);
    let factor = blend_factor(dt);

    let rendered = &mut peer.rendered_pose;
    rendered.position = Vec3::new(
        lerp(rendered.position.x, target.position.x, factor),
        lerp(rendered.position.y, target.position.y, factor),
        lerp(rendered.position.z, target.position.z, factor),
    );
    rendered.rotation = blend_rotation(rendered.rotation, target.rotation, factor);

    if peer.time_since_sample(now) > EXTRAPOLATION_CAP {
        peer.estimated_velocity = peer.estimated_velocity.scale(VELOCITY_DECAY);
    }

    let tag = peer.last_sample().animation;
    let seq = peer.animation_seq();
    peer.animation.select(tag, seq);
    peer.animation.advance(dt);
}

/// Advances every known peer by one frame.
pub fn reconcile(registry: &mut PeerRegistry, now: Instant, dt: f32) {
    for peer in registry.all_mut() {
        reconcile_peer(peer, now, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{AnimationTag, Appearance, PeerId, PeerInfo, PlanarVelocity};
    use std::f32::consts::PI;
    use std::time::Duration;

    const FRAME: f32 = 1.0 / 60.0;

    fn at(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    fn joined(registry: &mut PeerRegistry, id: PeerId, position: Vec3, rotation: f32, now: Instant) {
        let info = PeerInfo {
            id,
            display_name: format!("Peer{}", id),
            appearance: Appearance::default(),
        };
        registry.upsert_from_join(info, position, rotation, now);
    }

    #[test]
    fn test_blend_factor_is_clamped() {
        assert_approx_eq!(blend_factor(FRAME), 0.25, 1e-6);
        assert_eq!(blend_factor(0.5), 1.0);
        assert_eq!(blend_factor(-1.0), 0.0);
    }

    #[test]
    fn test_end_to_end_prediction() {
        let mut registry = PeerRegistry::new();
        let t0 = Instant::now();
        joined(&mut registry, 1, Vec3::ZERO, 0.0, t0);

        registry.apply_sample(1, Vec3::ZERO, 0.0, AnimationTag::Walk, t0);
        registry.apply_sample(1, Vec3::new(1.0, 0.0, 0.0), 0.0, AnimationTag::Walk, at(t0, 100));

        let target = predict_target(registry.get(1).unwrap(), at(t0, 150));
        assert_approx_eq!(target.position.x, 1.5, 1e-3);
        assert_approx_eq!(target.position.z, 0.0, 1e-6);
    }

    #[test]
    fn test_extrapolation_is_capped() {
        let mut registry = PeerRegistry::new();
        let t0 = Instant::now();
        joined(&mut registry, 1, Vec3::ZERO, 0.0, t0);
        registry.apply_sample(1, Vec3::new(0.1, 0.0, 0.0), 0.0, AnimationTag::Walk, at(t0, 100));

        let peer = registry.get(1).unwrap();
        assert_approx_eq!(peer.estimated_velocity().x, 1.0, 1e-3);

        let target = predict_target(peer, at(t0, 5100));
        let offset = target.position.x - peer.last_sample().position.x;
        assert!(offset <= 0.1 + 1e-4, "offset {} exceeds cap", offset);
        assert_approx_eq!(offset, 0.1, 1e-3);
    }

    #[test]
    fn test_height_is_not_extrapolated() {
        let mut registry = PeerRegistry::new();
        let t0 = Instant::now();
        joined(&mut registry, 1, Vec3::ZERO, 0.0, t0);
        registry.apply_sample(1, Vec3::new(0.0, 2.0, 0.0), 0.0, AnimationTag::Jump, at(t0, 100));

        let target = predict_target(registry.get(1).unwrap(), at(t0, 150));
        assert_approx_eq!(target.position.y, 2.0, 1e-6);
    }

    #[test]
    fn test_rotation_takes_short_way() {
        let delta = shortest_angle_delta(3.0, -3.0);
        assert!(delta.abs() <= PI);
        assert!(delta > 0.0);

        // A partial step moves up toward π instead of down through 0
        let partial = blend_rotation(3.0, -3.0, 0.25);
        assert!(partial > 3.0 && partial <= PI);

        // A full step crosses π and wraps
        let full = blend_rotation(3.0, -3.0, 1.0);
        assert_approx_eq!(full, -3.0, 1e-4);
    }

    #[test]
    fn test_reconcile_rotation_across_boundary() {
        let mut registry = PeerRegistry::new();
        let t0 = Instant::now();
        joined(&mut registry, 1, Vec3::ZERO, 3.0, t0);
        registry.apply_sample(1, Vec3::ZERO, -3.0, AnimationTag::Idle, at(t0, 50));

        reconcile(&mut registry, at(t0, 60), FRAME);

        let rotation = registry.get(1).unwrap().rendered_pose().rotation;
        assert!(rotation > 3.0, "rotation went the long way: {}", rotation);
    }

    #[test]
    fn test_blend_closes_gap_smoothly() {
        let mut registry = PeerRegistry::new();
        let t0 = Instant::now();
        joined(&mut registry, 1, Vec3::ZERO, 0.0, t0);
        registry.apply_sample(1, Vec3::new(4.0, 0.0, 0.0), 0.0, AnimationTag::Walk, at(t0, 2000));

        reconcile(&mut registry, at(t0, 2000), FRAME);
        let first = registry.get(1).unwrap().rendered_pose().position.x;
        assert_approx_eq!(first, 1.0, 1e-4);

        for frame in 1..30 {
            reconcile(&mut registry, at(t0, 2000 + frame * 16), FRAME);
        }
        let later = registry.get(1).unwrap().rendered_pose().position.x;
        assert!(later > first);
        assert_approx_eq!(later, 4.0, 1e-2);
    }

    #[test]
    fn test_velocity_decays_geometrically() {
        let mut registry = PeerRegistry::new();
        let t0 = Instant::now();
        joined(&mut registry, 1, Vec3::ZERO, 0.0, t0);
        registry.apply_sample(1, Vec3::new(0.3, 0.0, 0.4), 0.0, AnimationTag::Walk, at(t0, 100));

        let initial = registry.get(1).unwrap().estimated_velocity().magnitude();
        assert_approx_eq!(initial, 5.0, 1e-3);

        // Still fresh: no decay
        reconcile(&mut registry, at(t0, 150), FRAME);
        assert_approx_eq!(registry.get(1).unwrap().estimated_velocity().magnitude(), initial, 1e-5);

        let frames = 20;
        for frame in 0..frames {
            reconcile(&mut registry, at(t0, 300 + frame * 16), FRAME);
        }

        let decayed = registry.get(1).unwrap().estimated_velocity().magnitude();
        assert_approx_eq!(decayed, initial * VELOCITY_DECAY.powi(frames as i32), 1e-4);
        assert!(decayed > 0.0);
    }

    #[test]
    fn test_peer_without_samples_stays_pinned() {
        let mut registry = PeerRegistry::new();
        let t0 = Instant::now();
        let spawn = Vec3::new(12.0, 0.0, -7.0);
        joined(&mut registry, 1, spawn, 1.0, t0);

        for frame in 0..120 {
            reconcile(&mut registry, at(t0, frame * 16), FRAME);
        }

        let peer = registry.get(1).unwrap();
        assert_eq!(peer.rendered_pose().position, spawn);
        assert_approx_eq!(peer.rendered_pose().rotation, 1.0, 1e-6);
        assert_eq!(peer.estimated_velocity(), PlanarVelocity::ZERO);
    }

    #[test]
    fn test_reconcile_drives_animation() {
        let mut registry = PeerRegistry::new();
        let t0 = Instant::now();
        joined(&mut registry, 1, Vec3::ZERO, 0.0, t0);

        registry.apply_sample(1, Vec3::ZERO, 0.0, AnimationTag::Jump, at(t0, 100));
        reconcile(&mut registry, at(t0, 100), FRAME);
        assert_eq!(registry.get(1).unwrap().animation().current(), AnimationTag::Jump);

        // Airborne samples keep carrying the jump; it still plays only once
        registry.apply_sample(1, Vec3::new(0.0, 1.0, 0.0), 0.0, AnimationTag::Jump, at(t0, 140));
        for frame in 1..60 {
            reconcile(&mut registry, at(t0, 100 + frame * 16), FRAME);
        }
        assert_eq!(registry.get(1).unwrap().animation().current(), AnimationTag::Idle);

        registry.apply_sample(1, Vec3::ZERO, 0.0, AnimationTag::Run, at(t0, 1200));
        reconcile(&mut registry, at(t0, 1200), FRAME);
        assert_eq!(registry.get(1).unwrap().animation().current(), AnimationTag::Run);
    }
}
