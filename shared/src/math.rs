//! Small vector and angle helpers shared by the client core and the relay

use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};
use std::ops::{Add, Mul, Sub};

/// A point or displacement in world space. Y is up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Sum of the absolute per-axis differences (L1 distance)
    pub fn manhattan_distance(&self, other: &Vec3) -> f32 {
        (self.x - other.x).abs() + (self.y - other.y).abs() + (self.z - other.z).abs()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Velocity on the ground plane. Vertical motion is never estimated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlanarVelocity {
    pub x: f32,
    pub z: f32,
}

impl PlanarVelocity {
    pub const ZERO: PlanarVelocity = PlanarVelocity { x: 0.0, z: 0.0 };

    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    /// Derives velocity from two positions `dt` seconds apart, ignoring Y.
    pub fn between(from: &Vec3, to: &Vec3, dt: f32) -> Self {
        Self {
            x: (to.x - from.x) / dt,
            z: (to.z - from.z) / dt,
        }
    }

    pub fn scale(&self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            z: self.z * factor,
        }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }
}

/// Wraps an angle in radians into `(-π, π]`.
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Signed delta that turns `from` into `to` along the shortest arc, in `(-π, π]`.
pub fn shortest_angle_delta(from: f32, to: f32) -> f32 {
    wrap_angle(to - from)
}
