//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics.
//!
//! The arena is 2.5D: bodies live in the x/y plane (y is up) and `z` is the
//! depth axis, which the simulation pins to zero.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Lengths below this are treated as zero when normalising.
pub const EPSILON: f32 = 1e-6;

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Vector in the simulation plane.
    pub const fn planar(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Unit vector in the plane at `angle` radians from +x.
    pub fn from_angle(angle: f32) -> Self {
        Self::planar(angle.cos(), angle.sin())
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn len(self) -> f32 {
        self.len_sq().sqrt()
    }

    /// Returns the unit vector, or `fallback` when the length is degenerate.
    pub fn normalize_or(self, fallback: Self) -> Self {
        let len = self.len();
        if len <= EPSILON || !len.is_finite() {
            return fallback;
        }
        self * (1.0 / len)
    }

    /// Angle of the planar projection, measured from +x.
    pub fn angle(self) -> f32 {
        self.y.atan2(self.x)
    }

    pub fn xy(self) -> [f32; 2] {
        [self.x, self.y]
    }

    pub fn from_xy(v: [f32; 2]) -> Self {
        Self::planar(v[0], v[1])
    }

    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Unit quaternion (conceptually).
///
/// Bodies only ever rotate about the depth axis, so most helpers work with a
/// single angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation of `angle` radians about the depth (z) axis.
    pub fn from_rotation_z(angle: f32) -> Self {
        let half = angle * 0.5;
        Self {
            x: 0.0,
            y: 0.0,
            z: half.sin(),
            w: half.cos(),
        }
    }

    /// Rotation angle about the depth axis, in `(-pi, pi]`.
    pub fn angle_z(self) -> f32 {
        2.0 * self.z.atan2(self.w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_vector_normalizes_to_fallback() {
        assert_eq!(Vec3::ZERO.normalize_or(Vec3::X), Vec3::X);
        let n = Vec3::planar(3.0, 4.0).normalize_or(Vec3::X);
        assert!((n.len() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn quat_angle_roundtrips_about_z() {
        for angle in [-3.0_f32, -1.0, 0.0, 0.5, 2.5] {
            let q = Quat::from_rotation_z(angle);
            assert!((q.angle_z() - angle).abs() < 1e-5);
        }
    }
}
