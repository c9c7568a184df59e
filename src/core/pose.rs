//! Transform Primitives
//!
//! Position and rotation exactly as they travel on the wire:
//! three and four `f32` components. No interpolation or physics here.

use std::fmt;
use serde::{Serialize, Deserialize};

/// 3D position.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Origin
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    /// All components set to one
    pub const ONE: Self = Self { x: 1.0, y: 1.0, z: 1.0 };

    /// Create a new vector.
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise add.
    #[inline]
    pub fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Components as an array (wire order).
    #[inline]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl fmt::Debug for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vec3({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Rotation quaternion, stored `x, y, z, w` like the wire format.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W (scalar) component
    pub w: f32,
}

impl Quat {
    /// No rotation.
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    /// Create a quaternion from raw components. Not normalized.
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians around the Y axis.
    pub fn from_rotation_y(angle: f32) -> Self {
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(0.0, s, 0.0, c)
    }

    /// Squared norm.
    #[inline]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    /// Normalize to unit length. Returns IDENTITY for a degenerate quaternion.
    pub fn normalize(self) -> Self {
        let len = self.length_squared().sqrt();
        if !len.is_normal() {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Components as an array (wire order).
    #[inline]
    pub const fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Debug for Quat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quat({:.3}, {:.3}, {:.3}, {:.3})", self.x, self.y, self.z, self.w)
    }
}

/// Position plus rotation of a network object.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// World position
    pub position: Vec3,
    /// World rotation
    pub rotation: Quat,
}

impl Pose {
    /// Origin, no rotation.
    pub const IDENTITY: Self = Self { position: Vec3::ZERO, rotation: Quat::IDENTITY };

    /// Create a pose.
    pub const fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Pose at `position` with no rotation.
    pub const fn at(position: Vec3) -> Self {
        Self { position, rotation: Quat::IDENTITY }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_defaults() {
        assert_eq!(Quat::default(), Quat::IDENTITY);
        assert_eq!(Pose::default(), Pose::IDENTITY);
        assert_eq!(Vec3::default(), Vec3::ZERO);
    }

    #[test]
    fn test_normalize() {
        let q = Quat::new(0.0, 2.0, 0.0, 0.0).normalize();
        assert!((q.length_squared() - 1.0).abs() < 1e-6);
        assert_eq!(q.y, 1.0);
    }

    #[test]
    fn test_normalize_degenerate() {
        assert_eq!(Quat::new(0.0, 0.0, 0.0, 0.0).normalize(), Quat::IDENTITY);
        assert_eq!(Quat::new(f32::NAN, 0.0, 0.0, 1.0).normalize(), Quat::IDENTITY);
    }

    #[test]
    fn test_rotation_y_is_unit() {
        let q = Quat::from_rotation_y(1.25);
        assert!((q.length_squared() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_vec_add() {
        let v = Vec3::new(1.0, 2.0, 3.0).add(Vec3::ONE);
        assert_eq!(v.to_array(), [2.0, 3.0, 4.0]);
    }
}
