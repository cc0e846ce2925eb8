//! Model transforms.
//!
//! [`Transform`] composes translation, rotation and scale into a model
//! matrix. [`EulerRotation`] is the cube's whole-degree rotation, advanced
//! one degree per axis per frame while auto rotation is on.

use glam::{Mat4, Quat, Vec3};
use tracing::debug;

/// A transform representing position, rotation, and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Translation × rotation × scale.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// The ground plane: the XY grid laid flat by a 90° turn about X.
    pub fn ground() -> Self {
        Self::new().with_rotation(Quat::from_rotation_x(90.0_f32.to_radians()))
    }

    /// The small cube drawn where the light is.
    pub fn light_marker(position: Vec3) -> Self {
        Self::new()
            .with_position(position)
            .with_scale(Vec3::splat(0.2))
    }
}

/// Rotation in whole degrees about X, then Y, then Z.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EulerRotation {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    auto_rotate: bool,
}

impl Default for EulerRotation {
    fn default() -> Self {
        Self {
            x: 20,
            y: 10,
            z: 30,
            auto_rotate: false,
        }
    }
}

impl EulerRotation {
    #[inline]
    pub fn auto_rotate(&self) -> bool {
        self.auto_rotate
    }

    pub fn toggle_auto_rotate(&mut self) {
        self.auto_rotate = !self.auto_rotate;
        debug!("Auto rotation {}", if self.auto_rotate { "on" } else { "off" });
    }

    /// Advances every axis by one degree, wrapping at 360, when auto
    /// rotation is on.
    pub fn advance(&mut self) {
        if !self.auto_rotate {
            return;
        }
        for angle in [&mut self.x, &mut self.y, &mut self.z] {
            *angle = (*angle + 1) % 360;
        }
    }

    /// `Rx · Ry · Rz`.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_x((self.x as f32).to_radians())
            * Mat4::from_rotation_y((self.y as f32).to_radians())
            * Mat4::from_rotation_z((self.z as f32).to_radians())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn approx_eq_vec3(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < EPSILON
    }

    #[test]
    fn test_transform_default() {
        let t = Transform::default();
        assert_eq!(t.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_ground_lies_flat() {
        let ground = Transform::ground().matrix();
        // The grid's +Y edge ends up along +Z, its -Z normal points up.
        assert!(approx_eq_vec3(ground.transform_point3(Vec3::Y), Vec3::Z));
        assert!(approx_eq_vec3(ground.transform_vector3(Vec3::NEG_Z), Vec3::Y));
    }

    #[test]
    fn test_light_marker_scales_then_translates() {
        let marker = Transform::light_marker(Vec3::new(-2.0, 4.0, -1.0)).matrix();
        let corner = marker.transform_point3(Vec3::splat(0.5));
        assert!(approx_eq_vec3(corner, Vec3::new(-1.9, 4.1, -0.9)));
    }

    #[test]
    fn test_rotation_advances_only_when_enabled() {
        let mut rotation = EulerRotation::default();
        rotation.advance();
        assert_eq!((rotation.x, rotation.y, rotation.z), (20, 10, 30));

        rotation.toggle_auto_rotate();
        rotation.advance();
        assert_eq!((rotation.x, rotation.y, rotation.z), (21, 11, 31));
    }

    #[test]
    fn test_rotation_wraps() {
        let mut rotation = EulerRotation {
            x: 359,
            y: 0,
            z: 180,
            auto_rotate: true,
        };
        rotation.advance();
        assert_eq!((rotation.x, rotation.y, rotation.z), (0, 1, 181));
    }

    #[test]
    fn test_rotation_order() {
        let rotation = EulerRotation {
            x: 90,
            y: 90,
            z: 0,
            auto_rotate: false,
        };
        // Rx · Ry applied to +X: Ry takes it to -Z, Rx takes -Z to +Y.
        let moved = rotation.matrix().transform_vector3(Vec3::X);
        assert!(approx_eq_vec3(moved, Vec3::Y));
    }
}
