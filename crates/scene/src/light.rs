//! The shadow-casting light.

use glam::{Mat4, Vec3, Vec4};

use crate::camera::Perspective;

/// A light placed in the scene that always looks at the origin.
///
/// The shadow map is rendered with its view and projection; the product of
/// the two is the light-space matrix the lit shaders sample the map with.
#[derive(Clone, Debug)]
pub struct DirectionalLight {
    /// Light position in world space
    pub position: Vec3,
    /// Projection used for the shadow map, square aspect
    pub projection: Perspective,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            position: Vec3::new(-2.0, 4.0, -1.0),
            projection: Perspective::new(45.0, 1.0, 0.1, 100.0),
        }
    }
}

impl DirectionalLight {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, Vec3::ZERO, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    /// Projection × view.
    pub fn light_space_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Position as pushed to shaders (w = 1).
    pub fn position_vec4(&self) -> Vec4 {
        self.position.extend(1.0)
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }
}
