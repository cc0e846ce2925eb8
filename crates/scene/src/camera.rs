//! First-person fly camera.

use glam::{Mat4, Vec3};

/// Units moved per key-press step.
pub const MOVE_SPEED: f32 = 0.125;
/// Degrees of rotation per pixel of mouse travel.
pub const MOUSE_SENSITIVITY: f32 = 0.1;
/// Pitch is clamped to this many degrees either side of the horizon.
pub const PITCH_LIMIT: f32 = 89.0;

/// Perspective projection parameters. Angles are in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Perspective {
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Perspective {
    pub fn new(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y,
            aspect,
            near,
            far,
        }
    }

    /// Right-handed projection with a `[0, 1]` depth range.
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y.to_radians(), self.aspect, self.near, self.far)
    }
}

/// Direction of a single movement step, relative to where the camera looks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
}

/// A camera steered by yaw and pitch.
///
/// A yaw of 0° looks down +X; the default of -90° looks down -Z.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    yaw: f32,
    pitch: f32,
    /// Projection settings
    pub projection: Perspective,
}

impl Camera {
    /// Camera at (0, 1, 3) looking slightly down towards the origin.
    pub fn new(aspect: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 1.0, 3.0),
            yaw: -90.0,
            pitch: -10.0,
            projection: Perspective::new(45.0, aspect, 0.1, 100.0),
        }
    }

    #[inline]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    #[inline]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Unit vector the camera looks along.
    pub fn forward(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
    }

    /// Get the right direction vector.
    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize()
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
    }

    /// Get the projection matrix (with Vulkan Y-flip).
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = self.projection.matrix();
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Moves one step of [`MOVE_SPEED`] units.
    pub fn step(&mut self, movement: Movement) {
        let offset = match movement {
            Movement::Forward => self.forward(),
            Movement::Backward => -self.forward(),
            Movement::Left => -self.right(),
            Movement::Right => self.right(),
        };
        self.position += offset * MOVE_SPEED;
    }

    /// Applies a mouse drag of `dx`, `dy` pixels. Screen y grows downwards,
    /// so dragging up pitches the camera up.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * MOUSE_SENSITIVITY;
        self.pitch = (self.pitch - dy * MOUSE_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_default_camera_looks_towards_origin() {
        let camera = Camera::new(16.0 / 9.0);
        let forward = camera.forward();
        assert!(forward.z < 0.0);
        assert!(forward.y < 0.0);
        assert!(forward.x.abs() < EPSILON);
        assert!((forward.length() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_projection_is_y_flipped() {
        let camera = Camera::new(1.0);
        let flipped = camera.projection_matrix();
        let plain = camera.projection.matrix();
        assert_eq!(flipped.y_axis.y, -plain.y_axis.y);
        assert_eq!(flipped.x_axis, plain.x_axis);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::new(1.0);
        camera.rotate(0.0, -100_000.0);
        assert_eq!(camera.pitch(), PITCH_LIMIT);
        camera.rotate(0.0, 100_000.0);
        assert_eq!(camera.pitch(), -PITCH_LIMIT);
    }

    #[test]
    fn test_mouse_sensitivity() {
        let mut camera = Camera::new(1.0);
        camera.rotate(10.0, 0.0);
        assert!((camera.yaw() - (-89.0)).abs() < EPSILON);
    }

    #[test]
    fn test_steps_cancel_out() {
        let mut camera = Camera::new(1.0);
        let start = camera.position;
        camera.step(Movement::Forward);
        assert!((camera.position.distance(start) - MOVE_SPEED).abs() < EPSILON);
        camera.step(Movement::Backward);
        camera.step(Movement::Left);
        camera.step(Movement::Right);
        assert!(camera.position.distance(start) < EPSILON);
    }

    #[test]
    fn test_right_is_perpendicular() {
        let mut camera = Camera::new(1.0);
        camera.rotate(123.0, 45.0);
        assert!(camera.right().dot(camera.forward()).abs() < EPSILON);
        assert!(camera.right().y.abs() < EPSILON);
    }
}
