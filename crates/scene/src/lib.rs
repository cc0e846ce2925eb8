//! Scene state.
//!
//! This crate holds everything the renderer reads per frame apart from GPU
//! objects:
//! - Fly camera
//! - Directional light with its shadow projection
//! - Model transforms and the cube's animated rotation

pub mod camera;
pub mod light;
pub mod transform;

pub use camera::{Camera, Movement, Perspective};
pub use light::DirectionalLight;
pub use transform::{EulerRotation, Transform};
