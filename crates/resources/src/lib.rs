//! Scene resources.
//!
//! This crate produces the data the renderer draws with:
//! - Procedural geometry (ground grid, cube)
//! - OBJ mesh loading
//! - RGBA8 image decoding, with a generated checkerboard fallback
//! - Upload of meshes and images into GPU buffers and textures

mod error;

pub mod geometry;
pub mod image_data;
pub mod mesh;
pub mod obj;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use geometry::{MAX_GRID_SPLITS, MeshData, cube, grid};
pub use image_data::ImageData;
pub use mesh::GpuMesh;
pub use obj::load_obj;
