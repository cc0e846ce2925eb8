//! Error types for resource loading.

use std::path::PathBuf;

use multipass_rhi::RhiError;
use thiserror::Error;

/// Error type for resource loading and upload.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// An OBJ file could not be parsed.
    #[error("Failed to load OBJ file '{path}': {source}")]
    ObjLoad {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    /// An OBJ file has no faces.
    #[error("OBJ file '{0}' contains no geometry")]
    NoGeometry(PathBuf),

    /// Index data refers past the vertex list or a triangle repeats a vertex.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// GPU upload failed.
    #[error(transparent)]
    Rhi(#[from] RhiError),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
