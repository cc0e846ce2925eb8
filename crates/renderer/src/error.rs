//! Errors raised while building the renderer.

use multipass_resources::ResourceError;
use multipass_rhi::RhiError;
use thiserror::Error;

/// Setup failures from any layer below the renderer. The frame loop itself
/// only deals in [`RhiError`].
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Window or surface setup failed.
    #[error(transparent)]
    Platform(#[from] multipass_core::Error),

    /// Scene geometry or texture loading failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

pub type RendererResult<T> = std::result::Result<T, RendererError>;
