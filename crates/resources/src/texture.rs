//! Image upload into sampled textures.

use std::path::Path;
use std::sync::Arc;

use multipass_rhi::command::CommandPool;
use multipass_rhi::device::Device;
use multipass_rhi::texture::Texture;
use tracing::warn;

use crate::error::ResourceResult;
use crate::image_data::ImageData;

const CHECKERBOARD_SIZE: u32 = 256;
const CHECKERBOARD_CELLS: u32 = 8;

/// Picks the diffuse image: the decoded file when `path` is given and
/// readable, a checkerboard otherwise.
pub fn diffuse_image(path: Option<&Path>) -> ImageData {
    match path.map(ImageData::load_rgba8) {
        Some(Ok(image)) => image,
        Some(Err(e)) => {
            warn!("Falling back to a checkerboard texture: {}", e);
            ImageData::checkerboard(CHECKERBOARD_SIZE, CHECKERBOARD_CELLS)
        }
        None => ImageData::checkerboard(CHECKERBOARD_SIZE, CHECKERBOARD_CELLS),
    }
}

/// Uploads `image` through a staging buffer. Blocks until the copy is done.
pub fn upload_image(
    device: Arc<Device>,
    pool: &CommandPool,
    name: &str,
    image: &ImageData,
) -> ResourceResult<Texture> {
    Ok(Texture::from_rgba8(
        device,
        pool,
        name,
        image.width,
        image.height,
        &image.pixels,
    )?)
}
