//! Decoded RGBA8 pixel data.

use std::path::Path;

use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// A tightly packed RGBA8 image, row-major, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Decodes any format the `image` crate understands into RGBA8.
    pub fn load_rgba8(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let decoded = image::open(path)?.into_rgba8();
        let (width, height) = decoded.dimensions();
        info!("Decoded {:?}: {}x{} RGBA8", path, width, height);

        Ok(Self {
            width,
            height,
            pixels: decoded.into_raw(),
        })
    }

    /// A `size` x `size` checkerboard of `cells` x `cells` squares.
    pub fn checkerboard(size: u32, cells: u32) -> Self {
        const LIGHT: [u8; 4] = [230, 230, 230, 255];
        const DARK: [u8; 4] = [40, 40, 48, 255];

        let size = size.max(1);
        let cell = (size / cells.clamp(1, size)).max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let texel = if (x / cell + y / cell) % 2 == 0 {
                    LIGHT
                } else {
                    DARK
                };
                pixels.extend_from_slice(&texel);
            }
        }

        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// Bytes the pixel data should occupy.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    pub fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.pixels.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkerboard_layout() {
        let image = ImageData::checkerboard(8, 2);
        assert_eq!(image.pixels.len(), image.byte_len());
        assert_eq!(image.texel(0, 0), image.texel(3, 3));
        assert_ne!(image.texel(0, 0), image.texel(4, 0));
        assert_eq!(image.texel(4, 4), image.texel(0, 0));
        assert_eq!(image.texel(8, 0), None);
    }

    #[test]
    fn test_checkerboard_degenerate_arguments() {
        let image = ImageData::checkerboard(0, 0);
        assert_eq!((image.width, image.height), (1, 1));
        assert_eq!(image.pixels.len(), 4);
    }

    #[test]
    fn test_load_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixels.png");
        let source = image::RgbaImage::from_fn(3, 2, |x, y| image::Rgba([x as u8, y as u8, 7, 255]));
        source.save(&path).unwrap();

        let loaded = ImageData::load_rgba8(&path).unwrap();
        assert_eq!((loaded.width, loaded.height), (3, 2));
        assert_eq!(loaded.texel(2, 1), Some([2, 1, 7, 255]));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ImageData::load_rgba8(Path::new("missing.png")),
            Err(ResourceError::FileNotFound(_))
        ));
    }
}
