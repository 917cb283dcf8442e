//! Decoded texture pixels.

use std::path::Path;

use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Bytes per RGBA8 texel.
const RGBA8_TEXEL_SIZE: usize = 4;

/// A decoded image as `width * height` RGBA8 texels, row-major, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Wraps already decoded pixels after checking their length.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidPixelData`] for zero dimensions or a
    /// buffer that is not exactly `width * height * 4` bytes.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> ResourceResult<Self> {
        let expected = rgba8_len(width, height);
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(ResourceError::InvalidPixelData {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decodes an image file and converts it to RGBA8.
    ///
    /// Any format the `image` crate was built with is accepted; sources
    /// without alpha get an opaque alpha channel.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::FileNotFound`] if `path` does not exist
    /// - [`ResourceError::Image`] if decoding fails
    pub fn load_rgba8(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();

        info!("Loaded texture {}: {}x{}", path.display(), width, height);

        Self::from_rgba8(width, height, rgba.into_raw())
    }

    /// Size of the pixel buffer in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

fn rgba8_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * RGBA8_TEXEL_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba8_accepts_exact_length() {
        let data = TextureData::from_rgba8(2, 3, vec![0; 24]).unwrap();
        assert_eq!((data.width, data.height), (2, 3));
        assert_eq!(data.byte_len(), 24);
    }

    #[test]
    fn test_from_rgba8_rejects_length_mismatch() {
        let err = TextureData::from_rgba8(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::InvalidPixelData {
                expected: 16,
                actual: 15,
                ..
            }
        ));
    }

    #[test]
    fn test_from_rgba8_rejects_empty_image() {
        assert!(TextureData::from_rgba8(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = TextureData::load_rgba8(Path::new("does/not/exist.png")).unwrap_err();
        assert!(matches!(err, ResourceError::FileNotFound(_)));
    }
}
