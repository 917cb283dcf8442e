//! Sampled textures uploaded from decoded RGBA8 pixels.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use texquad_rhi::device::Device;
//! use texquad_rhi::command::CommandPool;
//! use texquad_rhi::texture::Texture;
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool, pixels: &[u8]) -> Result<(), texquad_rhi::RhiError> {
//! let texture = Texture::from_rgba8(device, pool, 256, 256, pixels)?;
//! let (view, sampler) = (texture.view(), texture.sampler());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageView};
use crate::sampler::Sampler;

/// Format textures are stored in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Bytes per RGBA8 pixel.
const BYTES_PER_PIXEL: u64 = 4;

/// A device-local image in `SHADER_READ_ONLY_OPTIMAL` with a view and sampler.
pub struct Texture {
    // Field order matters: view and sampler go before the image
    sampler: Sampler,
    view: ImageView,
    image: Image,
}

impl Texture {
    /// Uploads `pixels` (row-major RGBA8, `width * height * 4` bytes).
    ///
    /// Steps: staging buffer, `UNDEFINED -> TRANSFER_DST_OPTIMAL`, copy,
    /// `TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL`, then view and
    /// sampler. Each step waits for the queue, so the staging buffer is
    /// released on return.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if `pixels` has the wrong length,
    /// or any creation or submission error.
    pub fn from_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = u64::from(width) * u64::from(height) * BYTES_PER_PIXEL;
        if pixels.len() as u64 != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Texture {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;

        let image = Image::new(
            device.clone(),
            vk::Extent2D { width, height },
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        image.transition_layout(
            pool,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        image.copy_from_buffer(pool, &staging)?;
        image.transition_layout(
            pool,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        let view = image.create_view()?;
        let sampler = Sampler::new_linear_repeat(device)?;

        info!("Texture uploaded: {}x{}", width, height);

        Ok(Self {
            sampler,
            view,
            image,
        })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}
