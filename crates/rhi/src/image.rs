//! Device-memory-backed 2D images and their views.
//!
//! [`Image`] follows the same ownership rules as
//! [`Buffer`](crate::buffer::Buffer): one image, one allocation, released
//! together and only once.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::Buffer;
use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::resource::ResourceHandles;

/// Stage and access masks on both sides of a layout transition barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

/// Returns the barrier masks for the transitions a texture upload performs.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedLayoutTransition`] for any other pair.
pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> RhiResult<TransitionMasks> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            src_access: vk::AccessFlags::empty(),
            dst_stage: vk::PipelineStageFlags::TRANSFER,
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionMasks {
                src_stage: vk::PipelineStageFlags::TRANSFER,
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                dst_access: vk::AccessFlags::SHADER_READ,
            })
        }
        (old, new) => Err(RhiError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Subresource range of mip 0, layer 0 of a color image.
#[inline]
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// A single-mip 2D image with optimal tiling and its device memory.
pub struct Image {
    device: Arc<Device>,
    raw: ResourceHandles<vk::Image>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Image {
    /// Creates the image and binds memory with `properties`.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidHandle`] for a zero-sized extent
    /// - [`RhiError::NoCompatibleMemoryType`] if no memory type fits
    /// - Vulkan errors from creation, allocation or binding
    pub fn new(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image extent must be non-zero, got {}x{}",
                extent.width, extent.height
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let memory = match Self::allocate_and_bind(&device, image, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        debug!(
            "Created image {}x{} ({:?})",
            extent.width, extent.height, format
        );

        Ok(Self {
            device,
            raw: ResourceHandles::new(image, memory),
            format,
            extent,
        })
    }

    fn allocate_and_bind(
        device: &Device,
        image: vk::Image,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<vk::DeviceMemory> {
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let memory_type = device.find_memory_type(requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = unsafe { device.handle().allocate_memory(&alloc_info, None)? };

        if let Err(e) = unsafe { device.handle().bind_image_memory(image, memory, 0) } {
            unsafe { device.handle().free_memory(memory, None) };
            return Err(e.into());
        }

        Ok(memory)
    }

    /// Moves the whole image from `old_layout` to `new_layout` and waits.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedLayoutTransition`] for pairs outside
    /// [`transition_masks`], or a submission error.
    pub fn transition_layout(
        &self,
        pool: &CommandPool,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> RhiResult<()> {
        let masks = transition_masks(old_layout, new_layout)?;

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.handle())
            .subresource_range(color_subresource_range())
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        pool.submit_one_time(self.device.graphics_queue(), |cmd| {
            cmd.image_barrier(masks.src_stage, masks.dst_stage, &barrier);
            Ok(())
        })
    }

    /// Copies tightly packed pixels from `src` into the image and waits.
    ///
    /// The image must be in `TRANSFER_DST_OPTIMAL`.
    ///
    /// # Errors
    ///
    /// Returns a submission error.
    pub fn copy_from_buffer(&self, pool: &CommandPool, src: &Buffer) -> RhiResult<()> {
        pool.submit_one_time(self.device.graphics_queue(), |cmd| {
            cmd.copy_buffer_to_image(
                src.handle(),
                self.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                self.extent,
            );
            Ok(())
        })
    }

    /// Creates a color view of the whole image.
    ///
    /// # Errors
    ///
    /// Returns an error if view creation fails.
    pub fn create_view(&self) -> RhiResult<ImageView> {
        ImageView::new(self.device.clone(), self.handle(), self.format)
    }

    /// Releases the image and its memory. Later calls do nothing.
    pub fn destroy(&mut self) {
        if let Some((image, memory)) = self.raw.take() {
            unsafe {
                self.device.handle().destroy_image(image, None);
                self.device.handle().free_memory(memory, None);
            }
            debug!("Destroyed image");
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.raw.handle()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Owned 2D color image view.
pub struct ImageView {
    device: Arc<Device>,
    view: vk::ImageView,
}

impl ImageView {
    /// Creates a 2D color view over mip 0 of `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if view creation fails.
    pub fn new(device: Arc<Device>, image: vk::Image, format: vk::Format) -> RhiResult<Self> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(color_subresource_range());

        let view = unsafe { device.handle().create_image_view(&create_info, None)? };
        Ok(Self { device, view })
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transition_masks() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(masks.src_access, vk::AccessFlags::empty());
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
    }

    #[test]
    fn test_shader_read_transition_masks() {
        let masks = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(masks.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(masks.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_unsupported_transition_rejected() {
        let err = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RhiError::UnsupportedLayoutTransition {
                old: vk::ImageLayout::UNDEFINED,
                new: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            }
        ));

        // Reverse direction is not a recipe either
        assert!(
            transition_masks(
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL
            )
            .is_err()
        );
    }

    #[test]
    fn test_color_subresource_range() {
        let range = color_subresource_range();
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.layer_count, 1);
    }
}
