//! Descriptor sets binding each image's uniform buffer and the texture.

use std::sync::Arc;

use tracing::debug;

use texquad_rhi::buffer::Buffer;
use texquad_rhi::descriptor::{DescriptorKind, DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use texquad_rhi::device::Device;
use texquad_rhi::texture::Texture;
use texquad_rhi::vk;
use texquad_rhi::{RhiError, RhiResult};

use crate::ubo::Matrices;

pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;

/// Binding 0: matrices for the vertex stage. Binding 1: the texture for the
/// fragment stage.
pub fn quad_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        DescriptorKind::UniformBuffer.binding(UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX),
        DescriptorKind::CombinedImageSampler.binding(SAMPLER_BINDING, vk::ShaderStageFlags::FRAGMENT),
    ]
}

/// One descriptor set per swapchain image, written once at creation.
pub struct QuadDescriptors {
    // The pool frees the sets; it must go before the layout.
    pool: DescriptorPool,
    layout: DescriptorSetLayout,
    sets: Vec<vk::DescriptorSet>,
}

impl QuadDescriptors {
    /// Allocates `uniform_buffers.len()` sets and points set `i` at
    /// `uniform_buffers[i]` and at `texture`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for an empty buffer list, or any
    /// creation or allocation error.
    pub fn new(
        device: Arc<Device>,
        uniform_buffers: &[Buffer],
        texture: &Texture,
    ) -> RhiResult<Self> {
        if uniform_buffers.is_empty() {
            return Err(RhiError::InvalidHandle(
                "descriptor sets need at least one uniform buffer".to_string(),
            ));
        }

        let bindings = quad_bindings();
        let layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
        let pool = DescriptorPool::for_bindings(
            device.clone(),
            &bindings,
            uniform_buffers.len() as u32,
        )?;
        let sets = pool.allocate(&layout, uniform_buffers.len())?;

        let mut writer = DescriptorWriter::new();
        for (&set, ubo) in sets.iter().zip(uniform_buffers) {
            writer
                .uniform_buffer(set, UNIFORM_BINDING, ubo.handle(), Matrices::SIZE as vk::DeviceSize)
                .combined_image_sampler(set, SAMPLER_BINDING, texture.view(), texture.sampler());
        }
        writer.submit(&device);

        debug!("Wrote {} quad descriptor sets", sets.len());

        Ok(Self { pool, layout, sets })
    }

    #[inline]
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }

    #[inline]
    pub fn set(&self, image_index: usize) -> vk::DescriptorSet {
        self.sets[image_index]
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.pool.max_sets()
    }
}
