//! Descriptor set layouts, pools and writes.
//!
//! Pools are sized from the layout bindings and the number of sets, and sets
//! are never freed individually: they go away with the pool.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use texquad_rhi::device::Device;
//! use texquad_rhi::descriptor::{
//!     DescriptorKind, DescriptorPool, DescriptorSetLayout, DescriptorWriter,
//! };
//!
//! # fn example(device: Arc<Device>, ubo: vk::Buffer) -> Result<(), texquad_rhi::RhiError> {
//! let bindings = [
//!     DescriptorKind::UniformBuffer.binding(0, vk::ShaderStageFlags::VERTEX),
//!     DescriptorKind::CombinedImageSampler.binding(1, vk::ShaderStageFlags::FRAGMENT),
//! ];
//! let layout = DescriptorSetLayout::new(device.clone(), &bindings)?;
//! let pool = DescriptorPool::for_bindings(device.clone(), &bindings, 3)?;
//! let sets = pool.allocate(&layout, 3)?;
//!
//! let mut writer = DescriptorWriter::new();
//! writer.uniform_buffer(sets[0], 0, ubo, 192);
//! writer.submit(&device);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// The descriptor types this renderer binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    UniformBuffer,
    CombinedImageSampler,
}

impl DescriptorKind {
    pub fn to_vk(self) -> vk::DescriptorType {
        match self {
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            Self::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }

    /// Layout entry for a single descriptor of this kind.
    pub fn binding(
        self,
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(self.to_vk())
            .descriptor_count(1)
            .stage_flags(stages)
    }
}

/// Owned descriptor set layout.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe { device.handle().create_descriptor_set_layout(&info, None)? };

        debug!("Descriptor set layout: {} binding(s)", bindings.len());
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Capacity needed for `set_count` sets of a layout: one entry per
/// descriptor type, summed over bindings and multiplied by the set count.
pub fn pool_sizes(
    bindings: &[vk::DescriptorSetLayoutBinding],
    set_count: u32,
) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();

    for binding in bindings {
        let count = binding.descriptor_count * set_count;
        if let Some(size) = sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
            size.descriptor_count += count;
        } else {
            sizes.push(vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: count,
            });
        }
    }

    sizes
}

/// Descriptor pool with a fixed set budget and no per-set freeing.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a pool that fits exactly `set_count` sets laid out as
    /// `bindings`.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn for_bindings(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
        set_count: u32,
    ) -> RhiResult<Self> {
        let sizes = pool_sizes(bindings, set_count);
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(set_count)
            .pool_sizes(&sizes);
        let pool = unsafe { device.handle().create_descriptor_pool(&info, None)? };

        debug!("Descriptor pool: {} set(s), sizes {:?}", set_count, sizes);

        Ok(Self {
            device,
            pool,
            max_sets: set_count,
        })
    }

    /// Allocates `count` sets sharing `layout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is exhausted.
    pub fn allocate(
        &self,
        layout: &DescriptorSetLayout,
        count: usize,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.handle(); count];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        Ok(unsafe { self.device.handle().allocate_descriptor_sets(&info)? })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PendingInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    set: vk::DescriptorSet,
    binding: u32,
    info: PendingInfo,
}

/// Batches descriptor writes and applies them in one update call.
#[derive(Debug, Default)]
pub struct DescriptorWriter {
    writes: Vec<PendingWrite>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points `binding` of `set` at the first `range` bytes of `buffer`.
    pub fn uniform_buffer(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) -> &mut Self {
        self.writes.push(PendingWrite {
            set,
            binding,
            info: PendingInfo::Buffer(vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range,
            }),
        });
        self
    }

    /// Points `binding` of `set` at a view in `SHADER_READ_ONLY_OPTIMAL`
    /// sampled through `sampler`.
    pub fn combined_image_sampler(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> &mut Self {
        self.writes.push(PendingWrite {
            set,
            binding,
            info: PendingInfo::Image(vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn vk_writes(&self) -> Vec<vk::WriteDescriptorSet<'_>> {
        self.writes
            .iter()
            .map(|pending| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(pending.set)
                    .dst_binding(pending.binding)
                    .dst_array_element(0);
                match &pending.info {
                    PendingInfo::Buffer(info) => write
                        .descriptor_type(DescriptorKind::UniformBuffer.to_vk())
                        .buffer_info(std::slice::from_ref(info)),
                    PendingInfo::Image(info) => write
                        .descriptor_type(DescriptorKind::CombinedImageSampler.to_vk())
                        .image_info(std::slice::from_ref(info)),
                }
            })
            .collect()
    }

    /// Applies every queued write. The sets must not be in use by the GPU.
    pub fn submit(&self, device: &Device) {
        if self.writes.is_empty() {
            return;
        }

        let writes = self.vk_writes();
        unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
        debug!("Applied {} descriptor write(s)", writes.len());
    }
}
