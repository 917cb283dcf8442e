//! Command pools and command buffer recording.
//!
//! Recording is scoped: [`CommandBuffer::record`] brackets a closure with
//! begin/end and [`CommandBuffer::render_pass`] does the same for a render
//! pass instance. A whole indexed draw, with everything it binds, is one
//! [`IndexedDraw`] value.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use texquad_rhi::device::Device;
//! use texquad_rhi::command::CommandPool;
//!
//! # fn example(device: Arc<Device>, family: u32) -> Result<(), texquad_rhi::RhiError> {
//! let pool = CommandPool::new_transient(device.clone(), family)?;
//! pool.submit_one_time(device.graphics_queue(), |cmd| {
//!     // record copies or barriers here
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// How often a recorded buffer will be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Submitted once, then freed or re-recorded.
    Once,
    /// Recorded at setup and resubmitted every time its image comes up.
    Repeated,
}

impl Submission {
    pub fn begin_flags(self) -> vk::CommandBufferUsageFlags {
        match self {
            Self::Once => vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            // Never pending twice: the frame loop waits for the image's
            // previous owner before resubmitting.
            Self::Repeated => vk::CommandBufferUsageFlags::empty(),
        }
    }
}

/// Vulkan command pool for one queue family.
///
/// Not thread-safe; the renderer records on a single thread.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a pool for buffers recorded once and submitted many times.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        Self::create(device, queue_family_index, vk::CommandPoolCreateFlags::empty())
    }

    /// Creates a pool for short-lived setup buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new_transient(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        Self::create(device, queue_family_index, vk::CommandPoolCreateFlags::TRANSIENT)
    }

    fn create(
        device: Arc<Device>,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> RhiResult<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(flags);
        let pool = unsafe { device.handle().create_command_pool(&info, None)? };

        info!(
            "Command pool created for queue family {} ({:?})",
            queue_family_index, flags
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates `count` primary buffers, freed together with the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let handles = unsafe { self.device.handle().allocate_command_buffers(&info) }
            .map_err(RhiError::from_vk)?;
        Ok(handles
            .into_iter()
            .map(|buffer| CommandBuffer {
                device: self.device.clone(),
                buffer,
            })
            .collect())
    }

    /// Records `record` into a fresh buffer, submits it to `queue` and blocks
    /// on `queue_wait_idle` before freeing the buffer.
    ///
    /// Stalls the queue; setup work only.
    ///
    /// # Errors
    ///
    /// Returns the first error from allocation, recording, submission or the
    /// idle wait. The buffer is freed in every case.
    pub fn submit_one_time<F>(&self, queue: vk::Queue, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        let cmd = self
            .allocate_command_buffers(1)?
            .pop()
            .ok_or_else(|| RhiError::InvalidHandle("command buffer allocation returned nothing".into()))?;

        let result = cmd.record(Submission::Once, record).and_then(|()| {
            let handles = [cmd.handle()];
            let submit = vk::SubmitInfo::default().command_buffers(&handles);
            let device = self.device.handle();
            unsafe {
                device
                    .queue_submit(queue, &[submit], vk::Fence::null())
                    .and_then(|()| device.queue_wait_idle(queue))
            }
            .map_err(RhiError::from_vk)
        });

        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.pool, &[cmd.handle()]);
        }

        result
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Framebuffer plus how to start a render pass instance on it.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

impl RenderTarget {
    /// The whole framebuffer.
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.extent,
        }
    }
}

/// Everything bound for one indexed draw starting at index 0, vertex offset 0.
#[derive(Debug, Clone, Copy)]
pub struct IndexedDraw<'a> {
    pub bind_point: vk::PipelineBindPoint,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_sets: &'a [vk::DescriptorSet],
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_type: vk::IndexType,
    pub index_count: u32,
}

/// A primary command buffer.
///
/// Does not own the handle; it is released with its [`CommandPool`].
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Begins recording, runs `commands`, then ends recording.
    ///
    /// # Errors
    ///
    /// Returns the begin or end error, or the first error from `commands`.
    /// A failed closure leaves the buffer in the recording state.
    pub fn record<F>(&self, submission: Submission, commands: F) -> RhiResult<()>
    where
        F: FnOnce(&Self) -> RhiResult<()>,
    {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(submission.begin_flags());
        let device = self.device.handle();

        unsafe { device.begin_command_buffer(self.buffer, &begin_info) }
            .map_err(RhiError::from_vk)?;
        commands(self)?;
        unsafe { device.end_command_buffer(self.buffer) }.map_err(RhiError::from_vk)
    }

    /// Records `commands` inside one inline render pass instance on `target`,
    /// clearing its color attachment.
    pub fn render_pass<F>(&self, target: &RenderTarget, commands: F)
    where
        F: FnOnce(&Self),
    {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: target.clear_color,
            },
        }];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(target.render_area())
            .clear_values(&clear_values);
        let device = self.device.handle();

        unsafe {
            device.cmd_begin_render_pass(self.buffer, &begin_info, vk::SubpassContents::INLINE);
        }
        commands(self);
        unsafe { device.cmd_end_render_pass(self.buffer) };
    }

    /// Binds the draw's pipeline, buffers and sets, then issues one instance.
    pub fn draw_indexed(&self, draw: &IndexedDraw<'_>) {
        let device = self.device.handle();
        let cmd = self.buffer;

        unsafe {
            device.cmd_bind_pipeline(cmd, draw.bind_point, draw.pipeline);
            device.cmd_bind_vertex_buffers(cmd, 0, &[draw.vertex_buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, draw.index_buffer, 0, draw.index_type);
            if !draw.descriptor_sets.is_empty() {
                device.cmd_bind_descriptor_sets(
                    cmd,
                    draw.bind_point,
                    draw.layout,
                    0,
                    draw.descriptor_sets,
                    &[],
                );
            }
            device.cmd_draw_indexed(cmd, draw.index_count, 1, 0, 0, 0);
        }
    }

    /// Records one image barrier.
    pub fn image_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier,
    ) {
        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(barrier),
            );
        }
    }

    /// Copies the first `size` bytes of `src` into `dst`.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy::default().size(size);
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer(self.buffer, src, dst, &[region]);
        }
    }

    /// Copies tightly packed texels from `src` into mip 0, layer 0 of `dst`.
    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        extent: vk::Extent2D,
    ) {
        let region = full_image_copy(extent);
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer_to_image(self.buffer, src, dst, dst_layout, &[region]);
        }
    }
}

/// Region covering a whole single-layer color image, source rows tightly
/// packed.
pub fn full_image_copy(extent: vk::Extent2D) -> vk::BufferImageCopy {
    vk::BufferImageCopy::default()
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
}
