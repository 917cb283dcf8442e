//! The textured-quad renderer.
//!
//! [`Renderer::new`] builds everything up front: swapchain, render pass,
//! pipeline, quad buffers, texture, one uniform buffer, descriptor set and
//! pre-recorded command buffer per swapchain image, and two frame slots.
//! After that a frame only writes one uniform buffer and resubmits a
//! recorded command buffer.
//!
//! # Resource destruction order
//!
//! 1. Wait for the device to go idle
//! 2. Per-frame objects, command buffers, descriptors, buffers, texture
//! 3. Pipeline, framebuffers, render pass, swapchain
//! 4. Device, surface, instance
//!
//! `ManuallyDrop` keeps steps 2-3 ahead of step 4.

use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use texquad_core::{AssetConfig, RendererConfig, Timer};
use texquad_platform::Window;
use texquad_resources::TextureData;
use texquad_rhi::buffer::{Buffer, BufferUsage};
use texquad_rhi::command::{CommandBuffer, CommandPool, IndexedDraw, RenderTarget, Submission};
use texquad_rhi::device::Device;
use texquad_rhi::pipeline::{CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use texquad_rhi::render_pass::{Framebuffer, RenderPass};
use texquad_rhi::shader::{Shader, ShaderStage};
use texquad_rhi::swapchain::Swapchain;
use texquad_rhi::sync::{FrameSlot, MAX_FRAMES_IN_FLIGHT};
use texquad_rhi::texture::Texture;
use texquad_rhi::vertex::Vertex;
use texquad_rhi::vk;
use texquad_rhi::{RhiError, RhiResult};

use crate::context::RenderContext;
use crate::descriptors::QuadDescriptors;
use crate::error::RendererResult;
use crate::frame_manager::{CancellationToken, FrameBackend, FrameSynchronizer};
use crate::mesh::QuadMesh;
use crate::ubo::Matrices;

/// Opaque black.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

const SHADER_ENTRY_POINT: &str = "main";

/// Vulkan implementation of the frame loop's GPU steps.
pub struct VulkanFrameBackend {
    slots: Vec<FrameSlot>,
    // Freed with `command_pool`.
    command_buffers: Vec<CommandBuffer>,
    command_pool: CommandPool,
    descriptors: QuadDescriptors,
    uniform_buffers: Vec<Buffer>,
    texture: Texture,
    mesh: QuadMesh,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<Device>,
    timer: Timer,
}

impl VulkanFrameBackend {
    /// Creates all per-window GPU state for a `width` x `height` surface.
    ///
    /// # Errors
    ///
    /// Fails on any creation error, or if the shaders or the texture cannot
    /// be read.
    pub fn new(
        context: &RenderContext,
        width: u32,
        height: u32,
        assets: &AssetConfig,
    ) -> RendererResult<Self> {
        let device = context.device().clone();
        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;

        let swapchain = Swapchain::new(device.clone(), context.surface().handle(), width, height)?;
        let extent = swapchain.extent();
        let image_count = swapchain.image_count();

        let render_pass = RenderPass::new(device.clone(), swapchain.format())?;
        let framebuffers =
            Framebuffer::for_views(&device, &render_pass, swapchain.image_views(), extent)?;

        // Setup uploads go through their own short-lived pool.
        let upload_pool = CommandPool::new_transient(device.clone(), graphics_family)?;
        let mesh = QuadMesh::upload(device.clone(), &upload_pool)?;
        let texture_data = TextureData::load_rgba8(&assets.texture)?;
        let texture = Texture::from_rgba8(
            device.clone(),
            &upload_pool,
            texture_data.width,
            texture_data.height,
            &texture_data.pixels,
        )?;
        drop(upload_pool);

        let uniform_buffers = (0..image_count)
            .map(|_| Buffer::new(device.clone(), BufferUsage::Uniform, Matrices::SIZE as u64))
            .collect::<RhiResult<Vec<_>>>()?;
        let descriptors = QuadDescriptors::new(device.clone(), &uniform_buffers, &texture)?;

        let pipeline_layout = PipelineLayout::new(device.clone(), &[descriptors.layout()])?;
        let pipeline = build_pipeline(&device, assets, &render_pass, &pipeline_layout, extent)?;

        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffers = command_pool.allocate_command_buffers(image_count as u32)?;
        for (index, command_buffer) in command_buffers.iter().enumerate() {
            let target = RenderTarget {
                render_pass: render_pass.handle(),
                framebuffer: framebuffers[index].handle(),
                extent,
                clear_color: CLEAR_COLOR,
            };
            let sets = [descriptors.set(index)];
            let draw = IndexedDraw {
                bind_point: pipeline.bind_point(),
                pipeline: pipeline.handle(),
                layout: pipeline_layout.handle(),
                descriptor_sets: &sets,
                vertex_buffer: mesh.vertex_buffer(),
                index_buffer: mesh.index_buffer(),
                index_type: vk::IndexType::UINT32,
                index_count: mesh.index_count(),
            };
            record_quad_commands(command_buffer, &target, &draw)?;
        }

        let slots = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSlot::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        info!(
            "Quad renderer ready: {}x{}, {} images, {} frames in flight",
            extent.width,
            extent.height,
            image_count,
            slots.len()
        );

        Ok(Self {
            slots,
            command_buffers,
            command_pool,
            descriptors,
            uniform_buffers,
            texture,
            mesh,
            pipeline,
            pipeline_layout,
            framebuffers,
            render_pass,
            swapchain,
            device,
            timer: Timer::new(),
        })
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }
}

impl FrameBackend for VulkanFrameBackend {
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn wait_slot(&mut self, slot: usize, timeout: Duration) -> RhiResult<()> {
        self.slots[slot].in_flight_fence().wait(timeout)
    }

    fn reset_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.slots[slot].in_flight_fence().reset()
    }

    fn acquire(&mut self, slot: usize, timeout: Duration) -> RhiResult<u32> {
        self.swapchain
            .acquire_next_image(self.slots[slot].image_available().handle(), timeout)
    }

    fn update_uniforms(&mut self, image: u32) -> RhiResult<()> {
        let extent = self.swapchain.extent();
        let matrices = Matrices::compute(self.timer.elapsed_secs(), extent.width, extent.height);
        self.uniform_buffers[image as usize].write_data(0, matrices.as_bytes())
    }

    fn submit(&mut self, slot: usize, image: u32) -> RhiResult<()> {
        let frame = &self.slots[slot];

        let wait_semaphores = [frame.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[image as usize].handle()];
        let signal_semaphores = [frame.render_finished().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer was recorded at setup and the frame
        // loop has waited for every earlier submission that used it or
        // this slot's fence.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.in_flight_fence().handle())
        }
    }

    fn present(&mut self, slot: usize, image: u32) -> RhiResult<()> {
        self.swapchain.present(
            self.device.present_queue(),
            image,
            self.slots[slot].render_finished().handle(),
        )
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}

fn build_pipeline(
    device: &Arc<Device>,
    assets: &AssetConfig,
    render_pass: &RenderPass,
    layout: &PipelineLayout,
    extent: vk::Extent2D,
) -> RhiResult<Pipeline> {
    // Modules are only needed until the pipeline exists.
    let vertex_shader = Shader::from_spirv_file(
        device.clone(),
        &assets.vertex_shader,
        ShaderStage::Vertex,
        SHADER_ENTRY_POINT,
    )?;
    let fragment_shader = Shader::from_spirv_file(
        device.clone(),
        &assets.fragment_shader,
        ShaderStage::Fragment,
        SHADER_ENTRY_POINT,
    )?;

    GraphicsPipelineBuilder::new()
        .vertex_shader(&vertex_shader)
        .fragment_shader(&fragment_shader)
        .vertex_binding(Vertex::binding_description())
        .vertex_attributes(&Vertex::attribute_descriptions())
        .cull_mode(CullMode::Back)
        .front_face(FrontFace::CounterClockwise)
        .extent(extent)
        .render_pass(render_pass.handle(), 0)
        .build(device.clone(), layout)
}

fn record_quad_commands(
    command_buffer: &CommandBuffer,
    target: &RenderTarget,
    draw: &IndexedDraw<'_>,
) -> RhiResult<()> {
    command_buffer.record(Submission::Repeated, |cmd| {
        cmd.render_pass(target, |cmd| cmd.draw_indexed(draw));
        Ok(())
    })
}

/// Window-bound renderer: the Vulkan context plus the frame loop.
pub struct Renderer {
    frames: ManuallyDrop<FrameSynchronizer<VulkanFrameBackend>>,
    context: ManuallyDrop<RenderContext>,
}

impl Renderer {
    /// Initializes Vulkan for `window` and prepares the quad.
    ///
    /// `cancel` stops [`render_frame`](Self::render_frame) before its next
    /// wait once cancelled.
    ///
    /// # Errors
    ///
    /// Any setup failure is returned; nothing is retried.
    pub fn new(
        window: &Window,
        config: &RendererConfig,
        cancel: CancellationToken,
    ) -> RendererResult<Self> {
        info!(
            "Initializing renderer ({}x{})",
            window.width(),
            window.height()
        );

        let context = RenderContext::new(window, &config.vulkan)?;
        let backend =
            VulkanFrameBackend::new(&context, window.width(), window.height(), &config.assets)?;
        let frames = FrameSynchronizer::new(backend, config.frame.timeout(), cancel);

        Ok(Self {
            frames: ManuallyDrop::new(frames),
            context: ManuallyDrop::new(context),
        })
    }

    /// Draws and presents one frame. Returns the swapchain image used.
    ///
    /// # Errors
    ///
    /// See [`FrameSynchronizer::draw_frame`].
    pub fn render_frame(&mut self) -> RendererResult<u32> {
        Ok(self.frames.draw_frame()?)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        self.frames.cancellation_token()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.frames.backend().extent()
    }

    pub fn device(&self) -> &Arc<Device> {
        self.context.device()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.frames.shutdown() {
            error!("Failed to wait for device idle during renderer drop: {}", e);
        }

        // SAFETY: each field is dropped exactly once, here, and never used again.
        unsafe {
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.context);
        }

        info!("Renderer destroyed");
    }
}
