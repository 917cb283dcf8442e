//! Device-memory-backed buffers.
//!
//! # Overview
//!
//! - [`BufferUsage`] fixes the usage flags and memory properties of a buffer
//! - [`Buffer`] owns one `vk::Buffer` and the `vk::DeviceMemory` bound to it
//!
//! Memory is allocated per buffer and the type is chosen with
//! [`find_memory_type`](crate::memory::find_memory_type). Device-local
//! buffers are filled through a staging buffer and [`Buffer::copy`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use texquad_rhi::device::Device;
//! use texquad_rhi::command::CommandPool;
//! use texquad_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), texquad_rhi::RhiError> {
//! let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];
//! let index_buffer = Buffer::device_local_with_data(
//!     device,
//!     pool,
//!     BufferUsage::Index,
//!     bytemuck::cast_slice(&indices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::is_host_visible;
use crate::resource::ResourceHandles;

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex data, filled once through staging
    Vertex,
    /// Index data, filled once through staging
    Index,
    /// Shader uniforms, rewritten by the host every frame
    Uniform,
    /// Host-written source of a transfer
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Memory properties requested for this usage.
    pub fn memory_properties(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            BufferUsage::Uniform | BufferUsage::Staging => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// A buffer and the device memory bound to it.
///
/// Move-only. [`Buffer::destroy`] releases the buffer and then its memory,
/// and does nothing on later calls; `Drop` calls it.
pub struct Buffer {
    device: Arc<Device>,
    raw: ResourceHandles<vk::Buffer>,
    size: vk::DeviceSize,
    usage: BufferUsage,
    host_visible: bool,
}

impl Buffer {
    /// Creates a buffer of `size` bytes with memory matching `usage`.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidHandle`] if `size` is 0
    /// - [`RhiError::NoCompatibleMemoryType`] if no memory type fits
    /// - Vulkan errors from creation, allocation or binding
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let (memory, memory_type) = match Self::allocate_and_bind(&device, buffer, usage) {
            Ok(allocated) => allocated,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        debug!(
            "Created {} buffer: {} bytes (memory type {})",
            usage.name(),
            size,
            memory_type
        );

        let host_visible = is_host_visible(device.capabilities().memory_properties(), memory_type);

        Ok(Self {
            device,
            raw: ResourceHandles::new(buffer, memory),
            size,
            usage,
            host_visible,
        })
    }

    fn allocate_and_bind(
        device: &Device,
        buffer: vk::Buffer,
        usage: BufferUsage,
    ) -> RhiResult<(vk::DeviceMemory, u32)> {
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };
        let memory_type =
            device.find_memory_type(requirements.memory_type_bits, usage.memory_properties())?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = unsafe { device.handle().allocate_memory(&alloc_info, None)? };

        if let Err(e) = unsafe { device.handle().bind_buffer_memory(buffer, memory, 0) } {
            unsafe { device.handle().free_memory(memory, None) };
            return Err(e.into());
        }

        Ok((memory, memory_type))
    }

    /// Creates a host-visible buffer and fills it with `data`.
    ///
    /// # Errors
    ///
    /// See [`Buffer::new`] and [`Buffer::write_data`].
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Creates a device-local buffer and uploads `data` through a staging buffer.
    ///
    /// Blocks until the copy has finished; the staging buffer is released on return.
    ///
    /// # Errors
    ///
    /// See [`Buffer::new`] and [`Buffer::copy`].
    pub fn device_local_with_data(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let size = data.len() as vk::DeviceSize;
        let staging = Self::new_with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::new(device, usage, size)?;
        Self::copy(pool, &staging, &buffer, size)?;
        Ok(buffer)
    }

    /// Copies `size` bytes from `src` to `dst` on the device and waits for completion.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidHandle`] if `size` exceeds either buffer
    /// - errors from [`CommandPool::submit_one_time`]
    pub fn copy(pool: &CommandPool, src: &Buffer, dst: &Buffer, size: vk::DeviceSize) -> RhiResult<()> {
        if size > src.size || size > dst.size {
            return Err(RhiError::InvalidHandle(format!(
                "Copy of {} bytes exceeds buffers ({} -> {})",
                size, src.size, dst.size
            )));
        }

        let queue = src.device.graphics_queue();
        pool.submit_one_time(queue, |cmd| {
            cmd.copy_buffer(src.handle(), dst.handle(), size);
            Ok(())
        })
    }

    /// Writes `data` at `offset` through a temporary host mapping.
    ///
    /// The memory is host coherent, so no flush is needed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the buffer is not host visible
    /// - the write would exceed the buffer size
    /// - the buffer was destroyed
    /// - mapping fails
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        if !self.host_visible {
            return Err(RhiError::InvalidHandle(format!(
                "{} buffer is not host visible",
                self.usage.name()
            )));
        }

        check_write_range(offset, data.len(), self.size)?;

        if !self.raw.is_live() {
            return Err(RhiError::InvalidHandle("Buffer was destroyed".to_string()));
        }

        unsafe {
            let ptr = self.device.handle().map_memory(
                self.raw.memory(),
                offset,
                data.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )
            .map_err(RhiError::from_vk)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.handle().unmap_memory(self.raw.memory());
        }

        Ok(())
    }

    /// Releases the buffer and its memory. Later calls do nothing.
    pub fn destroy(&mut self) {
        if let Some((buffer, memory)) = self.raw.take() {
            unsafe {
                self.device.handle().destroy_buffer(buffer, None);
                self.device.handle().free_memory(memory, None);
            }
            debug!("Destroyed {} buffer", self.usage.name());
        }
    }

    /// Returns the Vulkan buffer handle, null after [`Buffer::destroy`].
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.raw.handle()
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Checks that `len` bytes at `offset` fit in a buffer of `size` bytes.
fn check_write_range(offset: vk::DeviceSize, len: usize, size: vk::DeviceSize) -> RhiResult<()> {
    match offset.checked_add(len as vk::DeviceSize) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RhiError::InvalidHandle(format!(
            "Write exceeds buffer size: offset {} + data {} > buffer {}",
            offset, len, size
        ))),
    }
}
