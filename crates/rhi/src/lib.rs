//! Thin Vulkan layer over `ash`.
//!
//! It covers:
//! - instance, physical device selection and the logical device
//! - memory-backed buffers, images, textures and samplers
//! - swapchain, render pass, pipeline and descriptor plumbing
//! - command recording and the semaphores and fences that order it
//!
//! Every owning type releases its Vulkan objects in `Drop` and holds an
//! `Arc<Device>` so the device outlives them.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod resource;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
