//! Textured quad renderer.
//!
//! This crate ties the RHI together:
//! - Context setup (instance, surface, device)
//! - Quad geometry, texture and per-image uniforms
//! - The frame loop and its synchronization

pub mod context;
pub mod descriptors;
pub mod error;
pub mod frame_manager;
pub mod mesh;
pub mod renderer;
pub mod ubo;

pub use context::RenderContext;
pub use error::{RendererError, RendererResult};
pub use frame_manager::{CancellationToken, FrameBackend, FrameSynchronizer, ImageInUseTable};
pub use renderer::{Renderer, VulkanFrameBackend};
pub use ubo::Matrices;
