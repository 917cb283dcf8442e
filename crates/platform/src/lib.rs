//! Windowing for texquad.
//!
//! Owns the winit window and turns it into a Vulkan surface plus the
//! instance extensions that surface needs.

mod window;

pub use window::{Surface, Window, required_extensions};

pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
