//! Core utilities shared by the texquad crates.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Configuration loading

mod config;
mod error;
mod logging;
mod timer;

pub use config::{AssetConfig, FrameConfig, RendererConfig, VulkanConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FPS_REPORT_INTERVAL, FpsCounter, Timer};
