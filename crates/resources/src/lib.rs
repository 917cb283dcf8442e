//! Asset loading for texquad.
//!
//! Decodes image files into tightly packed RGBA8 pixels ready for upload.

mod error;
mod texture;

pub use error::{ResourceError, ResourceResult};
pub use texture::TextureData;
