//! Renderer-level error type.

use thiserror::Error;

use texquad_resources::ResourceError;
use texquad_rhi::RhiError;

/// Everything that can fail while setting up or driving the renderer.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Platform(#[from] texquad_core::Error),
}

pub type RendererResult<T> = Result<T, RendererError>;
