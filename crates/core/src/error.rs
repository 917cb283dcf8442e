//! Error types shared by every texquad crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that are not tied to a specific GPU or asset subsystem.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or event loop errors
    #[error("Window error: {0}")]
    Window(String),

    /// Presentation surface could not be created for the window
    #[error("Surface error: {0}")]
    Surface(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file could not be read
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid TOML or has wrong field types
    #[error("Invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A configuration value is out of its accepted range
    #[error("Config error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the shared [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
