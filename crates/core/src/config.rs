//! Runtime configuration loaded from TOML.
//!
//! Every field has a default, so a missing file or a partial file both
//! produce a usable [`RendererConfig`].
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [frame]
//! timeout_ms = 2000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// Window settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Vulkan".to_string(),
        }
    }
}

/// Instance-level Vulkan settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulkanConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Request `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub validation: bool,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            app_name: "Vulkan Testing App".to_string(),
            validation: cfg!(debug_assertions),
        }
    }
}

/// Paths of the pre-built assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub texture: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            vertex_shader: PathBuf::from("shaders/shader.vert.spv"),
            fragment_shader: PathBuf::from("shaders/shader.frag.spv"),
            texture: PathBuf::from("textures/pengu.png"),
        }
    }
}

/// Frame loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Upper bound for every host-side wait on the GPU, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl FrameConfig {
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub window: WindowConfig,
    pub vulkan: VulkanConfig,
    pub assets: AssetConfig,
    pub frame: FrameConfig,
}

impl RendererConfig {
    /// File looked up in the working directory when no path is given.
    pub const DEFAULT_FILE: &'static str = "texquad.toml";

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] for malformed TOML and
    /// [`Error::Config`] for out-of-range values.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigRead`] if the file cannot be read, otherwise the
    /// errors of [`RendererConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if given, else [`Self::DEFAULT_FILE`] if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(Self::DEFAULT_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    debug!("No {} found, using defaults", Self::DEFAULT_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.frame.timeout_ms == 0 {
            return Err(Error::Config("frame.timeout_ms must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.window.title, "Vulkan");
        assert_eq!(config.frame.timeout(), Duration::from_secs(5));
        assert_eq!(
            config.assets.vertex_shader,
            PathBuf::from("shaders/shader.vert.spv")
        );
    }

    #[test]
    fn test_partial_document_overrides_fields() {
        let config = RendererConfig::from_toml_str(
            r#"
            [window]
            width = 800

            [frame]
            timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.frame.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let err = RendererConfig::from_toml_str("[window\nwidth = ").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = RendererConfig::from_toml_str("[frame]\ntimeout_ms = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config =
            RendererConfig::from_toml_str(include_str!("../../../texquad.toml")).unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_default_assets_ship_with_the_workspace() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let assets = AssetConfig::default();

        assert!(root.join(&assets.texture).is_file());
        // The .spv files are build outputs; their GLSL sources are shipped
        for spirv in [&assets.vertex_shader, &assets.fragment_shader] {
            let source = root.join(spirv).with_extension("");
            assert!(source.is_file(), "missing shader source {}", source.display());
        }
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = RendererConfig::load("/nonexistent/texquad.toml").unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }
}
