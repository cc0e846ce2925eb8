//! Renderer configuration.
//!
//! Configuration is read from a TOML file when one is present and falls back
//! to built-in defaults otherwise. Every section is optional, and so is every
//! key inside a section.
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [render]
//! msaa_samples = 4
//! shadow_map_size = 2048
//! lighting = "shadowed"
//! post_process = "fxaa"
//!
//! [sync]
//! acquire_timeout_ms = 2000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "MULTIPASS_CONFIG";

/// Config file looked up in the working directory when the variable is unset.
pub const DEFAULT_CONFIG_FILE: &str = "multipass.toml";

/// Upper bound of `render.grid_splits`; the grid generator rejects more.
pub const MAX_GRID_SPLITS: u32 = 4096;

/// Lighting pipeline used for scene geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightingMode {
    /// Diffuse texture only, no light contribution.
    Unlit,
    /// Diffuse + specular from the directional light.
    Flat,
    /// Flat lighting attenuated by the shadow map.
    #[default]
    Shadowed,
}

impl LightingMode {
    /// All modes in selection order.
    pub const ALL: [LightingMode; 3] = [Self::Unlit, Self::Flat, Self::Shadowed];

    pub fn name(self) -> &'static str {
        match self {
            LightingMode::Unlit => "unlit",
            LightingMode::Flat => "flat",
            LightingMode::Shadowed => "shadowed",
        }
    }
}

/// Full-screen effect applied by the post-process pass.
///
/// The discriminant is the value pushed to the post-process shader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum PostProcessMode {
    #[default]
    None = 0,
    Laplace = 1,
    Blur = 2,
    Sepia = 3,
    Fxaa = 4,
}

impl PostProcessMode {
    /// All modes in shader order.
    pub const ALL: [PostProcessMode; 5] = [
        Self::None,
        Self::Laplace,
        Self::Blur,
        Self::Sepia,
        Self::Fxaa,
    ];

    /// Value written into the `mode` push constant.
    #[inline]
    pub fn shader_value(self) -> u32 {
        self as u32
    }

    /// Looks a mode up by its shader value.
    pub fn from_shader_value(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            PostProcessMode::None => "none",
            PostProcessMode::Laplace => "laplace",
            PostProcessMode::Blur => "blur",
            PostProcessMode::Sepia => "sepia",
            PostProcessMode::Fxaa => "fxaa",
        }
    }
}

/// Window settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
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
            title: "multipass".to_string(),
        }
    }
}

/// Pass and scene settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Sample count of the color pass. Clamped to what the device supports.
    pub msaa_samples: u32,
    /// Edge length of the square shadow map.
    pub shadow_map_size: u32,
    /// Split count of the ground grid along each axis.
    pub grid_splits: u32,
    /// Edge length of the ground grid in world units.
    pub grid_size: f32,
    pub lighting: LightingMode,
    pub post_process: PostProcessMode,
    /// Directory holding the compiled `.spv` shader binaries.
    pub shader_dir: PathBuf,
    /// Optional RGBA image used as the diffuse texture.
    pub texture: Option<PathBuf>,
    /// Optional OBJ mesh drawn in place of the cube.
    pub mesh: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            msaa_samples: 4,
            shadow_map_size: 2048,
            grid_splits: 4,
            grid_size: 100.0,
            lighting: LightingMode::default(),
            post_process: PostProcessMode::default(),
            shader_dir: PathBuf::from("shaders/spirv"),
            texture: None,
            mesh: None,
        }
    }
}

/// Bounds on the blocking points of the frame loop.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub acquire_timeout_ms: u64,
    pub fence_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    /// Skipped frames in a row tolerated before the loop gives up.
    pub max_consecutive_skipped_frames: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 2000,
            fence_timeout_ms: 1000,
            idle_timeout_ms: 1000,
            max_consecutive_skipped_frames: 120,
        }
    }
}

impl SyncConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugConfig {
    /// Enable the Khronos validation layer and debug names.
    pub validation: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
        }
    }
}

/// Complete renderer configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub sync: SyncConfig,
    pub debug: DebugConfig,
}

impl Config {
    /// Parses and validates a TOML document.
    ///
    /// `origin` is only used in error messages.
    pub fn from_toml_str(source: &str, origin: &Path) -> Result<Self> {
        let config: Config = toml::from_str(source).map_err(|source| Error::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source, path)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads the config named by [`CONFIG_ENV_VAR`], else [`DEFAULT_CONFIG_FILE`]
    /// when it exists, else the defaults.
    pub fn discover() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }

        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::load(default_path);
        }

        debug!("No config file found, using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if !matches!(self.render.msaa_samples, 1 | 2 | 4 | 8) {
            return Err(Error::Config(format!(
                "msaa_samples must be 1, 2, 4 or 8, got {}",
                self.render.msaa_samples
            )));
        }

        let size = self.render.shadow_map_size;
        if !size.is_power_of_two() || !(256..=16384).contains(&size) {
            return Err(Error::Config(format!(
                "shadow_map_size must be a power of two in 256..=16384, got {size}"
            )));
        }

        if !(1..=MAX_GRID_SPLITS).contains(&self.render.grid_splits) {
            return Err(Error::Config(format!(
                "grid_splits must be in 1..={MAX_GRID_SPLITS}, got {}",
                self.render.grid_splits
            )));
        }

        if !(self.render.grid_size > 0.0 && self.render.grid_size.is_finite()) {
            return Err(Error::Config(format!(
                "grid_size must be positive, got {}",
                self.render.grid_size
            )));
        }

        if self.sync.acquire_timeout_ms == 0
            || self.sync.fence_timeout_ms == 0
            || self.sync.idle_timeout_ms == 0
        {
            return Err(Error::Config(
                "sync timeouts must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.render.msaa_samples, 4);
        assert_eq!(config.render.shadow_map_size, 2048);
        assert_eq!(config.sync.acquire_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            "[render]\nmsaa_samples = 2\npost_process = \"sepia\"\n",
            Path::new("inline"),
        )
        .unwrap();
        assert_eq!(config.render.msaa_samples, 2);
        assert_eq!(config.render.post_process, PostProcessMode::Sepia);
        assert_eq!(config.render.shadow_map_size, 2048);
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_invalid_msaa_rejected() {
        let result = Config::from_toml_str("[render]\nmsaa_samples = 3\n", Path::new("inline"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_shadow_map_size_must_be_power_of_two() {
        let result =
            Config::from_toml_str("[render]\nshadow_map_size = 1000\n", Path::new("inline"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_grid_splits_range() {
        for splits in [0, 65_536] {
            let toml = format!("[render]\ngrid_splits = {splits}\n");
            let result = Config::from_toml_str(&toml, Path::new("inline"));
            assert!(matches!(result, Err(Error::Config(_))), "splits {splits}");
        }
        let toml = format!("[render]\ngrid_splits = {MAX_GRID_SPLITS}\n");
        assert!(Config::from_toml_str(&toml, Path::new("inline")).is_ok());
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let result = Config::from_toml_str("[window]\nfullscreen = true\n", Path::new("x.toml"));
        match result {
            Err(Error::ConfigParse { path, .. }) => assert_eq!(path, PathBuf::from("x.toml")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Config::from_toml_str("[sync]\nfence_timeout_ms = 0\n", Path::new("inline"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multipass.toml");
        std::fs::write(&path, "[window]\nwidth = 640\nheight = 480\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
    }

    #[test]
    fn test_post_process_mode_shader_values() {
        for (index, mode) in PostProcessMode::ALL.iter().enumerate() {
            assert_eq!(mode.shader_value(), index as u32);
            assert_eq!(PostProcessMode::from_shader_value(index as u32), Some(*mode));
        }
        assert_eq!(PostProcessMode::from_shader_value(5), None);
    }

    #[test]
    fn test_lighting_mode_parse() {
        let config =
            Config::from_toml_str("[render]\nlighting = \"flat\"\n", Path::new("inline")).unwrap();
        assert_eq!(config.render.lighting, LightingMode::Flat);
        assert_eq!(LightingMode::Flat.name(), "flat");
    }
}
