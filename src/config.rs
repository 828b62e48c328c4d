//! Renderer configuration loaded from TOML.
//!
//! Every field has a default, so a config file only needs the values it changes:
//!
//! ```toml
//! vsync = true
//! clear_color = [0.1, 0.1, 0.1, 1.0]
//!
//! [shadow]
//! resolution = 2048
//!
//! [camera]
//! fov_degrees = 75.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Back buffer clear color, RGBA.
    pub clear_color: [f32; 4],
    /// Wait for vertical blank on present.
    pub vsync: bool,
    /// Ambient light color sent to the pixel shader.
    pub ambient_color: [f32; 3],
    pub shadow: ShadowConfig,
    pub camera: CameraConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.4, 0.6, 0.75, 0.0],
            vsync: false,
            ambient_color: [0.1, 0.1, 0.25],
            shadow: ShadowConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}

/// Shadow map placement and depth bias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub enabled: bool,
    /// Width and height of the square shadow map.
    pub resolution: u32,
    /// How far the light eye is placed back along the light direction.
    pub back_off_distance: f32,
    /// Width and height of the orthographic light volume.
    pub extent: f32,
    pub near: f32,
    pub far: f32,
    pub depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
    pub depth_bias_clamp: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolution: 1024,
            back_off_distance: 20.0,
            extent: 15.0,
            near: 1.0,
            far: 100.0,
            depth_bias: 1000,
            slope_scaled_depth_bias: 1.0,
            depth_bias_clamp: 0.0,
        }
    }
}

/// Projection and free-look movement tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Units per second.
    pub move_speed: f32,
    /// Radians per pixel of mouse movement.
    pub look_speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 60.0,
            near: 0.01,
            far: 900.0,
            move_speed: 1.0,
            look_speed: 0.0025,
        }
    }
}

impl RendererConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Loads a `.toml` config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::debug!("loaded renderer config from {}", path.display());
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.shadow.resolution, 1024);
        assert_eq!(config.camera.far, 900.0);
    }

    #[test]
    fn test_partial_override() {
        let config = RendererConfig::from_toml_str(
            "vsync = true\n[shadow]\nresolution = 2048\n[camera]\nfov_degrees = 90.0\n",
        )
        .unwrap();
        assert!(config.vsync);
        assert_eq!(config.shadow.resolution, 2048);
        assert_eq!(config.shadow.extent, 15.0);
        assert_eq!(config.camera.fov_degrees, 90.0);
        assert_eq!(config.camera.near, 0.01);
    }

    #[test]
    fn test_parse_error() {
        let result = RendererConfig::from_toml_str("vsync = \"sometimes\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "clear_color = [0.0, 0.0, 0.0, 1.0]").unwrap();
        let config = RendererConfig::load(file.path()).unwrap();
        assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ron").tempfile().unwrap();
        assert!(matches!(
            RendererConfig::load(file.path()),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.toml");
        let mut config = RendererConfig::default();
        config.shadow.enabled = false;
        config.save(&path).unwrap();
        assert_eq!(RendererConfig::load(&path).unwrap(), config);
    }
}
