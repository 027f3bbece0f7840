//! Application configuration (JSON).

#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::params::Params;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    /// Logical size
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Event Horizon".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Orbit damping factor per update
    pub damping: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 2.0, 8.0],
            target: [0.0, 0.0, 0.0],
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
            damping: 0.05,
        }
    }
}

impl CameraConfig {
    /// Copy with unusable values replaced by defaults or clamped.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let mut out = self.clone();
        if !out.position.iter().chain(&out.target).all(|c| c.is_finite()) || out.position == out.target {
            log::warn!("camera position/target {:?} -> {:?} is invalid, using defaults", out.position, out.target);
            out.position = defaults.position;
            out.target = defaults.target;
        }
        out.fov = repair("camera.fov", out.fov, 1.0, 179.0, defaults.fov);
        out.near = repair("camera.near", out.near, 1e-4, 1e4, defaults.near);
        out.far = repair("camera.far", out.far, 1e-3, 1e7, defaults.far);
        if out.far <= out.near {
            log::warn!("camera.far {} is not beyond camera.near {}, using {}", out.far, out.near, out.near * 1e4);
            out.far = out.near * 1e4;
        }
        out.damping = repair("camera.damping", out.damping, 0.001, 1.0, defaults.damping);
        out
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarfieldConfig {
    pub count: usize,
    /// Edge length of the cube the stars are scattered in, centred on the origin
    pub spread: f32,
    /// World-space point size
    pub size: f32,
    pub seed: u64,
}

impl Default for StarfieldConfig {
    fn default() -> Self {
        Self {
            count: 5000,
            spread: 100.0,
            size: 0.05,
            seed: 0x5EED_57A2,
        }
    }
}

impl StarfieldConfig {
    /// Copy with unusable values replaced by defaults or clamped.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        Self {
            spread: repair("stars.spread", self.spread, 1e-3, MAX_STAR_SPREAD, defaults.spread),
            size: repair("stars.size", self.size, 0.0, 100.0, defaults.size),
            ..self.clone()
        }
    }
}

/// Largest accepted starfield cube edge.
pub const MAX_STAR_SPREAD: f32 = 1.0e6;

fn repair(name: &str, value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if !value.is_finite() {
        log::warn!("{} is not finite, using default {}", name, fallback);
        fallback
    } else if value < min || value > max {
        log::warn!("{} = {} out of range [{}, {}], clamping", name, value, min, max);
        value.clamp(min, max)
    } else {
        value
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub camera: CameraConfig,
    pub stars: StarfieldConfig,
    pub params: Params,
    /// Upper bound applied to the device pixel ratio before the resolution
    /// scale is multiplied in.
    pub max_pixel_ratio: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            camera: CameraConfig::default(),
            stars: StarfieldConfig::default(),
            params: Params::default(),
            max_pixel_ratio: 2.0,
        }
    }
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let mut config: AppConfig =
            serde_json::from_str(text).context("Failed to parse configuration JSON")?;
        config.params = config.params.sanitized();
        config.camera = config.camera.sanitized();
        config.stars = config.stars.sanitized();
        if !config.max_pixel_ratio.is_finite() || config.max_pixel_ratio <= 0.0 {
            log::warn!(
                "max_pixel_ratio {} is invalid, using 2.0",
                config.max_pixel_ratio
            );
            config.max_pixel_ratio = 2.0;
        }
        Ok(config)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(AppConfig::from_json("{}").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = AppConfig::from_json(
            r#"{"window": {"width": 640}, "stars": {"count": 10}, "params": {"lensing_mass": 0.5}}"#,
        )
        .unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.stars.count, 10);
        // clamped into [0, 0.1]
        assert_eq!(config.params.lensing_mass, 0.1);
    }

    #[test]
    fn test_out_of_range_camera_and_stars_are_repaired() {
        let config = AppConfig::from_json(
            r#"{"camera": {"fov": 500, "near": -1, "far": 0.05, "damping": 0},
                "stars": {"spread": 3.0e38, "size": -2}}"#,
        )
        .unwrap();
        assert_eq!(config.camera.fov, 179.0);
        assert_eq!(config.camera.near, 1e-4);
        assert!(config.camera.far > config.camera.near);
        assert_eq!(config.camera.damping, 0.001);
        assert_eq!(config.stars.spread, MAX_STAR_SPREAD);
        assert_eq!(config.stars.size, 0.0);
    }

    #[test]
    fn test_degenerate_camera_falls_back_to_default() {
        let config = AppConfig::from_json(r#"{"camera": {"position": [0, 0, 0]}}"#).unwrap();
        assert_eq!(config.camera.position, CameraConfig::default().position);
        assert_eq!(config.camera.target, CameraConfig::default().target);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(AppConfig::from_json("{ not json").is_err());
        assert!(AppConfig::from_json(r#"{"params": {"disk_color": "red"}}"#).is_err());
    }
}
