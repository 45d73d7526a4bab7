//! Configuration management for the rangefinder
//!
//! Provides loading, saving and validation of camera, autofocus, zoom,
//! capture overlay and storage settings. Settings live in a TOML file.

use crate::errors::RangefinderError;
use crate::types::CameraMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangefinderConfig {
    pub camera: CameraConfig,
    pub focus: FocusConfig,
    pub zoom: ZoomConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
}

/// Session setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Mode selected when the session first opens
    pub default_mode: CameraMode,
    /// Buffered images in the still sink
    pub still_max_images: u32,
}

/// Tap-to-focus behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusConfig {
    /// Metering region is 1/divisor of the active array per axis
    pub region_divisor: i32,
    /// Delay before the focus indicator starts fading (ms)
    pub indicator_fade_delay_ms: u64,
    /// Duration of the focus indicator fade (ms)
    pub indicator_fade_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomConfig {
    /// Zoom factors offered in ZOOM mode
    pub presets: Vec<f32>,
}

/// Burn-in overlay and encoding of saved captures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Focus ring radius as a fraction of image height
    pub ring_radius_ratio: f32,
    /// Focus ring opacity (0.0-1.0)
    pub ring_opacity: f32,
    /// Label glyph height as a fraction of image height
    pub text_height_ratio: f32,
    /// Label baseline as a fraction of image height
    pub label_baseline_ratio: f32,
    /// Padding around the label (px)
    pub label_padding_px: u32,
    /// Corner radius of the label background (px)
    pub label_corner_radius_px: u32,
    /// Alpha of the label background (0-255)
    pub label_background_alpha: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding saved images and the index
    pub output_directory: String,
}

impl Default for RangefinderConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                default_mode: CameraMode::Wide,
                still_max_images: 2,
            },
            focus: FocusConfig {
                region_divisor: 5,
                indicator_fade_delay_ms: 100,
                indicator_fade_duration_ms: 500,
            },
            zoom: ZoomConfig {
                presets: vec![2.0, 3.0, 4.0, 5.0, 10.0],
            },
            capture: CaptureConfig {
                jpeg_quality: 95,
                ring_radius_ratio: 0.065,
                ring_opacity: 0.7,
                text_height_ratio: 0.05,
                label_baseline_ratio: 0.08,
                label_padding_px: 20,
                label_corner_radius_px: 15,
                label_background_alpha: 180,
            },
            storage: StorageConfig {
                output_directory: "./rangefinder_images".to_string(),
            },
        }
    }
}

impl RangefinderConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RangefinderError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            RangefinderError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: RangefinderConfig = toml::from_str(&contents).map_err(|e| {
            RangefinderError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate().map_err(RangefinderError::ConfigError)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RangefinderError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RangefinderError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            RangefinderError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            RangefinderError::ConfigError(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("rangefinder.toml")
    }

    /// Load from default location, falling back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.camera.still_max_images == 0 {
            return Err("Still sink needs at least one image buffer".to_string());
        }

        if self.focus.region_divisor < 1 {
            return Err("Focus region divisor must be at least 1".to_string());
        }

        if self.zoom.presets.iter().any(|z| !z.is_finite() || *z < 1.0) {
            return Err("Zoom presets must be finite and at least 1.0".to_string());
        }

        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        for (name, ratio) in [
            ("Ring radius ratio", self.capture.ring_radius_ratio),
            ("Text height ratio", self.capture.text_height_ratio),
            ("Label baseline ratio", self.capture.label_baseline_ratio),
            ("Ring opacity", self.capture.ring_opacity),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(format!("{} must be between 0.0 and 1.0", name));
            }
        }

        if self.storage.output_directory.trim().is_empty() {
            return Err("Output directory must not be empty".to_string());
        }

        Ok(())
    }
}
