// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// The file is read through the asset loader so the same code works for APK
// assets on Android and an assets/ directory on desktop.
// Missing or malformed files fall back to defaults.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::time::Duration;

use crate::assets::AssetSource;

/// Asset path of the configuration file
pub const CONFIG_ASSET: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub graphics: GraphicsConfig,
    pub assets: AssetConfig,
    pub debug: DebugConfig,
}

/// Application identity reported to the driver
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    /// major, minor, patch
    pub version: [u32; 3],
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "vkdraw".to_string(),
            version: [1, 0, 0],
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GraphicsConfig {
    pub clear_color: [f32; 4],
    pub fence_timeout_ms: u64,
    pub adapter_index: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.098, 0.71, 0.996, 1.0],
            fence_timeout_ms: 10_000,
            adapter_index: 0,
        }
    }
}

/// Logical paths of the precompiled shader programs
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AssetConfig {
    pub vertex_shader: String,
    pub fragment_shader: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            vertex_shader: "shaders/tri-vert.spv".to_string(),
            fragment_shader: "shaders/tri-frag.spv".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DebugConfig {
    /// Off by default: not all devices support VK_EXT_debug_utils
    pub debug_messenger: bool,
    pub validation_layers: bool,
    pub print_device_info: bool,
    pub show_fps: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            debug_messenger: false,
            validation_layers: false,
            print_device_info: true,
            show_fps: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the asset source, falling back to defaults
    pub fn load(assets: &dyn AssetSource) -> Self {
        if !assets.exists(CONFIG_ASSET) {
            log::info!("No {} asset, using defaults", CONFIG_ASSET);
            return Config::default();
        }

        let loaded = assets
            .read(CONFIG_ASSET)
            .and_then(|bytes| {
                let text = String::from_utf8(bytes)
                    .with_context(|| format!("{} is not valid UTF-8", CONFIG_ASSET))?;
                Self::from_toml_str(&text)
            });

        match loaded {
            Ok(config) => {
                log::info!("Loaded configuration from {}", CONFIG_ASSET);
                log::debug!("Config: {:?}", config);
                config
            }
            Err(e) => {
                log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_ASSET, e);
                Config::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML configuration")
    }

    /// Fence wait budget per frame, in nanoseconds as the driver expects
    pub fn fence_timeout_ns(&self) -> u64 {
        let ns = Duration::from_millis(self.graphics.fence_timeout_ms).as_nanos();
        u64::try_from(ns).unwrap_or(u64::MAX)
    }

    /// Get log level as a filter
    pub fn log_level(&self) -> LevelFilter {
        match self.debug.log_level.to_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            other => {
                log::warn!("Unknown log level '{}', defaulting to info", other);
                LevelFilter::Info
            }
        }
    }
}
