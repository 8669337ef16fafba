// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application configuration management.
//!
//! Settings are stored in TOML via confy. The selected hour is deliberately
//! not part of the configuration: every launch starts at the hour given on
//! the command line, or 00:00.

use layer_sync::{DatasetDate, EngineConfig, ParticleFieldConfig, StaleTexturePolicy};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "isobar-desktop";
const CONFIG_NAME: &str = "config";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Day covered by the dataset
    #[serde(default)]
    pub dataset_date: DatasetDate,

    /// Layer catalogue (JSON) listing relief, isobar and label sources
    #[serde(default = "default_style_path")]
    pub style_path: String,

    /// Directory or URL prefix holding the hourly wind textures
    #[serde(default = "default_texture_root")]
    pub texture_root: String,

    /// Basemap tile URL template with {s}, {z}, {x} and {y} placeholders
    #[serde(default = "default_basemap_url")]
    pub basemap_url: String,

    /// Initial map center latitude
    #[serde(default = "default_center_lat")]
    pub map_center_lat: f64,

    /// Initial map center longitude
    #[serde(default = "default_center_lon")]
    pub map_center_lon: f64,

    /// Initial map zoom level
    #[serde(default = "default_zoom")]
    pub default_zoom: f32,

    #[serde(default)]
    pub min_zoom: f32,

    #[serde(default = "default_max_zoom")]
    pub max_zoom: f32,

    /// Pressure relief opacity (0.0 - 1.0)
    #[serde(default = "default_relief_opacity")]
    pub relief_opacity: f32,

    /// Drop wind textures that finish loading after a newer hour was selected
    #[serde(default = "default_true")]
    pub discard_stale_textures: bool,

    /// Wind particle overlay parameters
    #[serde(default)]
    pub particles: ParticleFieldConfig,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_style_path() -> String {
    "styles/style.json".to_string()
}

fn default_texture_root() -> String {
    "data/wind".to_string()
}

fn default_basemap_url() -> String {
    "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}.png".to_string()
}

fn default_center_lat() -> f64 {
    35.9
}

fn default_center_lon() -> f64 {
    139.8
}

fn default_zoom() -> f32 {
    2.0
}

fn default_max_zoom() -> f32 {
    10.0
}

fn default_relief_opacity() -> f32 {
    0.6
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            dataset_date: DatasetDate::default(),
            style_path: default_style_path(),
            texture_root: default_texture_root(),
            basemap_url: default_basemap_url(),
            map_center_lat: default_center_lat(),
            map_center_lon: default_center_lon(),
            default_zoom: default_zoom(),
            min_zoom: 0.0,
            max_zoom: default_max_zoom(),
            relief_opacity: default_relief_opacity(),
            discard_stale_textures: true,
            particles: ParticleFieldConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating it with defaults on first run
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Engine settings derived from this configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            date: self.dataset_date,
            texture_root: self.texture_root.clone(),
            particles: self.particles.clone(),
            stale_textures: if self.discard_stale_textures {
                StaleTexturePolicy::Discard
            } else {
                StaleTexturePolicy::Install
            },
        }
    }

    /// Clamp a zoom level into the configured range
    pub fn clamp_zoom(&self, zoom: f32) -> f32 {
        zoom.clamp(self.min_zoom, self.max_zoom.max(self.min_zoom))
    }
}
