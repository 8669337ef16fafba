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

mod app;
mod config;
mod geojson;
mod map;
mod pmtiles;
mod protocol;
mod style;
mod surface;
mod time_slider;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eframe::egui;
use layer_sync::{DatasetDate, HourIndex};
use log::{info, warn};

use app::MapApp;
use config::AppConfig;
use protocol::ProtocolRegistry;
use style::StyleDocument;

/// Hourly sea-level pressure and wind viewer
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Layer catalogue (JSON)
    #[arg(long)]
    style: Option<PathBuf>,

    /// Directory or URL prefix holding wind_<date>_<hhh>.png textures
    #[arg(long)]
    textures: Option<String>,

    /// Dataset day, YYYY-MM-DD or YYYYMMDD
    #[arg(long)]
    date: Option<DatasetDate>,

    /// Hour shown at startup (0-23), defaults to 00
    #[arg(long)]
    hour: Option<HourIndex>,

    /// Log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Install wind textures even if a newer hour was selected while loading
    #[arg(long)]
    keep_stale_textures: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    save_config: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("Starting Isobar Desktop...");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    apply_overrides(&mut config, &args);

    if args.save_config {
        config.save()?;
        println!("Configuration saved to {}", AppConfig::get_config_path()?.display());
        return Ok(());
    }

    let style_path = PathBuf::from(&config.style_path);
    let style = StyleDocument::load(&style_path)?;
    let base_dir = style_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    let registry = Arc::new(ProtocolRegistry::with_defaults(base_dir));

    let runtime = tokio::runtime::Runtime::new()?;
    let start_hour = args.hour.unwrap_or(HourIndex::MIN);
    let app = MapApp::new(config, runtime, &style, registry, start_hour);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title("Isobar Desktop"),
        ..Default::default()
    };

    eframe::run_native(
        "Isobar Desktop",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )?;

    Ok(())
}

/// Command line values win over the stored configuration
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(style) = &args.style {
        config.style_path = style.display().to_string();
    }
    if let Some(textures) = &args.textures {
        config.texture_root.clone_from(textures);
    }
    if let Some(date) = args.date {
        config.dataset_date = date;
    }
    if args.keep_stale_textures {
        config.discard_stale_textures = false;
    }
}
