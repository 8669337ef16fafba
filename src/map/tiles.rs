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

//! Basemap raster tiles and Web Mercator projection.

use egui::{ColorImage, TextureHandle};
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;

pub const TILE_SIZE: u32 = 256;
const CACHE_DURATION_DAYS: u64 = 7;
const MAX_LATITUDE: f64 = 85.051_128_78;

/// Web Mercator projection utilities
pub struct WebMercator;

impl WebMercator {
    /// Convert latitude to Web Mercator Y in tile units at `zoom`
    pub fn lat_to_y(lat: f64, zoom: f64) -> f64 {
        let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let n = 2_f64.powf(zoom);
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0;
        // Rounding at the clamped latitude can overshoot the map edge slightly
        y.clamp(0.0, 1.0) * n
    }

    /// Convert longitude to Web Mercator X in tile units at `zoom`
    pub fn lon_to_x(lon: f64, zoom: f64) -> f64 {
        let n = 2_f64.powf(zoom);
        ((lon + 180.0) / 360.0) * n
    }

    /// Convert tile units back to latitude
    pub fn tile_to_lat(y: f64, zoom: f64) -> f64 {
        let n = 2_f64.powf(zoom);
        let lat_rad = ((std::f64::consts::PI * (1.0 - 2.0 * y / n)).sinh()).atan();
        lat_rad.to_degrees()
    }

    /// Convert tile units back to longitude
    pub fn tile_to_lon(x: f64, zoom: f64) -> f64 {
        let n = 2_f64.powf(zoom);
        x / n * 360.0 - 180.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// Expand a `{s}/{z}/{x}/{y}` URL template for this tile
    pub fn url(&self, template: &str) -> String {
        // Subdomain load balancing (a, b, c, d) based on tile coordinates
        let subdomain = ['a', 'b', 'c', 'd'][((self.x + self.y) % 4) as usize];
        template
            .replace("{s}", &subdomain.to_string())
            .replace("{z}", &self.zoom.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }

    /// Cache filename based on hash of URL
    fn cache_filename(&self, template: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url(template).as_bytes());
        format!("{:x}.png", hasher.finalize())
    }
}

pub enum TileState {
    Loading,
    Loaded(TextureHandle),
    Failed,
}

type TileTable = Arc<Mutex<HashMap<TileCoord, TileState>>>;

/// Fetches basemap tiles in the background and keeps them as egui textures
pub struct TileManager {
    cache_dir: PathBuf,
    url_template: String,
    runtime: Handle,
    client: reqwest::Client,
    tiles: TileTable,
}

impl TileManager {
    pub fn new(url_template: String, runtime: Handle) -> Self {
        let cache_dir = Self::get_cache_dir();

        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!("Failed to create tile cache directory: {}", e);
        }

        Self::cleanup_old_tiles(&cache_dir);

        Self {
            cache_dir,
            url_template,
            runtime,
            client: reqwest::Client::new(),
            tiles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn get_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("isobar-desktop")
            .join("tiles")
    }

    fn cleanup_old_tiles(cache_dir: &Path) {
        let now = SystemTime::now();
        let max_age = Duration::from_secs(CACHE_DURATION_DAYS * 24 * 60 * 60);

        let Ok(entries) = fs::read_dir(cache_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > max_age);
            if expired && fs::remove_file(entry.path()).is_ok() {
                debug!("Removed old tile cache: {:?}", entry.path());
            }
        }
    }

    /// Get tile from memory or disk cache, queueing a download if needed
    pub fn get_tile(&self, coord: TileCoord, ctx: &egui::Context) -> Option<TextureHandle> {
        let Ok(mut tiles) = self.tiles.lock() else {
            return None;
        };

        match tiles.get(&coord) {
            Some(TileState::Loaded(texture)) => return Some(texture.clone()),
            Some(TileState::Loading | TileState::Failed) => return None,
            None => {}
        }

        let cache_path = self.cache_dir.join(coord.cache_filename(&self.url_template));
        if let Some(texture) = fs::read(&cache_path)
            .ok()
            .and_then(|bytes| decode_tile(&bytes, coord, ctx))
        {
            tiles.insert(coord, TileState::Loaded(texture.clone()));
            return Some(texture);
        }

        tiles.insert(coord, TileState::Loading);
        drop(tiles);
        self.spawn_download(coord, cache_path, ctx.clone());
        None
    }

    fn spawn_download(&self, coord: TileCoord, cache_path: PathBuf, ctx: egui::Context) {
        let url = coord.url(&self.url_template);
        let client = self.client.clone();
        let tiles = Arc::clone(&self.tiles);

        self.runtime.spawn(async move {
            debug!("Downloading tile: {}", url);
            let state = match download(&client, &url).await {
                Ok(bytes) => {
                    if let Err(e) = fs::write(&cache_path, &bytes) {
                        warn!("Failed to save tile to cache: {}", e);
                    }
                    decode_tile(&bytes, coord, &ctx).map_or(TileState::Failed, TileState::Loaded)
                }
                Err(e) => {
                    warn!("Failed to fetch tile {}: {}", url, e);
                    TileState::Failed
                }
            };

            if let Ok(mut tiles) = tiles.lock() {
                tiles.insert(coord, state);
            }
            ctx.request_repaint();
        });
    }

    /// Tiles covering a viewport, with their top-left pixel offset from the viewport center
    pub fn visible_tiles(
        center_lat: f64,
        center_lon: f64,
        zoom: u8,
        viewport_width: f32,
        viewport_height: f32,
    ) -> Vec<(TileCoord, f32, f32)> {
        let mut tiles = Vec::new();

        let center_tile_x = WebMercator::lon_to_x(center_lon, f64::from(zoom));
        let center_tile_y = WebMercator::lat_to_y(center_lat, f64::from(zoom));

        let tiles_wide = (viewport_width / TILE_SIZE as f32).ceil() as i32 + 2;
        let tiles_high = (viewport_height / TILE_SIZE as f32).ceil() as i32 + 2;

        let start_x = center_tile_x.floor() as i32 - tiles_wide / 2;
        let start_y = center_tile_y.floor() as i32 - tiles_high / 2;

        let max_tile = 2_i32.pow(u32::from(zoom));

        for dy in 0..tiles_high {
            for dx in 0..tiles_wide {
                let tile_x = start_x + dx;
                let tile_y = start_y + dy;

                // Longitude wraps, latitude does not
                let wrapped_x = tile_x.rem_euclid(max_tile);
                if tile_y >= 0 && tile_y < max_tile {
                    let coord = TileCoord::new(wrapped_x as u32, tile_y as u32, zoom);
                    let offset_x = (f64::from(tile_x) - center_tile_x) * f64::from(TILE_SIZE);
                    let offset_y = (f64::from(tile_y) - center_tile_y) * f64::from(TILE_SIZE);
                    tiles.push((coord, offset_x as f32, offset_y as f32));
                }
            }
        }

        tiles
    }

    pub fn has_loading_tiles(&self) -> bool {
        self.tiles
            .lock()
            .map(|tiles| tiles.values().any(|state| matches!(state, TileState::Loading)))
            .unwrap_or(false)
    }

    pub fn error_count(&self) -> usize {
        self.tiles
            .lock()
            .map(|tiles| tiles.values().filter(|state| matches!(state, TileState::Failed)).count())
            .unwrap_or(0)
    }
}

async fn download(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(format!("HTTP error: {}", response.status()).into());
    }
    Ok(response.bytes().await?.to_vec())
}

fn decode_tile(bytes: &[u8], coord: TileCoord, ctx: &egui::Context) -> Option<TextureHandle> {
    let rgba = match image::load_from_memory(bytes) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            warn!("Failed to decode tile image: {}", e);
            return None;
        }
    };
    let size = [rgba.width() as usize, rgba.height() as usize];
    let color_image = ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());

    Some(ctx.load_texture(
        format!("tile_{}_{}/{}", coord.zoom, coord.x, coord.y),
        color_image,
        egui::TextureOptions::default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mercator_round_trip() {
        for (lat, lon) in [(35.9, 139.8), (-33.86, 151.2), (0.0, 0.0), (60.0, -150.0)] {
            let x = WebMercator::lon_to_x(lon, 4.5);
            let y = WebMercator::lat_to_y(lat, 4.5);
            assert!((WebMercator::tile_to_lon(x, 4.5) - lon).abs() < 1e-9);
            assert!((WebMercator::tile_to_lat(y, 4.5) - lat).abs() < 1e-9);
        }
    }

    #[test]
    fn test_mercator_clamps_poles() {
        assert!(WebMercator::lat_to_y(90.0, 0.0).is_finite());
        assert!(WebMercator::lat_to_y(90.0, 0.0) >= 0.0);
        assert!(WebMercator::lat_to_y(-90.0, 0.0) <= 1.0);
        assert!(WebMercator::lat_to_y(-90.0, 3.0) <= 8.0);
        assert!((WebMercator::lat_to_y(-90.0, 3.0) - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_tile_url_template() {
        let coord = TileCoord::new(3, 2, 4);
        assert_eq!(
            coord.url("https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}.png"),
            "https://b.basemaps.cartocdn.com/dark_all/4/3/2.png"
        );
    }

    #[test]
    fn test_visible_tiles_wrap_longitude() {
        let tiles = TileManager::visible_tiles(0.0, 179.0, 1, 512.0, 512.0);
        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|(c, _, _)| c.x < 2 && c.y < 2 && c.zoom == 1));
    }
}
