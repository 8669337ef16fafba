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

//! Wind field textures and their asynchronous loader.
//!
//! A wind texture is a PNG whose red and green channels encode the eastward
//! (u) and northward (v) wind components linearly across a fixed
//! [`ValueRange`]. Pixels with zero alpha carry no data.
//!
//! Loading happens on a tokio runtime. Finished loads are sent back over a
//! channel and drained by the UI thread, which is the only place the result
//! is applied to the map surface.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::engine::TextureRequest;

/// Errors that can occur while fetching or decoding a wind texture.
#[derive(Debug, Error)]
pub enum TextureError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("failed to read texture: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode texture: {0}")]
    Decode(#[from] image::ImageError),

    #[error("texture has no pixels")]
    Empty,

    #[error("texture task failed: {0}")]
    Task(String),
}

/// Physical range (m/s) that channel values 0..=255 map onto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    /// Decode one 8-bit channel value.
    #[must_use]
    pub fn decode(&self, byte: u8) -> f32 {
        self.min + f32::from(byte) / 255.0 * (self.max - self.min)
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self {
            min: -30.0,
            max: 30.0,
        }
    }
}

/// Decoded wind field.
#[derive(Debug, Clone)]
pub struct WindTexture {
    width: u32,
    height: u32,
    u: Vec<f32>,
    v: Vec<f32>,
    valid: Vec<bool>,
}

impl WindTexture {
    /// Decode an encoded image into a wind field.
    pub fn decode(bytes: &[u8], range: ValueRange) -> Result<Self, TextureError> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(TextureError::Empty);
        }

        let len = (width * height) as usize;
        let mut u = Vec::with_capacity(len);
        let mut v = Vec::with_capacity(len);
        let mut valid = Vec::with_capacity(len);
        for pixel in rgba.pixels() {
            let [r, g, _, a] = pixel.0;
            u.push(range.decode(r));
            v.push(range.decode(g));
            valid.push(a > 0);
        }

        Ok(Self {
            width,
            height,
            u,
            v,
            valid,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    fn at(&self, x: u32, y: u32) -> Option<(f32, f32)> {
        let idx = (y * self.width + x) as usize;
        self.valid[idx].then(|| (self.u[idx], self.v[idx]))
    }

    /// Bilinearly sample `(u, v)` at normalized coordinates.
    ///
    /// `x` runs west to east and `y` north to south, both in `0.0..=1.0`.
    /// Returns `None` outside the texture or when any neighbouring pixel
    /// has no data.
    #[must_use]
    pub fn sample(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return None;
        }

        let fx = x * (self.width - 1) as f32;
        let fy = y * (self.height - 1) as f32;
        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let (u00, v00) = self.at(x0, y0)?;
        let (u10, v10) = self.at(x1, y0)?;
        let (u01, v01) = self.at(x0, y1)?;
        let (u11, v11) = self.at(x1, y1)?;

        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
        let u = lerp(lerp(u00, u10, tx), lerp(u01, u11, tx), ty);
        let v = lerp(lerp(v00, v10, tx), lerp(v01, v11, tx), ty);
        Some((u, v))
    }

    /// Wind speed at normalized coordinates.
    #[must_use]
    pub fn speed(&self, x: f32, y: f32) -> Option<f32> {
        self.sample(x, y).map(|(u, v)| u.hypot(v))
    }
}

/// Fetch raw bytes for a texture path.
///
/// `http://` and `https://` paths go through `reqwest`; anything else is
/// read from the local filesystem.
pub async fn fetch_bytes(client: &reqwest::Client, path: &str) -> Result<Vec<u8>, TextureError> {
    if path.starts_with("http://") || path.starts_with("https://") {
        let response = client.get(path).send().await?;
        if !response.status().is_success() {
            return Err(TextureError::Status(response.status().as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    } else {
        let path = path.strip_prefix("file://").unwrap_or(path);
        Ok(tokio::fs::read(path).await?)
    }
}

/// Fetch and decode a texture.
pub async fn load_texture(
    client: &reqwest::Client,
    path: &str,
    range: ValueRange,
) -> Result<WindTexture, TextureError> {
    let bytes = fetch_bytes(client, path).await?;
    tokio::task::spawn_blocking(move || WindTexture::decode(&bytes, range))
        .await
        .map_err(|e| TextureError::Task(e.to_string()))?
}

/// A finished texture load, successful or not.
#[derive(Debug)]
pub struct TextureLoaded {
    pub request: TextureRequest,
    pub result: Result<WindTexture, TextureError>,
}

/// Spawns texture loads on a runtime and hands results back in completion order.
///
/// Loads are never cancelled. A superseded load still completes and is
/// reported; deciding whether to install it is the engine's job.
pub struct TextureLoader {
    runtime: Handle,
    client: reqwest::Client,
    range: ValueRange,
    result_tx: mpsc::UnboundedSender<TextureLoaded>,
    result_rx: mpsc::UnboundedReceiver<TextureLoaded>,
}

impl std::fmt::Debug for TextureLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureLoader")
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

impl TextureLoader {
    #[must_use]
    pub fn new(runtime: Handle, range: ValueRange) -> Self {
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            client: reqwest::Client::new(),
            range,
            result_tx,
            result_rx,
        }
    }

    /// Start loading the texture for a request.
    pub fn request(&self, request: TextureRequest) {
        debug!(
            "Loading wind texture for {} (generation {}): {}",
            request.hour, request.generation, request.path
        );

        let client = self.client.clone();
        let result_tx = self.result_tx.clone();
        let range = self.range;

        self.runtime.spawn(async move {
            let result = load_texture(&client, &request.path, range).await;
            let _ = result_tx.send(TextureLoaded { request, result });
        });
    }

    /// Take the next finished load without blocking.
    pub fn try_next(&mut self) -> Option<TextureLoaded> {
        self.result_rx.try_recv().ok()
    }

    /// Wait for the next finished load.
    pub async fn next(&mut self) -> Option<TextureLoaded> {
        self.result_rx.recv().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hour::HourIndex;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    /// Encode a PNG where every pixel has the given RGBA value.
    pub(crate) fn uniform_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgba(rgba));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    pub(crate) fn uniform_texture(rgba: [u8; 4]) -> WindTexture {
        WindTexture::decode(&uniform_png(8, 4, rgba), ValueRange::default()).unwrap()
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("layer-sync-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_value_range_decode() {
        let range = ValueRange { min: -10.0, max: 10.0 };
        assert!((range.decode(0) + 10.0).abs() < 1e-6);
        assert!((range.decode(255) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_and_sample() {
        // 255 -> +30 m/s eastward, 0 -> -30 m/s northward
        let texture = uniform_texture([255, 0, 0, 255]);
        assert_eq!(texture.width(), 8);
        assert_eq!(texture.height(), 4);

        let (u, v) = texture.sample(0.5, 0.5).unwrap();
        assert!((u - 30.0).abs() < 1e-4);
        assert!((v + 30.0).abs() < 1e-4);
        assert!((texture.speed(0.0, 1.0).unwrap() - 30.0 * 2.0_f32.sqrt()).abs() < 1e-3);
    }

    #[test]
    fn test_sample_outside_or_no_data() {
        let texture = uniform_texture([128, 128, 0, 255]);
        assert!(texture.sample(-0.1, 0.5).is_none());
        assert!(texture.sample(0.5, 1.5).is_none());

        let transparent = uniform_texture([128, 128, 0, 0]);
        assert!(transparent.sample(0.5, 0.5).is_none());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = WindTexture::decode(b"not a png", ValueRange::default()).unwrap_err();
        assert!(matches!(err, TextureError::Decode(_)));
    }

    #[tokio::test]
    async fn test_loader_reads_local_file() {
        let path = temp_path("wind_20251101_007.png");
        std::fs::write(&path, uniform_png(4, 4, [0, 255, 0, 255])).unwrap();

        let mut loader = TextureLoader::new(Handle::current(), ValueRange::default());
        loader.request(TextureRequest {
            hour: HourIndex::new(7).unwrap(),
            generation: 1,
            path: path.to_string_lossy().into_owned(),
        });

        let loaded = loader.next().await.unwrap();
        assert_eq!(loaded.request.hour.value(), 7);
        let texture = loaded.result.unwrap();
        let (u, v) = texture.sample(0.5, 0.5).unwrap();
        assert!((u + 30.0).abs() < 1e-4);
        assert!((v - 30.0).abs() < 1e-4);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_loader_reports_missing_file() {
        let mut loader = TextureLoader::new(Handle::current(), ValueRange::default());
        loader.request(TextureRequest {
            hour: HourIndex::new(3).unwrap(),
            generation: 4,
            path: temp_path("does-not-exist.png").to_string_lossy().into_owned(),
        });

        let loaded = loader.next().await.unwrap();
        assert_eq!(loaded.request.generation, 4);
        assert!(matches!(loaded.result, Err(TextureError::Io(_))));
        assert!(loader.try_next().is_none());
    }
}
