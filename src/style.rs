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

//! Dataset catalogue and asynchronous layer loading.
//!
//! The catalogue is a JSON document listing every hourly layer with its
//! source. Loading fetches and decodes all sources on the runtime's blocking
//! pool. A layer whose source cannot be loaded is reported and left out, so
//! the surface treats it like an hour with no data.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use egui::ColorImage;
use layer_sync::{GeoBounds, LayerId, LayerKind, LngLat, PRESSURE_PROPERTY};
use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::geojson::{FeatureCollection, GeoFeature};
use crate::protocol::{ProtocolError, ProtocolRegistry};

/// Errors reading the catalogue itself.
#[derive(Debug, Error)]
pub enum StyleError {
    #[error("failed to read catalogue {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalogue: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors loading a single layer source.
#[derive(Debug, Error)]
pub enum LayerLoadError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] serde_json::Error),

    #[error("invalid raster: {0}")]
    Image(#[from] image::ImageError),

    #[error("layer type '{found:?}' does not match id {id}")]
    TypeMismatch { id: LayerId, found: LayerType },
}

/// Render type of a catalogue layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Raster,
    Line,
    Symbol,
}

impl LayerType {
    /// The render type layers of a kind must declare
    pub fn for_kind(kind: LayerKind) -> Self {
        match kind {
            LayerKind::PressureRelief => LayerType::Raster,
            LayerKind::IsobarContour => LayerType::Line,
            LayerKind::IsobarLabel => LayerType::Symbol,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StyleLayer {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub source: String,
    /// Raster extent as `[west, south, east, north]`
    #[serde(default)]
    pub bounds: Option<[f64; 4]>,
}

/// Catalogue document
#[derive(Debug, Clone, Deserialize)]
pub struct StyleDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub layers: Vec<StyleLayer>,
}

impl StyleDocument {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, StyleError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn load(path: &Path) -> Result<Self, StyleError> {
        let bytes = fs::read(path).map_err(|source| StyleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let style = Self::from_slice(&bytes)?;
        info!(
            "Loaded catalogue {} with {} layers",
            style.name.as_deref().unwrap_or("(unnamed)"),
            style.layers.len()
        );
        Ok(style)
    }

    /// Catalogue layers with a recognised hourly id
    pub fn hourly_layers(&self) -> Vec<(LayerId, LayerKind, &StyleLayer)> {
        self.layers
            .iter()
            .filter_map(|layer| match LayerId::parse(&layer.id) {
                Some((kind, hour)) => Some((LayerId::new(kind, hour), kind, layer)),
                None => {
                    debug!("Ignoring catalogue layer {}", layer.id);
                    None
                }
            })
            .collect()
    }
}

/// Text drawn for one label feature
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub anchor: LngLat,
    pub text: String,
}

/// An isobar contour ready for drawing and hit-testing
#[derive(Debug, Clone)]
pub struct Contour {
    pub lines: Vec<Vec<LngLat>>,
    pub feature: layer_sync::Feature,
}

/// Decoded content of one layer
#[derive(Debug, Clone)]
pub enum LayerContent {
    Relief { image: Arc<ColorImage>, bounds: GeoBounds },
    Contours(Vec<Contour>),
    Labels(Vec<Label>),
}

impl LayerContent {
    /// Decode a fetched source for a layer
    pub fn decode(
        id: &LayerId,
        kind: LayerKind,
        layer: &StyleLayer,
        bytes: &[u8],
    ) -> Result<Self, LayerLoadError> {
        if LayerType::for_kind(kind) != layer.layer_type {
            return Err(LayerLoadError::TypeMismatch {
                id: id.clone(),
                found: layer.layer_type,
            });
        }

        match layer.layer_type {
            LayerType::Raster => {
                let rgba = image::load_from_memory(bytes)?.to_rgba8();
                let size = [rgba.width() as usize, rgba.height() as usize];
                let image = ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
                let bounds = layer
                    .bounds
                    .map(|[west, south, east, north]| GeoBounds {
                        west,
                        south,
                        east,
                        north,
                    })
                    .unwrap_or_default();
                Ok(LayerContent::Relief {
                    image: Arc::new(image),
                    bounds,
                })
            }
            LayerType::Line => {
                let collection = FeatureCollection::from_slice(bytes)?;
                Ok(LayerContent::Contours(
                    collection
                        .features
                        .iter()
                        .map(|feature| Contour {
                            lines: feature.lines(),
                            feature: feature.to_feature(),
                        })
                        .filter(|contour| !contour.lines.is_empty())
                        .collect(),
                ))
            }
            LayerType::Symbol => {
                let collection = FeatureCollection::from_slice(bytes)?;
                Ok(LayerContent::Labels(
                    collection.features.iter().filter_map(label_for).collect(),
                ))
            }
        }
    }
}

fn label_for(feature: &GeoFeature) -> Option<Label> {
    Some(Label {
        anchor: feature.anchor()?,
        text: feature.to_feature().property_text(PRESSURE_PROPERTY)?,
    })
}

/// One finished layer load
#[derive(Debug)]
pub struct LayerLoaded {
    pub id: LayerId,
    pub result: Result<LayerContent, LayerLoadError>,
}

/// Receiving side of a catalogue load.
///
/// Every layer result is sent before `done` flips to true.
#[derive(Debug)]
pub struct LayerLoads {
    pub results: mpsc::UnboundedReceiver<LayerLoaded>,
    pub done: watch::Receiver<bool>,
}

/// Fetch and decode every hourly layer of the catalogue on the runtime
pub fn spawn_layer_loads(
    runtime: &Handle,
    registry: Arc<ProtocolRegistry>,
    style: &StyleDocument,
) -> LayerLoads {
    let (result_tx, results) = mpsc::unbounded_channel();
    let (done_tx, done) = watch::channel(false);

    // Fetches run on the blocking pool; the registry is never dropped inside an async task
    let mut tasks = JoinSet::new();
    for (id, kind, layer) in style.hourly_layers() {
        let registry = Arc::clone(&registry);
        let layer = layer.clone();
        tasks.spawn_blocking_on(
            move || {
                let result = registry
                    .fetch(&layer.source)
                    .map_err(LayerLoadError::from)
                    .and_then(|bytes| LayerContent::decode(&id, kind, &layer, &bytes));
                LayerLoaded { id, result }
            },
            runtime,
        );
    }
    info!(
        "Loading {} dataset layers from {}",
        tasks.len(),
        registry.base_dir().display()
    );

    runtime.spawn(async move {
        let mut failed = 0_usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(loaded) => {
                    if let Err(e) = &loaded.result {
                        warn!("Layer {} unavailable: {}", loaded.id, e);
                        failed += 1;
                    }
                    let _ = result_tx.send(loaded);
                }
                Err(e) => {
                    warn!("Layer load task failed: {}", e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            warn!("{} dataset layers failed to load", failed);
        }
        info!("Dataset layers loaded");
        let _ = done_tx.send(true);
    });

    LayerLoads { results, done }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FileProtocol;
    use layer_sync::HourIndex;

    const CATALOGUE: &str = r#"{
        "name": "prmsl-20251101",
        "layers": [
            {"id": "background", "type": "raster", "source": "https://example.com/bg.png"},
            {"id": "pressure-relief_000", "type": "raster", "source": "relief/pressure-relief_000.png", "bounds": [120.0, 20.0, 160.0, 50.0]},
            {"id": "isobar_000", "type": "line", "source": "isobar/isobar_000.geojson"},
            {"id": "isobar-label_000", "type": "symbol", "source": "isobar/isobar_000.geojson"}
        ]
    }"#;

    const CONTOURS: &[u8] = br#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[139.0, 35.0], [140.0, 36.0], [141.0, 36.5]]}, "properties": {"prmsl": 1012}},
        {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[139.0, 33.0], [141.0, 34.0]]}, "properties": {"level": 3}}
    ]}"#;

    fn id(name: &str) -> LayerId {
        let (kind, hour) = LayerId::parse(name).unwrap();
        LayerId::new(kind, hour)
    }

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("isobar-style-{}-{}", std::process::id(), name));
        fs::create_dir_all(dir.join("isobar")).unwrap();
        dir
    }

    #[test]
    fn test_hourly_layers_skip_unknown_ids() {
        let style = StyleDocument::from_slice(CATALOGUE.as_bytes()).unwrap();
        let ids: Vec<String> = style
            .hourly_layers()
            .iter()
            .map(|(id, _, _)| id.to_string())
            .collect();
        assert_eq!(ids, vec!["pressure-relief_000", "isobar_000", "isobar-label_000"]);
    }

    #[test]
    fn test_decode_contours_and_labels() {
        let style = StyleDocument::from_slice(CATALOGUE.as_bytes()).unwrap();
        let layers = style.hourly_layers();

        let LayerContent::Contours(contours) =
            LayerContent::decode(&layers[1].0, layers[1].1, layers[1].2, CONTOURS).unwrap()
        else {
            panic!("expected contours");
        };
        assert_eq!(contours.len(), 2);
        assert_eq!(contours[0].feature.property_text("prmsl").as_deref(), Some("1012"));

        // Features without a pressure value get no label
        let LayerContent::Labels(labels) =
            LayerContent::decode(&layers[2].0, layers[2].1, layers[2].2, CONTOURS).unwrap()
        else {
            panic!("expected labels");
        };
        assert_eq!(
            labels,
            vec![Label {
                anchor: LngLat::new(140.0, 36.0),
                text: "1012".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_rejects_type_mismatch() {
        let layer = StyleLayer {
            id: "isobar_004".to_string(),
            layer_type: LayerType::Raster,
            source: "isobar_004.png".to_string(),
            bounds: None,
        };
        let err = LayerContent::decode(&id("isobar_004"), LayerKind::IsobarContour, &layer, b"")
            .unwrap_err();
        assert!(matches!(err, LayerLoadError::TypeMismatch { .. }));
    }

    #[test]
    fn test_layer_type_for_kind() {
        assert_eq!(LayerType::for_kind(LayerKind::PressureRelief), LayerType::Raster);
        assert_eq!(LayerType::for_kind(LayerKind::IsobarContour), LayerType::Line);
        assert_eq!(LayerType::for_kind(LayerKind::IsobarLabel), LayerType::Symbol);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_spawn_layer_loads_reports_every_layer_then_done() {
        let dir = temp_dir("loads");
        fs::write(dir.join("isobar/isobar_000.geojson"), CONTOURS).unwrap();

        let style = StyleDocument::from_slice(CATALOGUE.as_bytes()).unwrap();
        let mut registry = ProtocolRegistry::new(&dir);
        registry.register("file", Arc::new(FileProtocol));
        let registry = Arc::new(registry);
        let mut loads = spawn_layer_loads(&Handle::current(), registry, &style);

        loads.done.wait_for(|done| *done).await.unwrap();

        let mut ok = Vec::new();
        let mut failed = Vec::new();
        while let Ok(loaded) = loads.results.try_recv() {
            match loaded.result {
                Ok(_) => ok.push(loaded.id),
                Err(_) => failed.push(loaded.id),
            }
        }
        ok.sort();
        assert_eq!(ok, vec![id("isobar-label_000"), id("isobar_000")]);
        assert_eq!(failed, vec![LayerId::new(LayerKind::PressureRelief, HourIndex::MIN)]);

        let _ = fs::remove_dir_all(dir);
    }
}
