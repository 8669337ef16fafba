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

//! The rendered map surface.
//!
//! `DatasetSurface` holds every hourly layer of the catalogue and paints the
//! visible ones over the basemap. It turns raw pointer input into per-layer
//! enter, leave and click events for the layers that were subscribed.

use std::collections::{HashMap, HashSet};

use egui::{Color32, Pos2, Rect, Shape, Stroke, TextureHandle};
use layer_sync::{
    Cursor, Feature, LayerEvent, LayerId, LayerKind, LngLat, MapSurface, ParticleLayer, Popup,
    Visibility,
};
use log::{debug, info};

use crate::map::Projection;
use crate::style::{Contour, LayerContent, LayerLoads};

/// Pointer distance in pixels within which a contour counts as hit
pub const HIT_TOLERANCE: f32 = 6.0;

/// Horizontal strips used to warp equirectangular rasters into Web Mercator
const RELIEF_STRIPS: usize = 32;

const CONTOUR_COLOR: Color32 = Color32::from_rgb(235, 235, 235);
const CONTOUR_HOVER_COLOR: Color32 = Color32::from_rgb(255, 220, 120);

struct SurfaceLayer {
    visibility: Visibility,
    content: LayerContent,
    texture: Option<TextureHandle>,
}

/// Map surface backed by the loaded dataset catalogue
pub struct DatasetSurface {
    layers: HashMap<LayerId, SurfaceLayer>,
    loads: Option<LayerLoads>,
    loaded: bool,
    subscriptions: HashSet<LayerId>,
    cursor: Cursor,
    popups: Vec<Popup>,
    overlay: Option<ParticleLayer>,
    hovered: Option<LayerId>,
    events: Vec<LayerEvent>,
    relief_opacity: f32,
}

impl std::fmt::Debug for DatasetSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetSurface")
            .field("layers", &self.layers.len())
            .field("loaded", &self.loaded)
            .field("hovered", &self.hovered)
            .field("popups", &self.popups.len())
            .finish_non_exhaustive()
    }
}

impl DatasetSurface {
    /// Surface fed by an in-flight catalogue load
    pub fn new(loads: LayerLoads, relief_opacity: f32) -> Self {
        Self {
            layers: HashMap::new(),
            loads: Some(loads),
            loaded: false,
            subscriptions: HashSet::new(),
            cursor: Cursor::Default,
            popups: Vec::new(),
            overlay: None,
            hovered: None,
            events: Vec::new(),
            relief_opacity: relief_opacity.clamp(0.0, 1.0),
        }
    }

    /// Take in finished layer loads.
    ///
    /// Returns true on the call that observes the load-complete signal.
    pub fn poll(&mut self) -> bool {
        let Some(loads) = self.loads.as_mut() else {
            return false;
        };

        // Read the signal first: every result is sent before it flips
        let done = *loads.done.borrow();

        let mut finished = Vec::new();
        while let Ok(loaded) = loads.results.try_recv() {
            finished.push(loaded);
        }
        for loaded in finished {
            if let Ok(content) = loaded.result {
                self.insert_layer(loaded.id, content);
            }
        }

        if done {
            self.loads = None;
            self.loaded = true;
            info!("Map surface loaded with {} layers", self.layer_count());
        }
        done
    }

    /// Add a hidden layer
    pub fn insert_layer(&mut self, id: LayerId, content: LayerContent) {
        debug!("Layer {} ready", id);
        self.layers.insert(
            id,
            SurfaceLayer {
                visibility: Visibility::Hidden,
                content,
                texture: None,
            },
        );
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn popups(&self) -> &[Popup] {
        &self.popups
    }

    pub fn close_popup(&mut self, index: usize) {
        if index < self.popups.len() {
            self.popups.remove(index);
        }
    }

    pub fn overlay(&self) -> Option<&ParticleLayer> {
        self.overlay.as_ref()
    }

    /// Advance the particle overlay by one frame
    pub fn step_overlay(&mut self) {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.step();
        }
    }

    /// Events produced by pointer input since the last call
    pub fn take_events(&mut self) -> Vec<LayerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Track hover state. `None` means the pointer left the map.
    pub fn pointer_moved(&mut self, pos: Option<Pos2>, projection: &Projection) {
        let hit = pos.and_then(|pos| self.hit_layer(pos, projection));
        if hit == self.hovered {
            return;
        }

        if let Some(layer) = self.hovered.take() {
            self.events.push(LayerEvent::PointerLeave { layer });
        }
        if let Some(layer) = hit {
            self.events.push(LayerEvent::PointerEnter {
                layer: layer.clone(),
            });
            self.hovered = Some(layer);
        }
    }

    /// Handle a primary click on the map.
    ///
    /// Any open popup closes first, the same way clicking elsewhere on a web
    /// map dismisses it.
    pub fn clicked(&mut self, pos: Pos2, projection: &Projection) {
        self.popups.clear();

        let Some(layer) = self.hit_layer(pos, projection) else {
            return;
        };
        let features = self.features_at(&layer, pos, projection);
        self.events.push(LayerEvent::Click {
            layer,
            at: projection.to_lnglat(pos),
            features,
        });
    }

    /// Topmost visible subscribed contour layer under the pointer
    fn hit_layer(&self, pos: Pos2, projection: &Projection) -> Option<LayerId> {
        let mut candidates: Vec<&LayerId> = self
            .subscriptions
            .iter()
            .filter(|id| {
                self.layers
                    .get(*id)
                    .is_some_and(|layer| layer.visibility == Visibility::Visible)
            })
            .collect();
        candidates.sort();

        candidates
            .into_iter()
            .rev()
            .find(|id| !self.features_at(id, pos, projection).is_empty())
            .cloned()
    }

    /// Features of a contour layer within tolerance, topmost (last drawn) first
    fn features_at(&self, id: &LayerId, pos: Pos2, projection: &Projection) -> Vec<Feature> {
        let Some(SurfaceLayer {
            content: LayerContent::Contours(contours),
            ..
        }) = self.layers.get(id)
        else {
            return Vec::new();
        };

        contours
            .iter()
            .rev()
            .filter(|contour| contour_distance(contour, pos, projection) <= HIT_TOLERANCE)
            .map(|contour| contour.feature.clone())
            .collect()
    }

    /// Paint every visible layer, relief at the bottom and particles on top
    pub fn draw(&mut self, ctx: &egui::Context, painter: &egui::Painter, projection: &Projection) {
        let relief_tint = Color32::from_white_alpha((self.relief_opacity * 255.0) as u8);
        let hovered = self.hovered.clone();

        for kind in LayerKind::ALL {
            let mut ids: Vec<LayerId> = self
                .layers
                .iter()
                .filter(|(id, layer)| {
                    layer.visibility == Visibility::Visible
                        && LayerId::parse(id.as_str()).is_some_and(|(k, _)| k == kind)
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.sort();

            for id in ids {
                let Some(layer) = self.layers.get_mut(&id) else {
                    continue;
                };
                match &layer.content {
                    LayerContent::Relief { image, bounds } => {
                        let texture = layer.texture.get_or_insert_with(|| {
                            ctx.load_texture(
                                id.as_str(),
                                (**image).clone(),
                                egui::TextureOptions::LINEAR,
                            )
                        });
                        draw_relief(painter, projection, texture, *bounds, relief_tint);
                    }
                    LayerContent::Contours(contours) => {
                        let color = if hovered.as_ref() == Some(&id) {
                            CONTOUR_HOVER_COLOR
                        } else {
                            CONTOUR_COLOR
                        };
                        for contour in contours {
                            for line in &contour.lines {
                                let points: Vec<Pos2> =
                                    line.iter().map(|p| projection.to_screen(*p)).collect();
                                painter.add(Shape::line(points, Stroke::new(1.2, color)));
                            }
                        }
                    }
                    LayerContent::Labels(labels) => {
                        for label in labels {
                            let pos = projection.to_screen(label.anchor);
                            if !painter.clip_rect().contains(pos) {
                                continue;
                            }
                            let galley = painter.layout_no_wrap(
                                label.text.clone(),
                                egui::FontId::proportional(10.0),
                                Color32::WHITE,
                            );
                            let padding = egui::vec2(3.0, 1.0);
                            painter.rect_filled(
                                Rect::from_center_size(pos, galley.size() + padding * 2.0),
                                2.0,
                                Color32::from_rgba_unmultiplied(0, 0, 0, 160),
                            );
                            painter.galley(pos - galley.size() / 2.0, galley, Color32::WHITE);
                        }
                    }
                }
            }
        }

        if let Some(overlay) = &self.overlay {
            draw_particles(painter, projection, overlay);
        }
    }
}

impl MapSurface for DatasetSurface {
    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn layer_exists(&self, id: &LayerId) -> bool {
        self.layers.contains_key(id)
    }

    fn visibility(&self, id: &LayerId) -> Option<Visibility> {
        self.layers.get(id).map(|layer| layer.visibility)
    }

    fn set_visibility(&mut self, id: &LayerId, visibility: Visibility) {
        if let Some(layer) = self.layers.get_mut(id) {
            layer.visibility = visibility;
        }
    }

    fn subscribe(&mut self, id: &LayerId) {
        self.subscriptions.insert(id.clone());
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    fn show_popup(&mut self, popup: Popup) {
        self.popups.push(popup);
    }

    fn install_overlay(&mut self, overlay: ParticleLayer) {
        self.overlay = Some(overlay);
    }
}

/// Smallest screen distance from `pos` to any segment of the contour
fn contour_distance(contour: &Contour, pos: Pos2, projection: &Projection) -> f32 {
    contour
        .lines
        .iter()
        .flat_map(|line| {
            let points: Vec<Pos2> = line.iter().map(|p| projection.to_screen(*p)).collect();
            let distances: Vec<f32> = match points.as_slice() {
                [single] => vec![single.distance(pos)],
                _ => points
                    .windows(2)
                    .map(|segment| segment_distance(pos, segment[0], segment[1]))
                    .collect(),
            };
            distances
        })
        .fold(f32::INFINITY, f32::min)
}

fn segment_distance(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

fn draw_relief(
    painter: &egui::Painter,
    projection: &Projection,
    texture: &TextureHandle,
    bounds: layer_sync::GeoBounds,
    tint: Color32,
) {
    // Rows are linear in latitude; Mercator is not, so paint in strips
    for strip in 0..RELIEF_STRIPS {
        let v0 = strip as f32 / RELIEF_STRIPS as f32;
        let v1 = (strip + 1) as f32 / RELIEF_STRIPS as f32;
        let lat0 = bounds.north - f64::from(v0) * (bounds.north - bounds.south);
        let lat1 = bounds.north - f64::from(v1) * (bounds.north - bounds.south);

        let top_left = projection.to_screen(LngLat::new(bounds.west, lat0));
        let bottom_right = projection.to_screen(LngLat::new(bounds.east, lat1));
        let rect = Rect::from_two_pos(top_left, bottom_right);
        if !painter.clip_rect().intersects(rect) {
            continue;
        }

        painter.image(
            texture.id(),
            rect,
            Rect::from_min_max(egui::pos2(0.0, v0), egui::pos2(1.0, v1)),
            tint,
        );
    }
}

fn draw_particles(painter: &egui::Painter, projection: &Projection, overlay: &ParticleLayer) {
    let config = overlay.config();
    let alpha = (config.opacity.clamp(0.0, 1.0) * 255.0) as u8;

    let shapes: Vec<Shape> = overlay
        .particles()
        .iter()
        .filter(|particle| !particle.jumped())
        .map(|particle| {
            let from = projection.to_screen(overlay.to_lnglat(particle.prev_x, particle.prev_y));
            let to = projection.to_screen(overlay.to_lnglat(particle.x, particle.y));
            let (r, g, b) = speed_to_color(overlay.speed_at(particle));
            Shape::line_segment(
                [from, to],
                Stroke::new(
                    config.line_width,
                    Color32::from_rgba_unmultiplied(r, g, b, alpha),
                ),
            )
        })
        .collect();
    painter.extend(shapes);
}

/// Trail color ramp by wind speed in m/s
fn speed_to_color(speed: f32) -> (u8, u8, u8) {
    match speed {
        s if s >= 20.0 => (255, 80, 80),   // Storm - red
        s if s >= 12.0 => (255, 170, 60),  // Strong - orange
        s if s >= 6.0 => (230, 230, 120),  // Moderate - yellow
        s if s >= 2.0 => (140, 210, 230),  // Light - cyan
        _ => (200, 200, 220),              // Calm - pale
    }
}
