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

use egui::{Pos2, Rect, Vec2};
use layer_sync::LngLat;

use super::tiles::{WebMercator, TILE_SIZE};

const MAX_LATITUDE: f64 = 85.0;

/// Camera over the map: center and fractional zoom level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
    pub center: LngLat,
    pub zoom: f32,
}

impl MapView {
    pub fn new(center: LngLat, zoom: f32) -> Self {
        Self { center, zoom }
    }

    /// Screen mapping for the current camera inside `rect`
    pub fn projection(&self, rect: Rect) -> Projection {
        let zoom = f64::from(self.zoom);
        Projection {
            origin: rect.center(),
            zoom,
            center_x: WebMercator::lon_to_x(self.center.lng, zoom),
            center_y: WebMercator::lat_to_y(self.center.lat, zoom),
        }
    }

    /// Move the camera by a screen-space drag
    pub fn pan(&mut self, rect: Rect, delta: Vec2) {
        let projection = self.projection(rect);
        let new_center = projection.to_lnglat(rect.center() - delta);
        self.center = LngLat::new(
            wrap_longitude(new_center.lng),
            new_center.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE),
        );
    }

    /// Zoom by whole levels about the current center, as the zoom buttons do
    pub fn step_zoom(&mut self, levels: f32, limit: impl Fn(f32) -> f32) {
        self.zoom = limit(self.zoom + levels);
    }

    /// Change zoom while keeping the map point under `anchor` fixed
    pub fn zoom_around(&mut self, rect: Rect, anchor: Pos2, new_zoom: f32) {
        let before = self.projection(rect).to_lnglat(anchor);
        self.zoom = new_zoom;
        let after = self.projection(rect).to_screen(before);
        self.pan(rect, anchor - after);
    }
}

/// Frozen screen mapping for one frame
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    origin: Pos2,
    zoom: f64,
    center_x: f64,
    center_y: f64,
}

impl Projection {
    pub fn to_screen(&self, point: LngLat) -> Pos2 {
        let tile = f64::from(TILE_SIZE);
        let x = (WebMercator::lon_to_x(point.lng, self.zoom) - self.center_x) * tile;
        let y = (WebMercator::lat_to_y(point.lat, self.zoom) - self.center_y) * tile;
        Pos2::new(self.origin.x + x as f32, self.origin.y + y as f32)
    }

    pub fn to_lnglat(&self, pos: Pos2) -> LngLat {
        let x = self.center_x + f64::from(pos.x - self.origin.x) / f64::from(TILE_SIZE);
        let y = self.center_y + f64::from(pos.y - self.origin.y) / f64::from(TILE_SIZE);
        LngLat::new(
            WebMercator::tile_to_lon(x, self.zoom),
            WebMercator::tile_to_lat(y, self.zoom),
        )
    }

    /// Screen size of one basemap tile fetched at the rounded zoom level
    pub fn tile_scale(&self, tile_zoom: u8) -> f32 {
        2_f64.powf(self.zoom - f64::from(tile_zoom)) as f32
    }
}

fn wrap_longitude(lng: f64) -> f64 {
    (lng + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> Rect {
        Rect::from_min_size(Pos2::ZERO, Vec2::new(800.0, 600.0))
    }

    #[test]
    fn test_center_projects_to_rect_center() {
        let view = MapView::new(LngLat::new(139.8, 35.9), 2.0);
        let pos = view.projection(rect()).to_screen(view.center);
        assert!((pos - rect().center()).length() < 1e-3);
    }

    #[test]
    fn test_screen_round_trip() {
        let view = MapView::new(LngLat::new(139.8, 35.9), 5.3);
        let projection = view.projection(rect());
        let point = LngLat::new(141.0, 37.5);
        let back = projection.to_lnglat(projection.to_screen(point));
        assert!((back.lng - point.lng).abs() < 1e-3);
        assert!((back.lat - point.lat).abs() < 1e-3);
    }

    #[test]
    fn test_pan_moves_center_opposite_to_drag() {
        let mut view = MapView::new(LngLat::new(0.0, 0.0), 3.0);
        view.pan(rect(), Vec2::new(100.0, 0.0));
        assert!(view.center.lng < 0.0);
        assert!(view.center.lat.abs() < 1e-9);
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let mut view = MapView::new(LngLat::new(139.8, 35.9), 3.0);
        let anchor = Pos2::new(600.0, 200.0);
        let before = view.projection(rect()).to_lnglat(anchor);
        view.zoom_around(rect(), anchor, 4.0);
        let after = view.projection(rect()).to_lnglat(anchor);
        assert!((before.lng - after.lng).abs() < 1e-3);
        assert!((before.lat - after.lat).abs() < 1e-3);
    }

    #[test]
    fn test_step_zoom_respects_limits() {
        let mut view = MapView::new(LngLat::new(139.8, 35.9), 2.0);
        let limit = |zoom: f32| zoom.clamp(0.0, 3.0);

        view.step_zoom(1.0, limit);
        assert!((view.zoom - 3.0).abs() < f32::EPSILON);
        view.step_zoom(1.0, limit);
        assert!((view.zoom - 3.0).abs() < f32::EPSILON);
        for _ in 0..5 {
            view.step_zoom(-1.0, limit);
        }
        assert!(view.zoom.abs() < f32::EPSILON);
        assert_eq!(view.center, LngLat::new(139.8, 35.9));
    }

    #[test]
    fn test_wrap_longitude() {
        assert!((wrap_longitude(190.0) + 170.0).abs() < 1e-9);
        assert!((wrap_longitude(-190.0) - 170.0).abs() < 1e-9);
    }
}
