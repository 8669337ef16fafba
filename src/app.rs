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

use std::sync::Arc;

use eframe::egui;
use layer_sync::{
    Cursor, HourIndex, InstallOutcome, LngLat, SyncSession, TextureLoader, TimeSelector,
};
use log::{debug, error, info};
use tokio::runtime::Runtime;

use crate::config::AppConfig;
use crate::map::{MapView, Projection, TileManager, TILE_SIZE};
use crate::protocol::ProtocolRegistry;
use crate::style::{spawn_layer_loads, StyleDocument};
use crate::surface::DatasetSurface;
use crate::time_slider;

/// Scroll distance in points for one zoom level
const SCROLL_PER_ZOOM_LEVEL: f32 = 240.0;

/// Highest zoom the basemap provides tiles for
const MAX_TILE_ZOOM: f32 = 19.0;

pub struct MapApp {
    config: AppConfig,
    /// Owns the workers behind layer, texture and tile loads
    _runtime: Runtime,
    surface: DatasetSurface,
    selector: TimeSelector,
    session: Option<SyncSession>,
    loader: TextureLoader,
    tile_manager: TileManager,
    view: MapView,
}

impl std::fmt::Debug for MapApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapApp")
            .field("surface", &self.surface)
            .field("selector", &self.selector)
            .field("session", &self.session.is_some())
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl MapApp {
    pub fn new(
        config: AppConfig,
        runtime: Runtime,
        style: &StyleDocument,
        registry: Arc<ProtocolRegistry>,
        start_hour: HourIndex,
    ) -> Self {
        let handle = runtime.handle().clone();

        let loads = spawn_layer_loads(&handle, registry, style);
        let surface = DatasetSurface::new(loads, config.relief_opacity);
        let selector = TimeSelector::starting_at(config.dataset_date, start_hour);
        let loader = TextureLoader::new(handle.clone(), config.particles.value_range);
        let tile_manager = TileManager::new(config.basemap_url.clone(), handle);
        let view = MapView::new(
            LngLat::new(config.map_center_lon, config.map_center_lat),
            config.clamp_zoom(config.default_zoom),
        );

        Self {
            config,
            _runtime: runtime,
            surface,
            selector,
            session: None,
            loader,
            tile_manager,
            view,
        }
    }

    /// Start the session once the surface has loaded, then drive it
    fn sync_layers(&mut self) {
        if self.session.is_none() {
            if !self.surface.poll() {
                return;
            }
            let engine_config = self.config.engine_config();
            match SyncSession::start(&mut self.surface, &mut self.selector, engine_config) {
                Ok((session, initial)) => {
                    self.loader.request(initial);
                    self.session = Some(session);
                }
                Err(e) => {
                    error!("Failed to start layer sync: {}", e);
                    return;
                }
            }
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };

        for request in session.pump(&mut self.surface) {
            self.loader.request(request);
        }

        while let Some(loaded) = self.loader.try_next() {
            let hour = loaded.request.hour;
            match session.complete(&mut self.surface, loaded) {
                InstallOutcome::Installed => info!("Wind overlay switched to {}", hour),
                InstallOutcome::Stale => debug!("Dropped superseded wind texture for {}", hour),
                InstallOutcome::Failed => {}
            }
        }
    }

    /// Route pointer events produced while drawing the map
    fn dispatch_events(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        for event in self.surface.take_events() {
            session.handle_event(&mut self.surface, &event);
        }
    }

    fn draw_map(&mut self, ui: &mut egui::Ui) -> Projection {
        let (response, painter) = ui.allocate_painter(
            egui::vec2(ui.available_width(), ui.available_height()),
            egui::Sense::click_and_drag(),
        );
        let rect = response.rect;

        painter.rect_filled(rect, 0.0, egui::Color32::from_rgb(20, 24, 30));

        // Scroll wheel and pinch zoom around the pointer
        if response.hovered() {
            let (zoom_delta, scroll) =
                ui.ctx().input(|i| (i.zoom_delta(), i.smooth_scroll_delta.y));
            let change = zoom_delta.log2() + scroll / SCROLL_PER_ZOOM_LEVEL;
            if change.abs() > 0.001 {
                let anchor = response.hover_pos().unwrap_or(rect.center());
                let new_zoom = self.config.clamp_zoom(self.view.zoom + change).min(MAX_TILE_ZOOM);
                self.view.zoom_around(rect, anchor, new_zoom);
            }
        }

        if response.dragged() {
            self.view.pan(rect, response.drag_delta());
        }

        let projection = self.view.projection(rect);
        self.draw_basemap(ui.ctx(), &painter, rect, &projection);
        self.surface.draw(ui.ctx(), &painter, &projection);

        self.surface.pointer_moved(response.hover_pos(), &projection);
        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.surface.clicked(pos, &projection);
            }
        }

        if let Some(overlay) = self.surface.overlay() {
            painter.text(
                rect.left_bottom() + egui::vec2(10.0, -10.0),
                egui::Align2::LEFT_BOTTOM,
                format!("Wind {}", overlay.hour()),
                egui::FontId::proportional(11.0),
                egui::Color32::from_white_alpha(200),
            );
        }

        // Attribution (required by Carto)
        painter.text(
            rect.right_bottom() + egui::vec2(-10.0, -10.0),
            egui::Align2::RIGHT_BOTTOM,
            "© OpenStreetMap contributors © CARTO",
            egui::FontId::proportional(10.0),
            egui::Color32::from_white_alpha(160),
        );

        if self.session.is_none() {
            painter.text(
                rect.center_top() + egui::vec2(0.0, 20.0),
                egui::Align2::CENTER_TOP,
                "Loading dataset...",
                egui::FontId::proportional(12.0),
                egui::Color32::WHITE,
            );
        } else if self.tile_manager.error_count() > 0 {
            painter.text(
                rect.center_top() + egui::vec2(0.0, 20.0),
                egui::Align2::CENTER_TOP,
                format!("Failed to load {} map tiles", self.tile_manager.error_count()),
                egui::FontId::proportional(12.0),
                egui::Color32::from_rgb(220, 80, 80),
            );
        } else if self.tile_manager.has_loading_tiles() {
            painter.text(
                rect.center_top() + egui::vec2(0.0, 20.0),
                egui::Align2::CENTER_TOP,
                "Loading map tiles...",
                egui::FontId::proportional(12.0),
                egui::Color32::from_rgb(255, 200, 100),
            );
        }

        projection
    }

    fn draw_basemap(
        &self,
        ctx: &egui::Context,
        painter: &egui::Painter,
        rect: egui::Rect,
        projection: &Projection,
    ) {
        let tile_zoom = self.view.zoom.round().clamp(0.0, MAX_TILE_ZOOM) as u8;
        let scale = projection.tile_scale(tile_zoom);
        let tile_pixel_size = TILE_SIZE as f32 * scale;
        let center = rect.center();

        let visible = TileManager::visible_tiles(
            self.view.center.lat,
            self.view.center.lng,
            tile_zoom,
            rect.width() / scale,
            rect.height() / scale,
        );

        for (coord, offset_x, offset_y) in visible {
            if let Some(texture) = self.tile_manager.get_tile(coord, ctx) {
                let tile_rect = egui::Rect::from_min_size(
                    egui::pos2(center.x + offset_x * scale, center.y + offset_y * scale),
                    egui::vec2(tile_pixel_size, tile_pixel_size),
                );
                painter.image(
                    texture.id(),
                    tile_rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            }
        }
    }

    /// Zoom in and out buttons over the top right corner of the map
    fn show_zoom_controls(&mut self, ctx: &egui::Context) {
        let mut levels = None;
        egui::Area::new(egui::Id::new("zoom_controls"))
            .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-10.0, 10.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.vertical(|ui| {
                        let size = egui::vec2(24.0, 24.0);
                        let zoom_in = ui.add_sized(size, egui::Button::new("+"));
                        if zoom_in.on_hover_text("Zoom in").clicked() {
                            levels = Some(1.0);
                        }
                        let zoom_out = ui.add_sized(size, egui::Button::new("−"));
                        if zoom_out.on_hover_text("Zoom out").clicked() {
                            levels = Some(-1.0);
                        }
                    });
                });
            });

        if let Some(levels) = levels {
            let config = &self.config;
            self.view.step_zoom(levels, |zoom| config.clamp_zoom(zoom).min(MAX_TILE_ZOOM));
        }
    }

    fn show_popups(&mut self, ctx: &egui::Context, projection: &Projection) {
        let mut closed = None;
        for (index, popup) in self.surface.popups().iter().enumerate() {
            let pos = projection.to_screen(popup.anchor);
            egui::Area::new(egui::Id::new(("pressure_popup", index)))
                .fixed_pos(pos + egui::vec2(8.0, -8.0))
                .pivot(egui::Align2::LEFT_BOTTOM)
                .order(egui::Order::Foreground)
                .show(ctx, |ui| {
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.horizontal(|ui| {
                            ui.label(egui::RichText::new(&popup.title).strong());
                            if ui.small_button("✕").clicked() {
                                closed = Some(index);
                            }
                        });
                        ui.label(egui::RichText::new(&popup.value).size(16.0));
                        ui.label(
                            egui::RichText::new(format!("Time: {}", popup.time))
                                .color(egui::Color32::from_rgb(180, 180, 180)),
                        );
                    });
                });
        }
        if let Some(index) = closed {
            self.surface.close_popup(index);
        }
    }
}

impl eframe::App for MapApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::bottom("time_slider")
            .frame(
                egui::Frame::none()
                    .fill(egui::Color32::from_rgba_unmultiplied(20, 25, 30, 230))
                    .inner_margin(egui::Margin::symmetric(16, 10)),
            )
            .show(ctx, |ui| {
                time_slider::show(ui, &mut self.selector);
            });

        self.sync_layers();
        self.surface.step_overlay();

        let projection = egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| self.draw_map(ui))
            .inner;

        self.dispatch_events();
        self.show_zoom_controls(ctx);
        self.show_popups(ctx, &projection);

        if self.surface.cursor() == Cursor::Pointer {
            ctx.set_cursor_icon(egui::CursorIcon::PointingHand);
        }

        // Particles animate continuously
        ctx.request_repaint();
    }
}
