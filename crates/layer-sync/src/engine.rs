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

//! Layer synchronization engine.
//!
//! Switching hours happens in two phases:
//!
//! 1. A synchronous visibility pass ([`LayerSyncEngine::apply_hour`]) that
//!    hides every per-hour layer and then shows the existing layers of the
//!    selected hour. When it returns, the surface shows exactly that hour.
//! 2. An asynchronous wind texture load, described by the returned
//!    [`TextureRequest`]. Its result comes back through
//!    [`LayerSyncEngine::complete_texture`], which installs a new particle
//!    layer or reports the failure. A failure never touches visibility.
//!
//! Each `apply_hour` call bumps a generation counter. With the default
//! [`StaleTexturePolicy::Discard`], a texture that resolves after a newer
//! hour was applied is dropped instead of replacing the newer overlay.

use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hour::{DatasetDate, HourIndex};
use crate::layer::{LayerId, LayerKind, Visibility};
use crate::particles::{ParticleFieldConfig, ParticleLayer};
use crate::surface::MapSurface;
use crate::texture::{TextureError, WindTexture};

/// Errors raised by the engine and the interaction binder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("map surface has not finished loading")]
    SurfaceNotLoaded,
}

/// What to do with a texture that resolves after a newer hour was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StaleTexturePolicy {
    /// Drop it; only the latest selection may install an overlay.
    #[default]
    Discard,
    /// Install it anyway, so whichever load resolves last wins.
    Install,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub date: DatasetDate,
    /// Directory or URL prefix holding `wind_<date>_<hhh>.png` files.
    pub texture_root: String,
    pub particles: ParticleFieldConfig,
    pub stale_textures: StaleTexturePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            date: DatasetDate::default(),
            texture_root: "data/wind".to_string(),
            particles: ParticleFieldConfig::default(),
            stale_textures: StaleTexturePolicy::default(),
        }
    }
}

/// A wind texture load the caller must dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureRequest {
    pub hour: HourIndex,
    pub generation: u64,
    pub path: String,
}

/// Result of handing a finished texture load to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// A new particle layer replaced the overlay.
    Installed,
    /// A newer hour was applied meanwhile; the texture was dropped.
    Stale,
    /// The load failed; the previous overlay stays.
    Failed,
}

/// Drives per-hour layer visibility and the wind overlay on a map surface.
#[derive(Debug)]
pub struct LayerSyncEngine {
    config: EngineConfig,
    generation: u64,
    active_hour: Option<HourIndex>,
}

impl LayerSyncEngine {
    /// Create an engine for a surface that has finished loading.
    pub fn attach<S: MapSurface>(surface: &S, config: EngineConfig) -> Result<Self, SyncError> {
        if !surface.is_loaded() {
            return Err(SyncError::SurfaceNotLoaded);
        }
        info!(
            "Layer sync engine attached for {} (textures from {})",
            config.date, config.texture_root
        );
        Ok(Self {
            config,
            generation: 0,
            active_hour: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hour of the most recent `apply_hour`.
    #[must_use]
    pub fn active_hour(&self) -> Option<HourIndex> {
        self.active_hour
    }

    /// Generation of the most recent `apply_hour` (0 before the first).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Texture location for an hour: `<root>/wind_<YYYYMMDD>_<hhh>.png`.
    #[must_use]
    pub fn texture_path(&self, hour: HourIndex) -> String {
        let root = self.config.texture_root.trim_end_matches('/');
        let file = format!("wind_{}_{}.png", self.config.date.compact(), hour.suffix());
        if root.is_empty() {
            file
        } else {
            format!("{root}/{file}")
        }
    }

    /// Show exactly the existing layers of `hour` and describe the texture to load.
    ///
    /// Returns `None` without touching the surface when it has not loaded.
    pub fn apply_hour<S: MapSurface>(
        &mut self,
        surface: &mut S,
        hour: HourIndex,
    ) -> Option<TextureRequest> {
        if !surface.is_loaded() {
            warn!("Ignoring hour {hour}: map surface has not finished loading");
            return None;
        }

        // Hide everything, the target hour included, so repeated calls converge.
        for kind in LayerKind::ALL {
            for id in LayerId::all_of(kind) {
                if surface.layer_exists(&id) {
                    surface.set_visibility(&id, Visibility::Hidden);
                }
            }
        }

        for kind in LayerKind::ALL {
            let id = LayerId::new(kind, hour);
            if surface.layer_exists(&id) {
                surface.set_visibility(&id, Visibility::Visible);
            } else {
                debug!("No {id} layer in this dataset");
            }
        }

        self.generation += 1;
        self.active_hour = Some(hour);
        debug!("Applied hour {hour} (generation {})", self.generation);

        Some(TextureRequest {
            hour,
            generation: self.generation,
            path: self.texture_path(hour),
        })
    }

    /// Handle a finished texture load for `request`.
    pub fn complete_texture<S: MapSurface>(
        &mut self,
        surface: &mut S,
        request: &TextureRequest,
        result: Result<WindTexture, TextureError>,
    ) -> InstallOutcome {
        let texture = match result {
            Ok(texture) => texture,
            Err(e) => {
                error!("Failed to load wind texture {}: {}", request.path, e);
                return InstallOutcome::Failed;
            }
        };

        if request.generation != self.generation
            && self.config.stale_textures == StaleTexturePolicy::Discard
        {
            debug!(
                "Discarding wind texture for {} (generation {}, latest {})",
                request.hour, request.generation, self.generation
            );
            return InstallOutcome::Stale;
        }

        surface.install_overlay(ParticleLayer::new(
            request.hour,
            Arc::new(texture),
            self.config.particles.clone(),
        ));
        debug!("Installed wind overlay for {}", request.hour);
        InstallOutcome::Installed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::InMemorySurface;
    use crate::texture::tests::uniform_texture;

    fn hour(h: u8) -> HourIndex {
        HourIndex::new(h).unwrap()
    }

    fn full_surface() -> InMemorySurface {
        let mut surface = InMemorySurface::with_layers(
            LayerKind::ALL.into_iter().flat_map(LayerId::all_of),
        );
        surface.mark_loaded();
        surface
    }

    fn engine(surface: &InMemorySurface, policy: StaleTexturePolicy) -> LayerSyncEngine {
        LayerSyncEngine::attach(
            surface,
            EngineConfig {
                texture_root: "https://example.com/wind/".to_string(),
                particles: ParticleFieldConfig {
                    particle_count: 8,
                    ..Default::default()
                },
                stale_textures: policy,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn expected_visible(h: HourIndex) -> Vec<LayerId> {
        let mut ids: Vec<LayerId> = LayerKind::ALL.iter().map(|k| LayerId::new(*k, h)).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_attach_requires_loaded_surface() {
        let surface = InMemorySurface::default();
        assert_eq!(
            LayerSyncEngine::attach(&surface, EngineConfig::default()).unwrap_err(),
            SyncError::SurfaceNotLoaded
        );
    }

    #[test]
    fn test_only_selected_hour_visible_for_every_hour() {
        let mut surface = full_surface();
        let mut engine = engine(&surface, StaleTexturePolicy::Discard);

        for h in HourIndex::all() {
            engine.apply_hour(&mut surface, h).unwrap();
            assert_eq!(surface.visible_layers(), expected_visible(h), "hour {h}");
        }
    }

    #[test]
    fn test_apply_hour_is_idempotent() {
        let mut surface = full_surface();
        let mut engine = engine(&surface, StaleTexturePolicy::Discard);

        engine.apply_hour(&mut surface, hour(14));
        let once = surface.visible_layers();
        engine.apply_hour(&mut surface, hour(14));
        assert_eq!(surface.visible_layers(), once);
        assert_eq!(engine.generation(), 2);
    }

    #[test]
    fn test_missing_layers_are_skipped() {
        // Hour 6 has no relief raster and no labels
        let mut surface = InMemorySurface::with_layers([
            LayerId::new(LayerKind::IsobarContour, hour(6)),
            LayerId::new(LayerKind::PressureRelief, hour(5)),
            LayerId::new(LayerKind::IsobarContour, hour(5)),
        ]);
        surface.mark_loaded();
        let mut engine = engine(&surface, StaleTexturePolicy::Discard);

        engine.apply_hour(&mut surface, hour(5));
        engine.apply_hour(&mut surface, hour(6));
        assert_eq!(
            surface.visible_layers(),
            vec![LayerId::new(LayerKind::IsobarContour, hour(6))]
        );

        // No layers at all for this hour is still fine
        engine.apply_hour(&mut surface, hour(20)).unwrap();
        assert!(surface.visible_layers().is_empty());
    }

    #[test]
    fn test_apply_before_load_is_noop() {
        let mut loaded = full_surface();
        let mut engine = engine(&loaded, StaleTexturePolicy::Discard);
        engine.apply_hour(&mut loaded, hour(1));

        let mut unloaded = InMemorySurface::with_layers(LayerId::all_of(LayerKind::IsobarContour));
        assert!(engine.apply_hour(&mut unloaded, hour(2)).is_none());
        assert!(unloaded.visible_layers().is_empty());
        assert_eq!(engine.active_hour(), Some(hour(1)));
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn test_texture_path_format() {
        let surface = full_surface();
        let engine = engine(&surface, StaleTexturePolicy::Discard);
        assert_eq!(
            engine.texture_path(hour(7)),
            "https://example.com/wind/wind_20251101_007.png"
        );
    }

    #[test]
    fn test_request_carries_hour_and_generation() {
        let mut surface = full_surface();
        let mut engine = engine(&surface, StaleTexturePolicy::Discard);
        let first = engine.apply_hour(&mut surface, hour(0)).unwrap();
        let second = engine.apply_hour(&mut surface, hour(23)).unwrap();

        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert_eq!(second.hour, hour(23));
        assert!(second.path.ends_with("wind_20251101_023.png"));
    }

    #[test]
    fn test_texture_installs_overlay() {
        let mut surface = full_surface();
        let mut engine = engine(&surface, StaleTexturePolicy::Discard);
        let request = engine.apply_hour(&mut surface, hour(4)).unwrap();

        let outcome =
            engine.complete_texture(&mut surface, &request, Ok(uniform_texture([200, 90, 0, 255])));
        assert_eq!(outcome, InstallOutcome::Installed);
        assert_eq!(surface.overlay().unwrap().hour(), hour(4));
        assert_eq!(surface.overlay().unwrap().particles().len(), 8);
    }

    #[test]
    fn test_texture_failure_keeps_visibility_and_overlay() {
        let mut surface = full_surface();
        let mut engine = engine(&surface, StaleTexturePolicy::Discard);

        let first = engine.apply_hour(&mut surface, hour(2)).unwrap();
        engine.complete_texture(&mut surface, &first, Ok(uniform_texture([128, 128, 0, 255])));

        let second = engine.apply_hour(&mut surface, hour(8)).unwrap();
        let outcome =
            engine.complete_texture(&mut surface, &second, Err(TextureError::Status(404)));

        assert_eq!(outcome, InstallOutcome::Failed);
        assert_eq!(surface.visible_layers(), expected_visible(hour(8)));
        assert_eq!(surface.overlay().unwrap().hour(), hour(2));
        assert_eq!(surface.overlay_installs(), 1);
    }

    #[test]
    fn test_race_with_discard_keeps_latest_selection() {
        let mut surface = full_surface();
        let mut engine = engine(&surface, StaleTexturePolicy::Discard);

        let three = engine.apply_hour(&mut surface, hour(3)).unwrap();
        let nine = engine.apply_hour(&mut surface, hour(9)).unwrap();

        // Resolve in reverse order
        let nine_outcome =
            engine.complete_texture(&mut surface, &nine, Ok(uniform_texture([128, 128, 0, 255])));
        let three_outcome =
            engine.complete_texture(&mut surface, &three, Ok(uniform_texture([128, 128, 0, 255])));

        assert_eq!(nine_outcome, InstallOutcome::Installed);
        assert_eq!(three_outcome, InstallOutcome::Stale);
        assert_eq!(surface.overlay().unwrap().hour(), hour(9));
        assert_eq!(surface.visible_layers(), expected_visible(hour(9)));
    }

    #[test]
    fn test_race_with_install_policy_last_resolver_wins() {
        let mut surface = full_surface();
        let mut engine = engine(&surface, StaleTexturePolicy::Install);

        let three = engine.apply_hour(&mut surface, hour(3)).unwrap();
        let nine = engine.apply_hour(&mut surface, hour(9)).unwrap();

        engine.complete_texture(&mut surface, &nine, Ok(uniform_texture([128, 128, 0, 255])));
        let outcome =
            engine.complete_texture(&mut surface, &three, Ok(uniform_texture([128, 128, 0, 255])));

        // Hour 3's wind is shown while hour 9's contours are visible
        assert_eq!(outcome, InstallOutcome::Installed);
        assert_eq!(surface.overlay().unwrap().hour(), hour(3));
        assert_eq!(surface.visible_layers(), expected_visible(hour(9)));
        assert_eq!(surface.overlay_installs(), 2);
    }
}
