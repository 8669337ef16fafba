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

//! Wiring of selector, engine and binder for one loaded map surface.

use log::info;
use tokio::sync::mpsc;

use crate::engine::{EngineConfig, InstallOutcome, LayerSyncEngine, SyncError, TextureRequest};
use crate::hour::HourIndex;
use crate::interaction::InteractionBinder;
use crate::selector::TimeSelector;
use crate::surface::{LayerEvent, MapSurface};
use crate::texture::TextureLoaded;

/// Engine and handlers for a loaded surface, fed by a time selector.
///
/// The selector callback only queues hours; [`SyncSession::pump`] applies
/// them in selection order on the caller's thread.
#[derive(Debug)]
pub struct SyncSession {
    engine: LayerSyncEngine,
    binder: InteractionBinder,
    selections: mpsc::UnboundedReceiver<HourIndex>,
}

impl SyncSession {
    /// Attach to a loaded surface, bind handlers and apply the selector's current hour.
    ///
    /// Returns the session together with the texture request for that hour.
    pub fn start<S: MapSurface>(
        surface: &mut S,
        selector: &mut TimeSelector,
        config: EngineConfig,
    ) -> Result<(Self, TextureRequest), SyncError> {
        let mut engine = LayerSyncEngine::attach(surface, config)?;
        let binder = InteractionBinder::bind_all(surface)?;

        let (selection_tx, selections) = mpsc::unbounded_channel();
        selector.on_change(move |hour| {
            let _ = selection_tx.send(hour);
        });

        let initial = engine
            .apply_hour(surface, selector.current())
            .ok_or(SyncError::SurfaceNotLoaded)?;
        info!("Sync session started at {}", selector.label());

        Ok((
            Self {
                engine,
                binder,
                selections,
            },
            initial,
        ))
    }

    /// Apply every queued selection, oldest first.
    pub fn pump<S: MapSurface>(&mut self, surface: &mut S) -> Vec<TextureRequest> {
        let mut requests = Vec::new();
        while let Ok(hour) = self.selections.try_recv() {
            requests.extend(self.engine.apply_hour(surface, hour));
        }
        requests
    }

    /// Route a pointer event to the bound handler.
    pub fn handle_event<S: MapSurface>(&self, surface: &mut S, event: &LayerEvent) -> bool {
        self.binder.dispatch(surface, event)
    }

    /// Hand a finished texture load to the engine.
    pub fn complete<S: MapSurface>(
        &mut self,
        surface: &mut S,
        loaded: TextureLoaded,
    ) -> InstallOutcome {
        self.engine
            .complete_texture(surface, &loaded.request, loaded.result)
    }

    #[must_use]
    pub fn engine(&self) -> &LayerSyncEngine {
        &self.engine
    }

    #[must_use]
    pub fn binder(&self) -> &InteractionBinder {
        &self.binder
    }
}
