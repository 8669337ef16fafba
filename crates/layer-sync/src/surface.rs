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

//! Map surface abstraction.
//!
//! The engine and the interaction binder never own the map. They receive a
//! `&mut impl MapSurface` for every operation, so there is exactly one map
//! and no hidden global handle to it.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Number, Value};

use crate::layer::{LayerId, Visibility};
use crate::particles::ParticleLayer;

/// Geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    #[must_use]
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// Pointer affordance shown over the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Default,
    /// Something under the pointer can be clicked.
    Pointer,
}

/// A rendered feature hit by a pointer event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    pub properties: Map<String, Value>,
}

impl Feature {
    #[must_use]
    pub fn new(properties: Map<String, Value>) -> Self {
        Self { properties }
    }

    /// Look up a property as display text.
    ///
    /// Strings count only when non-blank. Whole numbers render without a
    /// fraction, so a level stored as `1013.0` reads `1013`.
    /// Nulls, booleans and nested values count as absent.
    #[must_use]
    pub fn property_text(&self, name: &str) -> Option<String> {
        match self.properties.get(name)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(number_text(n)),
            _ => None,
        }
    }
}

fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.is_finite() && f.fract().abs() < f64::EPSILON => {
            format!("{f:.0}")
        }
        _ => n.to_string(),
    }
}

/// Info popup anchored at a map coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub anchor: LngLat,
    pub title: String,
    pub value: String,
    pub time: String,
}

impl Popup {
    /// Full popup text, one field per line.
    #[must_use]
    pub fn text(&self) -> String {
        format!("{}\n{}\nTime: {}", self.title, self.value, self.time)
    }
}

/// Pointer event scoped to one layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerEvent {
    PointerEnter {
        layer: LayerId,
    },
    PointerLeave {
        layer: LayerId,
    },
    Click {
        layer: LayerId,
        at: LngLat,
        /// Features under the pointer, topmost first.
        features: Vec<Feature>,
    },
}

impl LayerEvent {
    /// Layer the event was delivered for.
    #[must_use]
    pub fn layer(&self) -> &LayerId {
        match self {
            LayerEvent::PointerEnter { layer }
            | LayerEvent::PointerLeave { layer }
            | LayerEvent::Click { layer, .. } => layer,
        }
    }
}

/// The interactive map the engine drives.
///
/// Implementations apply every mutation immediately: a `visibility` read
/// right after `set_visibility` must observe the new value.
pub trait MapSurface {
    /// Whether the load-complete signal has fired.
    fn is_loaded(&self) -> bool;

    fn layer_exists(&self, id: &LayerId) -> bool;

    /// Current visibility, or `None` for a layer that does not exist.
    fn visibility(&self, id: &LayerId) -> Option<Visibility>;

    /// Set visibility of an existing layer. Unknown layers are ignored.
    fn set_visibility(&mut self, id: &LayerId, visibility: Visibility);

    /// Start delivering pointer and click events for a layer.
    fn subscribe(&mut self, id: &LayerId);

    fn set_cursor(&mut self, cursor: Cursor);

    fn show_popup(&mut self, popup: Popup);

    /// Put a particle layer in the overlay slot, replacing the previous one.
    fn install_overlay(&mut self, overlay: ParticleLayer);
}

/// Headless surface backed by plain collections.
///
/// Useful for integrations without a renderer and for exercising the
/// engine in tests.
#[derive(Debug, Default)]
pub struct InMemorySurface {
    loaded: bool,
    layers: HashMap<LayerId, Visibility>,
    subscriptions: HashSet<LayerId>,
    cursor: Cursor,
    popups: Vec<Popup>,
    overlay: Option<ParticleLayer>,
    overlay_installs: usize,
}

impl InMemorySurface {
    /// Create an unloaded surface containing the given layers, all hidden.
    #[must_use]
    pub fn with_layers<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = LayerId>,
    {
        Self {
            layers: layers
                .into_iter()
                .map(|id| (id, Visibility::Hidden))
                .collect(),
            ..Default::default()
        }
    }

    /// Fire the load-complete signal.
    pub fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    /// Layers currently visible, sorted by name.
    #[must_use]
    pub fn visible_layers(&self) -> Vec<LayerId> {
        let mut visible: Vec<LayerId> = self
            .layers
            .iter()
            .filter(|(_, v)| **v == Visibility::Visible)
            .map(|(id, _)| id.clone())
            .collect();
        visible.sort();
        visible
    }

    #[must_use]
    pub fn is_subscribed(&self, id: &LayerId) -> bool {
        self.subscriptions.contains(id)
    }

    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[must_use]
    pub fn popups(&self) -> &[Popup] {
        &self.popups
    }

    #[must_use]
    pub fn overlay(&self) -> Option<&ParticleLayer> {
        self.overlay.as_ref()
    }

    /// How many times an overlay has been installed.
    #[must_use]
    pub fn overlay_installs(&self) -> usize {
        self.overlay_installs
    }

    /// Pass an event through the surface's subscription filter.
    ///
    /// Returns the event only if its layer exists and is subscribed, the
    /// same way a real map only fires handlers registered for a layer.
    #[must_use]
    pub fn deliver(&self, event: LayerEvent) -> Option<LayerEvent> {
        let id = event.layer();
        (self.layers.contains_key(id) && self.subscriptions.contains(id)).then_some(event)
    }
}

impl MapSurface for InMemorySurface {
    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn layer_exists(&self, id: &LayerId) -> bool {
        self.layers.contains_key(id)
    }

    fn visibility(&self, id: &LayerId) -> Option<Visibility> {
        self.layers.get(id).copied()
    }

    fn set_visibility(&mut self, id: &LayerId, visibility: Visibility) {
        if let Some(current) = self.layers.get_mut(id) {
            *current = visibility;
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
        self.overlay_installs += 1;
    }
}
