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

//! Hover and click handling for isobar contour layers.
//!
//! Handlers are bound once, after the map loads, for every hour whose
//! contour layer exists. They are not rebound when the hour changes: the
//! surface only delivers events for the layer under the pointer, and hidden
//! layers are never under the pointer.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::engine::SyncError;
use crate::hour::HourIndex;
use crate::layer::{LayerId, LayerKind};
use crate::surface::{Cursor, Feature, LayerEvent, LngLat, MapSurface, Popup};

/// Feature property holding mean sea level pressure in hPa.
pub const PRESSURE_PROPERTY: &str = "prmsl";

/// Handler state bound to one contour layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerRecord {
    pub hour: HourIndex,
}

impl HandlerRecord {
    /// Build the info popup for a click, if the topmost feature has a pressure.
    #[must_use]
    pub fn popup_for(&self, at: LngLat, features: &[Feature]) -> Option<Popup> {
        let pressure = features.first()?.property_text(PRESSURE_PROPERTY)?;
        Some(Popup {
            anchor: at,
            title: "Pressure".to_string(),
            value: format!("{pressure} hPa"),
            time: self.hour.label(),
        })
    }
}

/// Mapping from contour layer to its handler record.
#[derive(Debug, Default)]
pub struct InteractionBinder {
    bindings: BTreeMap<LayerId, HandlerRecord>,
}

impl InteractionBinder {
    /// Subscribe to every existing contour layer and record its handler.
    pub fn bind_all<S: MapSurface>(surface: &mut S) -> Result<Self, SyncError> {
        if !surface.is_loaded() {
            return Err(SyncError::SurfaceNotLoaded);
        }

        let mut bindings = BTreeMap::new();
        for hour in HourIndex::all() {
            let id = LayerId::new(LayerKind::IsobarContour, hour);
            if surface.layer_exists(&id) {
                surface.subscribe(&id);
                bindings.insert(id, HandlerRecord { hour });
            }
        }

        info!("Bound pointer handlers to {} contour layers", bindings.len());
        Ok(Self { bindings })
    }

    #[must_use]
    pub fn binding(&self, id: &LayerId) -> Option<&HandlerRecord> {
        self.bindings.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LayerId, &HandlerRecord)> {
        self.bindings.iter()
    }

    /// Run the handler bound to the event's layer.
    ///
    /// Returns `false` when no handler is bound to that layer.
    pub fn dispatch<S: MapSurface>(&self, surface: &mut S, event: &LayerEvent) -> bool {
        let Some(record) = self.bindings.get(event.layer()) else {
            return false;
        };

        match event {
            LayerEvent::PointerEnter { .. } => surface.set_cursor(Cursor::Pointer),
            LayerEvent::PointerLeave { .. } => surface.set_cursor(Cursor::Default),
            LayerEvent::Click { layer, at, features } => {
                if let Some(popup) = record.popup_for(*at, features) {
                    surface.show_popup(popup);
                } else {
                    debug!("Click on {layer} without a pressure value");
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::InMemorySurface;
    use serde_json::{json, Value};

    fn hour(h: u8) -> HourIndex {
        HourIndex::new(h).unwrap()
    }

    fn contour(h: u8) -> LayerId {
        LayerId::new(LayerKind::IsobarContour, hour(h))
    }

    fn feature(value: Value) -> Feature {
        let Value::Object(properties) = value else {
            panic!("expected object");
        };
        Feature::new(properties)
    }

    fn loaded_surface() -> InMemorySurface {
        let mut surface = InMemorySurface::with_layers(
            LayerKind::ALL.into_iter().flat_map(LayerId::all_of),
        );
        surface.mark_loaded();
        surface
    }

    #[test]
    fn test_bind_all_covers_every_existing_contour() {
        let mut surface = loaded_surface();
        let binder = InteractionBinder::bind_all(&mut surface).unwrap();

        assert_eq!(binder.len(), 24);
        for h in HourIndex::all() {
            let id = LayerId::new(LayerKind::IsobarContour, h);
            assert_eq!(binder.binding(&id), Some(&HandlerRecord { hour: h }));
            assert!(surface.is_subscribed(&id));
        }
        // Relief and label layers are not interactive
        assert!(!surface.is_subscribed(&LayerId::new(LayerKind::IsobarLabel, hour(0))));
    }

    #[test]
    fn test_bind_all_skips_missing_layers() {
        let mut surface = InMemorySurface::with_layers([contour(2), contour(11)]);
        surface.mark_loaded();
        let binder = InteractionBinder::bind_all(&mut surface).unwrap();

        let hours: Vec<u8> = binder.iter().map(|(_, r)| r.hour.value()).collect();
        assert_eq!(hours, vec![2, 11]);
    }

    #[test]
    fn test_bind_all_requires_loaded_surface() {
        let mut surface = InMemorySurface::with_layers([contour(0)]);
        assert_eq!(
            InteractionBinder::bind_all(&mut surface).unwrap_err(),
            SyncError::SurfaceNotLoaded
        );
        assert!(!surface.is_subscribed(&contour(0)));
    }

    #[test]
    fn test_hover_toggles_cursor() {
        let mut surface = loaded_surface();
        let binder = InteractionBinder::bind_all(&mut surface).unwrap();

        assert!(binder.dispatch(&mut surface, &LayerEvent::PointerEnter { layer: contour(5) }));
        assert_eq!(surface.cursor(), Cursor::Pointer);
        assert!(binder.dispatch(&mut surface, &LayerEvent::PointerLeave { layer: contour(5) }));
        assert_eq!(surface.cursor(), Cursor::Default);
    }

    #[test]
    fn test_click_with_pressure_opens_popup() {
        let mut surface = loaded_surface();
        let binder = InteractionBinder::bind_all(&mut surface).unwrap();
        let at = LngLat::new(139.8, 35.9);

        binder.dispatch(
            &mut surface,
            &LayerEvent::Click {
                layer: contour(14),
                at,
                features: vec![feature(json!({"prmsl": "1013"}))],
            },
        );

        let popup = &surface.popups()[0];
        assert_eq!(popup.anchor, at);
        assert!(popup.text().contains("1013 hPa"));
        assert!(popup.text().contains("14:00"));
    }

    #[test]
    fn test_popup_drops_fraction_of_whole_pressure() {
        let record = HandlerRecord { hour: hour(3) };
        let popup = record
            .popup_for(LngLat::new(0.0, 0.0), &[feature(json!({"prmsl": 1016.0}))])
            .unwrap();
        assert_eq!(popup.value, "1016 hPa");
        assert_eq!(popup.time, "03:00");
    }

    #[test]
    fn test_click_without_pressure_is_silent() {
        let mut surface = loaded_surface();
        let binder = InteractionBinder::bind_all(&mut surface).unwrap();
        let at = LngLat::new(150.0, 20.0);

        // Open ocean, no contour under the cursor
        binder.dispatch(
            &mut surface,
            &LayerEvent::Click {
                layer: contour(14),
                at,
                features: Vec::new(),
            },
        );
        binder.dispatch(
            &mut surface,
            &LayerEvent::Click {
                layer: contour(14),
                at,
                features: vec![feature(json!({"level": 2}))],
            },
        );
        binder.dispatch(
            &mut surface,
            &LayerEvent::Click {
                layer: contour(14),
                at,
                features: vec![feature(json!({"prmsl": ""}))],
            },
        );

        assert!(surface.popups().is_empty());
    }

    #[test]
    fn test_events_for_unbound_layers_are_ignored() {
        let mut surface = InMemorySurface::with_layers([contour(1)]);
        surface.mark_loaded();
        let binder = InteractionBinder::bind_all(&mut surface).unwrap();

        let handled =
            binder.dispatch(&mut surface, &LayerEvent::PointerEnter { layer: contour(2) });
        assert!(!handled);
        assert_eq!(surface.cursor(), Cursor::Default);
    }
}
