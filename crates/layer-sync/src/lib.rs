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

//! Time-indexed layer synchronization for hourly weather maps.
//!
//! A dataset holds one day of hourly pressure relief rasters, isobar
//! contours, isobar labels and wind textures. This library keeps a map
//! surface showing exactly one hour of it:
//!
//! - **Selector**: [`TimeSelector`] holds the selected hour and notifies on change
//! - **Engine**: [`LayerSyncEngine`] switches per-hour layer visibility and
//!   installs the wind particle overlay once its texture has loaded
//! - **Interaction**: [`InteractionBinder`] gives contour layers a hover
//!   cursor and a click popup with the pressure value
//!
//! The map itself is abstracted by [`MapSurface`]; [`InMemorySurface`] is a
//! headless implementation.
//!
//! # Quick Start
//!
//! ```
//! use layer_sync::{
//!     EngineConfig, HourIndex, InMemorySurface, LayerId, LayerKind, SyncSession,
//!     TimeSelector, DatasetDate,
//! };
//!
//! let mut surface = InMemorySurface::with_layers(LayerId::all_of(LayerKind::IsobarContour));
//! surface.mark_loaded();
//!
//! let mut selector = TimeSelector::new(DatasetDate::default());
//! let (mut session, _initial) =
//!     SyncSession::start(&mut surface, &mut selector, EngineConfig::default()).unwrap();
//!
//! selector.select(HourIndex::new(9).unwrap());
//! for request in session.pump(&mut surface) {
//!     println!("load {}", request.path);
//! }
//! assert_eq!(surface.visible_layers()[0].as_str(), "isobar_009");
//! ```

pub mod engine;
pub mod hour;
pub mod interaction;
pub mod layer;
pub mod particles;
pub mod selector;
pub mod session;
pub mod surface;
pub mod texture;

pub use engine::{
    EngineConfig, InstallOutcome, LayerSyncEngine, StaleTexturePolicy, SyncError, TextureRequest,
};
pub use hour::{
    DatasetDate, DateParseError, HourIndex, HourOutOfRange, HourParseError, HOURS_PER_DAY,
};
pub use interaction::{HandlerRecord, InteractionBinder, PRESSURE_PROPERTY};
pub use layer::{LayerId, LayerKind, Visibility};
pub use particles::{GeoBounds, Particle, ParticleFieldConfig, ParticleLayer};
pub use selector::TimeSelector;
pub use session::SyncSession;
pub use surface::{Cursor, Feature, InMemorySurface, LayerEvent, LngLat, MapSurface, Popup};
pub use texture::{TextureError, TextureLoaded, TextureLoader, ValueRange, WindTexture};
