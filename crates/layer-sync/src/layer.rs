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

//! Typed layer identifiers.
//!
//! Every per-hour layer on the map surface is named `<prefix>_<hhh>`, for
//! example `isobar_005`. [`LayerId::new`] is the only way to build one, so
//! the visibility pass and the lookup pass can never disagree on formatting.

use std::fmt;

use crate::hour::HourIndex;

/// Category of per-hour map layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerKind {
    /// Shaded pressure relief raster.
    PressureRelief,
    /// Isobar contour lines (the interactive layer).
    IsobarContour,
    /// Pressure value labels along the isobars.
    IsobarLabel,
}

impl LayerKind {
    /// All kinds, in draw order (relief at the bottom, labels on top).
    pub const ALL: [LayerKind; 3] = [
        LayerKind::PressureRelief,
        LayerKind::IsobarContour,
        LayerKind::IsobarLabel,
    ];

    /// Identifier prefix for this kind.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            LayerKind::PressureRelief => "pressure-relief",
            LayerKind::IsobarContour => "isobar",
            LayerKind::IsobarLabel => "isobar-label",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }
}

/// Name of a layer on the map surface, derived from kind and hour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(String);

impl LayerId {
    #[must_use]
    pub fn new(kind: LayerKind, hour: HourIndex) -> Self {
        Self(format!("{}_{}", kind.prefix(), hour.suffix()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover kind and hour from a layer name such as `isobar-label_017`.
    ///
    /// Returns `None` for names that were not produced by [`LayerId::new`]
    /// (basemap layers, unpadded suffixes, hours past 23).
    #[must_use]
    pub fn parse(name: &str) -> Option<(LayerKind, HourIndex)> {
        let (prefix, suffix) = name.rsplit_once('_')?;
        if suffix.len() != 3 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let kind = LayerKind::from_prefix(prefix)?;
        let hour = HourIndex::new(suffix.parse().ok()?)?;
        Some((kind, hour))
    }

    /// Every identifier of the given kind, one per hour.
    pub fn all_of(kind: LayerKind) -> impl Iterator<Item = Self> {
        HourIndex::all().map(move |hour| Self::new(kind, hour))
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LayerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Layout visibility of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    Visible,
    #[default]
    Hidden,
}
