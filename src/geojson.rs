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

//! Minimal GeoJSON model for isobar contours and labels.

use layer_sync::{Feature, LngLat};
use serde::Deserialize;
use serde_json::{Map, Value};

/// GeoJSON `FeatureCollection`
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<GeoFeature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoFeature {
    /// Features with a null geometry are kept for their properties but never drawn
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

/// Supported geometry types. Positions are `[lng, lat]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point([f64; 2]),
    LineString(Vec<[f64; 2]>),
    MultiLineString(Vec<Vec<[f64; 2]>>),
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl FeatureCollection {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl GeoFeature {
    /// Properties as a hit-test result
    pub fn to_feature(&self) -> Feature {
        Feature::new(self.properties.clone().unwrap_or_default())
    }

    /// Every polyline in the geometry. Polygon rings count as closed lines.
    pub fn lines(&self) -> Vec<Vec<LngLat>> {
        let to_line = |coords: &Vec<[f64; 2]>| -> Vec<LngLat> {
            coords.iter().map(|[lng, lat]| LngLat::new(*lng, *lat)).collect()
        };

        match &self.geometry {
            Some(Geometry::LineString(coords)) => vec![to_line(coords)],
            Some(Geometry::MultiLineString(lines) | Geometry::Polygon(lines)) => {
                lines.iter().map(to_line).collect()
            }
            Some(Geometry::Point(_)) | None => Vec::new(),
        }
    }

    /// Anchor for a text label: the point itself, or the middle vertex of a line
    pub fn anchor(&self) -> Option<LngLat> {
        match &self.geometry {
            Some(Geometry::Point([lng, lat])) => Some(LngLat::new(*lng, *lat)),
            _ => self
                .lines()
                .into_iter()
                .find(|line| !line.is_empty())
                .map(|line| line[line.len() / 2]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTOURS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[139.0, 35.0], [140.0, 36.0], [141.0, 36.5]]},
                "properties": {"prmsl": 1012}
            },
            {
                "type": "Feature",
                "geometry": {"type": "MultiLineString", "coordinates": [[[0.0, 0.0], [1.0, 1.0]], [[2.0, 2.0], [3.0, 3.0]]]},
                "properties": {"prmsl": "1016"}
            },
            {
                "type": "Feature",
                "geometry": null,
                "properties": null
            }
        ]
    }"#;

    #[test]
    fn test_parse_feature_collection() {
        let collection = FeatureCollection::from_slice(CONTOURS.as_bytes()).unwrap();
        assert_eq!(collection.features.len(), 3);
        assert_eq!(collection.features[0].lines().len(), 1);
        assert_eq!(collection.features[1].lines().len(), 2);
        assert!(collection.features[2].lines().is_empty());
    }

    #[test]
    fn test_to_feature_keeps_properties() {
        let collection = FeatureCollection::from_slice(CONTOURS.as_bytes()).unwrap();
        assert_eq!(
            collection.features[0].to_feature().property_text("prmsl").as_deref(),
            Some("1012")
        );
        assert!(collection.features[2].to_feature().properties.is_empty());
    }

    #[test]
    fn test_anchor() {
        let point: GeoFeature = serde_json::from_str(
            r#"{"geometry": {"type": "Point", "coordinates": [139.8, 35.9]}, "properties": {"prmsl": 1008}}"#,
        )
        .unwrap();
        assert_eq!(point.anchor(), Some(LngLat::new(139.8, 35.9)));

        let collection = FeatureCollection::from_slice(CONTOURS.as_bytes()).unwrap();
        assert_eq!(collection.features[0].anchor(), Some(LngLat::new(140.0, 36.0)));
        assert_eq!(collection.features[2].anchor(), None);
    }

    #[test]
    fn test_unsupported_geometry_is_an_error() {
        let result = FeatureCollection::from_slice(
            br#"{"features": [{"geometry": {"type": "GeometryCollection", "geometries": []}}]}"#,
        );
        assert!(result.is_err());
    }
}
