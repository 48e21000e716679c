//! Vector overlays: labeled features used for training-sample selection

use geo_types::{Geometry, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute value types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// A labeled feature: geometry plus attributes.
///
/// Geometries are expressed in pixel coordinates of the raster they
/// annotate (x = column, y = row); reprojection into that frame is the
/// caller's concern.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: HashMap<String, AttributeValue>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
        }
    }

    /// Create a feature with no geometry
    pub fn empty() -> Self {
        Self {
            geometry: None,
            properties: HashMap::new(),
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Read the class label stored under `key`.
    ///
    /// Integer and round non-negative float attributes are accepted;
    /// anything else yields `None`.
    pub fn class_label(&self, key: &str) -> Option<u32> {
        match self.properties.get(key)? {
            AttributeValue::Int(i) if *i >= 0 => u32::try_from(*i).ok(),
            AttributeValue::Float(f) if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 => {
                Some(*f as u32)
            }
            _ => None,
        }
    }

    /// Iterate the polygons of this feature's geometry.
    ///
    /// `Polygon` yields itself, `MultiPolygon` yields each member; other
    /// geometry kinds carry no area and yield nothing.
    pub fn polygons(&self) -> impl Iterator<Item = &Polygon<f64>> {
        let polys: Vec<&Polygon<f64>> = match &self.geometry {
            Some(Geometry::Polygon(p)) => vec![p],
            Some(Geometry::MultiPolygon(MultiPolygon(ps))) => ps.iter().collect(),
            _ => Vec::new(),
        };
        polys.into_iter()
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Coord, LineString};

    fn square(x0: f64, y0: f64, side: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                Coord { x: x0, y: y0 },
                Coord {
                    x: x0 + side,
                    y: y0,
                },
                Coord {
                    x: x0 + side,
                    y: y0 + side,
                },
                Coord {
                    x: x0,
                    y: y0 + side,
                },
                Coord { x: x0, y: y0 },
            ]),
            vec![],
        )
    }

    #[test]
    fn test_class_label() {
        let mut f = Feature::new(Geometry::Polygon(square(0.0, 0.0, 2.0)));
        f.set_property("Class", AttributeValue::Int(3));
        assert_eq!(f.class_label("Class"), Some(3));

        f.set_property("Class", AttributeValue::Float(7.0));
        assert_eq!(f.class_label("Class"), Some(7));

        f.set_property("Class", AttributeValue::Float(7.5));
        assert_eq!(f.class_label("Class"), None);

        f.set_property("Class", AttributeValue::Int(-1));
        assert_eq!(f.class_label("Class"), None);

        assert_eq!(f.class_label("Missing"), None);
    }

    #[test]
    fn test_polygons_iteration() {
        let f = Feature::new(Geometry::Polygon(square(0.0, 0.0, 2.0)));
        assert_eq!(f.polygons().count(), 1);

        let multi = MultiPolygon(vec![square(0.0, 0.0, 1.0), square(5.0, 5.0, 1.0)]);
        let f = Feature::new(Geometry::MultiPolygon(multi));
        assert_eq!(f.polygons().count(), 2);

        assert_eq!(Feature::empty().polygons().count(), 0);
    }
}
