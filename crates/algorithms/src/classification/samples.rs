//! Training and validation sample generation
//!
//! Extracts per-pixel feature vectors from a value image under a labeled
//! polygon overlay and splits them per class into training and validation
//! sets.

use std::collections::BTreeMap;

use geo::{BoundingRect, Contains, Intersects};
use geo_types::{Coord, Point, Polygon, Rect};
use ndarray::Array2;

use remsen_core::raster::MultibandRaster;
use remsen_core::vector::FeatureCollection;
use remsen_core::{Error, Result};

/// A set of fixed-dimension labeled samples, stored flat
#[derive(Debug, Clone)]
pub struct SampleSet {
    dim: usize,
    features: Vec<f64>,
    labels: Vec<u32>,
}

impl SampleSet {
    /// Create an empty set of `dim`-component samples
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            features: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Components per sample
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the set holds no samples
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Append one sample
    pub fn push(&mut self, feature: &[f64], label: u32) {
        debug_assert_eq!(feature.len(), self.dim);
        self.features.extend_from_slice(feature);
        self.labels.push(label);
    }

    /// Append every sample of `other`; the dimensions must agree
    pub fn extend(&mut self, other: &SampleSet) -> Result<()> {
        if other.dim != self.dim {
            return Err(Error::InvalidParameter {
                name: "samples",
                value: other.dim.to_string(),
                reason: format!("expected {}-component samples", self.dim),
            });
        }
        self.features.extend_from_slice(&other.features);
        self.labels.extend_from_slice(&other.labels);
        Ok(())
    }

    /// Feature vector of sample `index`
    pub fn feature(&self, index: usize) -> &[f64] {
        &self.features[index * self.dim..(index + 1) * self.dim]
    }

    /// Label of sample `index`
    pub fn label(&self, index: usize) -> u32 {
        self.labels[index]
    }

    /// All labels, in sample order
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Iterate (feature, label) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&[f64], u32)> {
        self.features
            .chunks_exact(self.dim.max(1))
            .zip(self.labels.iter().copied())
    }

    /// Copy the features into an (n, dim) matrix
    pub fn features_array(&self) -> Array2<f64> {
        Array2::from_shape_vec((self.len(), self.dim), self.features.clone())
            .expect("flat sample storage is always (n * dim)")
    }

    /// Sample count per class, in ascending class order
    pub fn class_counts(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for &label in &self.labels {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }
}

/// Parameters for sample generation
#[derive(Debug, Clone)]
pub struct SampleGeneratorParams {
    /// Attribute holding the class label in the overlay features
    pub class_key: String,
    /// Target share of samples routed to validation (0.0 = all training,
    /// 1.0 = all validation)
    pub validation_ratio: f64,
    /// Per-class training cap; -1 means unbounded
    pub max_training_per_class: i64,
    /// Per-class validation cap; -1 means unbounded
    pub max_validation_per_class: i64,
    /// Also take pixels whose cell crosses the polygon boundary
    pub include_edge_pixels: bool,
}

impl Default for SampleGeneratorParams {
    fn default() -> Self {
        Self {
            class_key: "Class".to_string(),
            validation_ratio: 0.5,
            max_training_per_class: 1000,
            max_validation_per_class: 1000,
            include_edge_pixels: false,
        }
    }
}

/// The training/validation partition of one generation run
#[derive(Debug, Clone)]
pub struct SampleSplit {
    pub training: SampleSet,
    pub validation: SampleSet,
}

#[derive(Default)]
struct ClassTally {
    seen: u64,
    training: u64,
    validation: u64,
}

/// Generate training and validation samples from one image/overlay pair.
///
/// Candidate pixels of a polygon are those whose center lies strictly
/// inside it; with `include_edge_pixels`, cells crossed by the polygon
/// boundary are candidates too. Each candidate is routed by a per-class
/// running split that tracks `validation_ratio`, subject to the per-class
/// caps; once the preferred side is full the sample goes to the other
/// side, and once both are full it is dropped. Every generated sample
/// lands in exactly one of the two sets.
///
/// Several image/overlay pairs are generated independently and
/// concatenated by the caller ([`SampleSet::extend`]); whether the
/// combined training set is empty is judged there, not here.
pub fn generate_samples(
    image: &MultibandRaster,
    overlay: &FeatureCollection,
    params: &SampleGeneratorParams,
) -> Result<SampleSplit> {
    if !(0.0..=1.0).contains(&params.validation_ratio) {
        return Err(Error::InvalidParameter {
            name: "validation_ratio",
            value: params.validation_ratio.to_string(),
            reason: "must lie in [0, 1]".to_string(),
        });
    }

    let dim = image.bands();
    let mut split = SampleSplit {
        training: SampleSet::new(dim),
        validation: SampleSet::new(dim),
    };
    let mut tallies: BTreeMap<u32, ClassTally> = BTreeMap::new();

    for feature in overlay.iter() {
        if feature.geometry.is_none() {
            continue;
        }
        let label = feature
            .class_label(&params.class_key)
            .ok_or_else(|| Error::InvalidParameter {
                name: "class_key",
                value: params.class_key.clone(),
                reason: "feature carries no non-negative integer class attribute".to_string(),
            })?;

        for polygon in feature.polygons() {
            collect_polygon(image, polygon, label, params, &mut tallies, &mut split);
        }
    }

    Ok(split)
}

fn collect_polygon(
    image: &MultibandRaster,
    polygon: &Polygon<f64>,
    label: u32,
    params: &SampleGeneratorParams,
    tallies: &mut BTreeMap<u32, ClassTally>,
    split: &mut SampleSplit,
) {
    let Some(bounds) = polygon.bounding_rect() else {
        return;
    };

    // Clamp the polygon's bounding box to the pixel grid
    let row_start = bounds.min().y.floor().max(0.0) as usize;
    let col_start = bounds.min().x.floor().max(0.0) as usize;
    let row_end = (bounds.max().y.ceil().max(0.0) as usize).min(image.rows());
    let col_end = (bounds.max().x.ceil().max(0.0) as usize).min(image.cols());

    for row in row_start..row_end {
        for col in col_start..col_end {
            let center = Point::new(col as f64 + 0.5, row as f64 + 0.5);
            let interior = polygon.contains(&center);

            let candidate = interior
                || (params.include_edge_pixels && cell_crosses_boundary(polygon, row, col));
            if !candidate {
                continue;
            }

            let feature: Vec<f64> = image.pixel(row, col).to_vec();
            route_sample(&feature, label, params, tallies, split);
        }
    }
}

/// Whether the unit cell of pixel (row, col) is crossed by the polygon
/// boundary (exterior or any hole ring).
fn cell_crosses_boundary(polygon: &Polygon<f64>, row: usize, col: usize) -> bool {
    let cell = Rect::new(
        Coord {
            x: col as f64,
            y: row as f64,
        },
        Coord {
            x: col as f64 + 1.0,
            y: row as f64 + 1.0,
        },
    )
    .to_polygon();

    polygon.exterior().intersects(&cell)
        || polygon.interiors().iter().any(|ring| ring.intersects(&cell))
}

fn route_sample(
    feature: &[f64],
    label: u32,
    params: &SampleGeneratorParams,
    tallies: &mut BTreeMap<u32, ClassTally>,
    split: &mut SampleSplit,
) {
    let tally = tallies.entry(label).or_default();
    tally.seen += 1;

    let training_full = capped(params.max_training_per_class, tally.training);
    let validation_full = capped(params.max_validation_per_class, tally.validation);

    // Running quota: validation while its share trails the target ratio
    let prefers_validation =
        (tally.validation as f64) < params.validation_ratio * tally.seen as f64;

    if prefers_validation && !validation_full {
        split.validation.push(feature, label);
        tally.validation += 1;
    } else if !training_full {
        split.training.push(feature, label);
        tally.training += 1;
    } else if !validation_full {
        split.validation.push(feature, label);
        tally.validation += 1;
    }
    // Both sides full: the pixel is dropped
}

fn capped(max: i64, count: u64) -> bool {
    max >= 0 && count >= max as u64
}
