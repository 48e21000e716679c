//! # remsen Core
//!
//! Core types for the remsen remote-sensing statistics and classification
//! library.
//!
//! This crate provides:
//! - `Raster<T>`: generic single-band raster grid (label images)
//! - `MultibandRaster`: multi-band f64 raster (value images)
//! - `Region` and `split_region`: pixel-domain tiling for streaming passes
//! - `Feature` / `FeatureCollection`: labeled polygon overlays
//! - The shared error taxonomy

pub mod error;
pub mod raster;
pub mod vector;

pub use error::{Error, Result};
pub use raster::{split_region, CellValue, MultibandRaster, Raster, Region};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{split_region, CellValue, MultibandRaster, Raster, Region};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection};
}
