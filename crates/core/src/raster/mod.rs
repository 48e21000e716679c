//! Raster data structures and operations

mod element;
mod grid;
mod multiband;
mod region;

pub use element::CellValue;
pub use grid::Raster;
pub use multiband::MultibandRaster;
pub use region::{split_region, Region};
