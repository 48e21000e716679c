//! Streaming statistics for raster data
//!
//! - **accumulator**: mergeable per-label running statistics
//! - **label_stats**: streaming per-label statistics over tiled regions
//! - **image_stats**: whole-image per-band statistics

pub mod accumulator;
pub mod image_stats;
pub mod label_stats;

pub use accumulator::{LabelAccumulator, LabelStatistics};
pub use image_stats::{combined_band_statistics, image_statistics, BandStatistics};
pub use label_stats::{
    accumulate_region, label_statistics, LabelStatisticsAggregator, LabelStatisticsMap,
    LabelStatsParams,
};
