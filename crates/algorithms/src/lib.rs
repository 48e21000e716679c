//! # remsen Algorithms
//!
//! Streaming statistics and supervised classification for remote-sensing
//! rasters.
//!
//! ## Module overview
//!
//! - **statistics**: mergeable per-label accumulators, the streaming
//!   label-statistics aggregator, whole-image band statistics
//! - **segmentation**: label adjacency, small-region merging, relabeling
//! - **classification**: training-sample generation and split, shift-scale
//!   normalization, SVM model estimation and classification, confusion
//!   matrix metrics, and the train-and-validate workflow

mod maybe_rayon;

pub mod classification;
pub mod segmentation;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        generate_samples, remap_outlier_sentinel, shift_scale, train_and_validate, train_svm,
        ConfusionMatrix, SampleGeneratorParams, SampleSet, SampleSplit, SvmConfig, SvmKernel,
        SvmModel, TrainingParams,
    };
    pub use crate::segmentation::{
        apply_relabeling, compute_relabeling, label_adjacency, merge_small_regions,
        RegionMergingParams, RelabelingTable,
    };
    pub use crate::statistics::{
        image_statistics, label_statistics, BandStatistics, LabelAccumulator, LabelStatistics,
        LabelStatisticsAggregator, LabelStatisticsMap, LabelStatsParams,
    };
    pub use remsen_core::prelude::*;
}
