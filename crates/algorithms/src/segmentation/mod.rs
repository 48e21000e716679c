//! Segmentation post-processing
//!
//! - **adjacency**: label adjacency discovery by border scan
//! - **region_merging**: small-region merging policy and relabeling

pub mod adjacency;
pub mod region_merging;

pub use adjacency::label_adjacency;
pub use region_merging::{
    apply_relabeling, compute_relabeling, merge_small_regions, RegionMergingParams,
    RelabelingTable,
};
