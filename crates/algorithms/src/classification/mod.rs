//! Supervised classification
//!
//! - **samples**: per-class training/validation sample generation from
//!   labeled polygon overlays
//! - **normalize**: shift-scale feature normalization
//! - **svm**: SVM model estimation, classification, persistence
//! - **confusion**: confusion matrix and derived metrics
//! - **workflow**: the train-and-validate loop tying it all together

pub mod confusion;
pub mod normalize;
pub mod samples;
pub mod svm;
pub mod workflow;

pub use confusion::{remap_outlier_sentinel, ConfusionMatrix};
pub use normalize::{shift_scale, SCALE_EPSILON};
pub use samples::{generate_samples, SampleGeneratorParams, SampleSet, SampleSplit};
pub use svm::{classify_raster, train_svm, SvmConfig, SvmKernel, SvmModel, OUTLIER_SENTINEL};
pub use workflow::{train_and_validate, TrainingOutcome, TrainingParams};
