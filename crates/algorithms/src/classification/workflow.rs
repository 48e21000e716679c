//! Train-and-validate workflow
//!
//! Ties the classification pipeline together: sample generation over every
//! image/overlay source, optional shift-scale normalization against
//! whole-image statistics, SVM training, prediction over the validation
//! set, outlier remapping and confusion-matrix computation.

use tracing::{info, warn};

use crate::classification::confusion::{remap_outlier_sentinel, ConfusionMatrix};
use crate::classification::normalize::shift_scale;
use crate::classification::samples::{generate_samples, SampleGeneratorParams, SampleSet};
use crate::classification::svm::{train_svm, SvmConfig, SvmModel};
use crate::statistics::image_stats::combined_band_statistics;
use remsen_core::raster::MultibandRaster;
use remsen_core::vector::FeatureCollection;
use remsen_core::{Error, Result};

/// Workflow parameters
#[derive(Debug, Clone)]
pub struct TrainingParams {
    /// Sample generation and split configuration
    pub sample: SampleGeneratorParams,
    /// SVM kernel, cost and optimization configuration
    pub svm: SvmConfig,
    /// Shift-scale the samples with per-band mean/stddev computed over the
    /// source images
    pub normalize: bool,
    /// Per-band no-data value for the statistics pass
    pub nodata: Option<f64>,
    /// Class the one-class outlier sentinel is remapped to before the
    /// confusion matrix; `None` leaves the sentinel untouched
    pub outlier_class: Option<u32>,
    /// Streaming granularity of the statistics pass
    pub stats_regions: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            sample: SampleGeneratorParams::default(),
            svm: SvmConfig::default(),
            normalize: false,
            nodata: None,
            outlier_class: None,
            stats_regions: 8,
        }
    }
}

/// Result of one training run
#[derive(Debug)]
pub struct TrainingOutcome {
    /// The trained model
    pub model: SvmModel,
    /// Confusion matrix of the validation pass (over the training set when
    /// no validation samples were generated)
    pub confusion: ConfusionMatrix,
    /// Number of training samples used
    pub training_size: usize,
    /// Number of validation samples used; 0 means the confusion matrix was
    /// computed against the training set
    pub validation_size: usize,
}

/// Train a classifier from image/overlay sources and estimate its
/// performance.
///
/// Samples are generated independently per source and concatenated. An
/// empty combined training set is fatal; an empty validation set only
/// degrades the run: performance is then estimated on the training set,
/// with a warning.
pub fn train_and_validate(
    sources: &[(&MultibandRaster, &FeatureCollection)],
    params: &TrainingParams,
) -> Result<TrainingOutcome> {
    let Some((first_image, _)) = sources.first() else {
        return Err(Error::NoTrainingSamples);
    };
    let dim = first_image.bands();

    let mut training = SampleSet::new(dim);
    let mut validation = SampleSet::new(dim);
    for (image, overlay) in sources {
        let split = generate_samples(image, overlay, &params.sample)?;
        training.extend(&split.training)?;
        validation.extend(&split.validation)?;
    }

    if training.is_empty() {
        return Err(Error::NoTrainingSamples);
    }
    info!(
        training = training.len(),
        validation = validation.len(),
        "sample generation finished"
    );
    if validation.is_empty() {
        warn!("no validation samples; performance will be estimated on the training set");
    }

    let (shifts, scales) = if params.normalize {
        let stats = combined_band_statistics(
            sources.iter().map(|(image, _)| *image),
            params.nodata,
            params.stats_regions,
        )?;
        (stats.mean, stats.std_dev)
    } else {
        (vec![0.0; dim], vec![1.0; dim])
    };

    let training = shift_scale(&training, &shifts, &scales)?;
    let validation = shift_scale(&validation, &shifts, &scales)?;

    let model = train_svm(&training, &params.svm)?;

    let performance_set = if validation.is_empty() {
        &training
    } else {
        &validation
    };
    let mut produced = model.classify_batch(performance_set)?;
    if let Some(outlier_class) = params.outlier_class {
        remap_outlier_sentinel(&mut produced, outlier_class);
    }

    let confusion = ConfusionMatrix::from_labels(performance_set.labels(), &produced)?;
    for &class in confusion.classes() {
        info!(
            class,
            precision = confusion.precision(class),
            recall = confusion.recall(class),
            f_score = confusion.f_score(class),
            "per-class performance"
        );
    }
    info!(
        kappa = confusion.kappa(),
        overall_accuracy = confusion.overall_accuracy(),
        "global performance"
    );

    Ok(TrainingOutcome {
        model,
        confusion,
        training_size: training.len(),
        validation_size: validation.len(),
    })
}
