//! SVM model estimation and classification
//!
//! Training is delegated to `linfa-svm`; one binary machine is fitted per
//! class (one-vs-all) and its decision function is extracted into a
//! self-contained, serializable form. Classification evaluates the stored
//! decision functions directly, so a loaded model needs no solver state.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classification::samples::SampleSet;
use crate::maybe_rayon::*;
use remsen_core::raster::{MultibandRaster, Raster};
use remsen_core::{Error, Result};

/// Label the backing library reports for one-class outliers.
///
/// The solver cannot express "none of the classes" as a real label, so
/// outliers surface as this sentinel; remap it with
/// [`remap_outlier_sentinel`](crate::classification::confusion::remap_outlier_sentinel)
/// before computing a confusion matrix.
pub const OUTLIER_SENTINEL: u32 = u32::MAX;

/// SVM kernel choice
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SvmKernel {
    /// `k(x, y) = x·y`
    Linear,
    /// `k(x, y) = exp(-gamma * |x - y|^2)`
    RadialBasis { gamma: f64 },
    /// `k(x, y) = (x·y + coef0)^degree`
    Polynomial { degree: f64, coef0: f64 },
    /// `k(x, y) = tanh(gamma * x·y + coef0)`. The linfa backend provides
    /// no sigmoid kernel, so training with it fails with
    /// [`Error::UnsupportedKernel`]
    Sigmoid { gamma: f64, coef0: f64 },
}

impl SvmKernel {
    fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        match *self {
            SvmKernel::Linear => dot(a, b),
            SvmKernel::RadialBasis { gamma } => (-gamma * squared_distance(a, b)).exp(),
            SvmKernel::Polynomial { degree, coef0 } => (dot(a, b) + coef0).powf(degree),
            SvmKernel::Sigmoid { gamma, coef0 } => (gamma * dot(a, b) + coef0).tanh(),
        }
    }
}

/// Training configuration
#[derive(Debug, Clone)]
pub struct SvmConfig {
    /// Kernel and its parameters
    pub kernel: SvmKernel,
    /// Cost `C`: training-error tolerance vs. margin rigidity
    pub cost: f64,
    /// Cross-validated grid search over the hyperparameters before the
    /// final training run
    pub optimize: bool,
    /// Fold count for the grid search
    pub folds: usize,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            kernel: SvmKernel::RadialBasis { gamma: 1.0 },
            cost: 1.0,
            optimize: false,
            folds: 5,
        }
    }
}

/// One extracted decision function
#[derive(Debug, Clone, Serialize, Deserialize)]
enum DecisionFunction {
    /// `f(x) = w·x - rho`
    Linear { weights: Vec<f64>, rho: f64 },
    /// `f(x) = sum_i alpha_i * k(sv_i, x) - rho`
    Kernel {
        alpha: Vec<f64>,
        support: Vec<Vec<f64>>,
        rho: f64,
    },
}

impl DecisionFunction {
    /// Flip the sign of the decision, so `-f(x)` becomes `f(x)`
    fn negate(&mut self) {
        match self {
            DecisionFunction::Linear { weights, rho } => {
                for w in weights.iter_mut() {
                    *w = -*w;
                }
                *rho = -*rho;
            }
            DecisionFunction::Kernel { alpha, rho, .. } => {
                for a in alpha.iter_mut() {
                    *a = -*a;
                }
                *rho = -*rho;
            }
        }
    }

    fn score(&self, kernel: &SvmKernel, x: &[f64]) -> f64 {
        match self {
            DecisionFunction::Linear { weights, rho } => dot(weights, x) - rho,
            DecisionFunction::Kernel {
                alpha,
                support,
                rho,
            } => {
                alpha
                    .iter()
                    .zip(support.iter())
                    .map(|(a, sv)| a * kernel.eval(sv, x))
                    .sum::<f64>()
                    - rho
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClassMachine {
    label: u32,
    decision: DecisionFunction,
}

/// A trained, immutable SVM classification model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmModel {
    kernel: SvmKernel,
    dim: usize,
    machines: Vec<ClassMachine>,
}

impl SvmModel {
    /// Feature dimension the model was trained on
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.machines.len()
    }

    /// Class labels, in ascending order
    pub fn classes(&self) -> Vec<u32> {
        self.machines.iter().map(|m| m.label).collect()
    }

    /// Classify one feature vector: the class whose decision function
    /// scores highest. The model is never mutated.
    pub fn classify(&self, sample: &[f64]) -> Result<u32> {
        if sample.len() != self.dim {
            return Err(Error::InvalidParameter {
                name: "sample",
                value: sample.len().to_string(),
                reason: format!("model expects {} components", self.dim),
            });
        }
        Ok(self.classify_unchecked(sample))
    }

    fn classify_unchecked(&self, sample: &[f64]) -> u32 {
        debug_assert_eq!(sample.len(), self.dim);
        let mut best_score = f64::NEG_INFINITY;
        let mut best_label = OUTLIER_SENTINEL;
        for machine in &self.machines {
            let score = machine.decision.score(&self.kernel, sample);
            if score > best_score {
                best_score = score;
                best_label = machine.label;
            }
        }
        best_label
    }

    /// Classify every sample of a set
    pub fn classify_batch(&self, samples: &SampleSet) -> Result<Vec<u32>> {
        if samples.dim() != self.dim {
            return Err(Error::InvalidParameter {
                name: "samples",
                value: samples.dim().to_string(),
                reason: format!("model expects {} components", self.dim),
            });
        }
        Ok(samples
            .iter()
            .map(|(feature, _)| self.classify_unchecked(feature))
            .collect())
    }

    /// Persist the model as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)
            .map_err(|e| Error::Model(format!("failed to serialize model: {e}")))?;
        writer.flush()?;
        Ok(())
    }

    /// Load a model saved with [`save`](Self::save).
    ///
    /// A loaded model classifies identically to the one that was saved.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Model(format!("failed to parse model: {e}")))
    }
}

/// Train an SVM model from labeled samples.
///
/// Fits one binary machine per class over the full sample set. With
/// `config.optimize`, a deterministic k-fold cross-validated grid search
/// picks the cost (and gamma, for the radial-basis kernel) first, then the
/// winning configuration is retrained on the whole set. The samples are
/// never mutated.
pub fn train_svm(samples: &SampleSet, config: &SvmConfig) -> Result<SvmModel> {
    if samples.is_empty() {
        return Err(Error::NoTrainingSamples);
    }
    validate_kernel(&config.kernel)?;

    if config.optimize {
        let tuned = optimize_config(samples, config)?;
        return train_with(samples, &tuned);
    }
    train_with(samples, config)
}

fn validate_kernel(kernel: &SvmKernel) -> Result<()> {
    match *kernel {
        SvmKernel::Sigmoid { .. } => Err(Error::UnsupportedKernel(
            "sigmoid is not provided by the linfa backend".to_string(),
        )),
        SvmKernel::RadialBasis { gamma } if gamma <= 0.0 => Err(Error::InvalidParameter {
            name: "gamma",
            value: gamma.to_string(),
            reason: "must be positive".to_string(),
        }),
        SvmKernel::Polynomial { degree, .. } if degree <= 0.0 => Err(Error::InvalidParameter {
            name: "degree",
            value: degree.to_string(),
            reason: "must be positive".to_string(),
        }),
        _ => Ok(()),
    }
}

fn train_with(samples: &SampleSet, config: &SvmConfig) -> Result<SvmModel> {
    let features = samples.features_array();
    let mut classes: Vec<u32> = samples.labels().to_vec();
    classes.sort_unstable();
    classes.dedup();

    let mut machines = Vec::with_capacity(classes.len());
    for &class in &classes {
        let targets: Array1<bool> = samples.labels().iter().map(|&l| l == class).collect();
        let dataset = Dataset::new(features.clone(), targets);

        let params = Svm::<f64, bool>::params().pos_neg_weights(config.cost, config.cost);
        let params = match config.kernel {
            SvmKernel::Linear => params.linear_kernel(),
            // linfa parameterizes the gaussian kernel as exp(-d^2 / eps)
            SvmKernel::RadialBasis { gamma } => params.gaussian_kernel(1.0 / gamma),
            SvmKernel::Polynomial { degree, coef0 } => params.polynomial_kernel(coef0, degree),
            SvmKernel::Sigmoid { .. } => unreachable!("rejected by validate_kernel"),
        };

        let svm = params.fit(&dataset).map_err(|e| {
            Error::Model(format!("svm training failed for class {class}: {e}"))
        })?;
        let mut decision = extract_decision(&svm, &features, &config.kernel);
        orient_decision(&mut decision, samples, class, &config.kernel);
        machines.push(ClassMachine {
            label: class,
            decision,
        });
    }

    Ok(SvmModel {
        kernel: config.kernel,
        dim: samples.dim(),
        machines,
    })
}

/// Pull the fitted machine's dual coefficients out into a self-contained
/// decision function. For the linear kernel the weight vector is folded up
/// front; otherwise the samples with nonzero coefficient are kept as
/// support vectors.
fn extract_decision(
    svm: &Svm<f64, bool>,
    features: &Array2<f64>,
    kernel: &SvmKernel,
) -> DecisionFunction {
    let rho = svm.rho;

    match kernel {
        SvmKernel::Linear => {
            let mut weights = vec![0.0; features.ncols()];
            for (row, &a) in features.rows().into_iter().zip(svm.alpha.iter()) {
                for (w, &x) in weights.iter_mut().zip(row.iter()) {
                    *w += a * x;
                }
            }
            DecisionFunction::Linear { weights, rho }
        }
        _ => {
            let mut alpha = Vec::new();
            let mut support = Vec::new();
            for (row, &a) in features.rows().into_iter().zip(svm.alpha.iter()) {
                if a != 0.0 {
                    alpha.push(a);
                    support.push(row.to_vec());
                }
            }
            DecisionFunction::Kernel {
                alpha,
                support,
                rho,
            }
        }
    }
}

/// The solver orients its separating hyperplane by its internal ordering
/// of the two target values, so the raw decision sign is not guaranteed to
/// mean "in class". Normalize it against the training samples: in-class
/// samples must score higher on average than the rest.
fn orient_decision(
    decision: &mut DecisionFunction,
    samples: &SampleSet,
    class: u32,
    kernel: &SvmKernel,
) {
    let mut in_sum = 0.0;
    let mut in_count = 0u64;
    let mut out_sum = 0.0;
    let mut out_count = 0u64;
    for (feature, label) in samples.iter() {
        let score = decision.score(kernel, feature);
        if label == class {
            in_sum += score;
            in_count += 1;
        } else {
            out_sum += score;
            out_count += 1;
        }
    }
    if in_count == 0 || out_count == 0 {
        return;
    }
    if in_sum / (in_count as f64) < out_sum / out_count as f64 {
        decision.negate();
    }
}

/// Deterministic cross-validated grid search over cost (and gamma for the
/// radial-basis kernel). Candidates that fail to train are skipped; if
/// every candidate fails the supplied configuration is kept.
fn optimize_config(samples: &SampleSet, base: &SvmConfig) -> Result<SvmConfig> {
    const COSTS: [f64; 4] = [0.1, 1.0, 10.0, 100.0];
    const GAMMAS: [f64; 4] = [0.01, 0.1, 1.0, 10.0];

    let mut candidates = Vec::new();
    match base.kernel {
        SvmKernel::RadialBasis { .. } => {
            for &cost in &COSTS {
                for &gamma in &GAMMAS {
                    candidates.push(SvmConfig {
                        kernel: SvmKernel::RadialBasis { gamma },
                        cost,
                        optimize: false,
                        folds: base.folds,
                    });
                }
            }
        }
        kernel => {
            for &cost in &COSTS {
                candidates.push(SvmConfig {
                    kernel,
                    cost,
                    optimize: false,
                    folds: base.folds,
                });
            }
        }
    }

    let folds = base.folds.max(2).min(samples.len());
    if folds < 2 {
        warn!("too few samples for cross-validation, keeping supplied parameters");
        return Ok(SvmConfig {
            optimize: false,
            ..base.clone()
        });
    }

    let mut best: Option<(f64, SvmConfig)> = None;
    for candidate in candidates {
        match cross_validate(samples, &candidate, folds) {
            Ok(accuracy) => {
                if best.as_ref().map_or(true, |(a, _)| accuracy > *a) {
                    best = Some((accuracy, candidate));
                }
            }
            Err(e) => warn!("grid-search candidate failed: {e}"),
        }
    }

    match best {
        Some((_, winner)) => Ok(winner),
        None => {
            warn!("every grid-search candidate failed, keeping supplied parameters");
            Ok(SvmConfig {
                optimize: false,
                ..base.clone()
            })
        }
    }
}

/// Mean accuracy over a deterministic k-fold split (sample `i` lands in
/// fold `i % k`).
fn cross_validate(samples: &SampleSet, config: &SvmConfig, folds: usize) -> Result<f64> {
    let n = samples.len();
    let mut correct = 0usize;
    let mut total = 0usize;

    for fold in 0..folds {
        let mut train = SampleSet::new(samples.dim());
        let mut test = SampleSet::new(samples.dim());
        for (i, (feature, label)) in samples.iter().enumerate() {
            if i % folds == fold {
                test.push(feature, label);
            } else {
                train.push(feature, label);
            }
        }
        if train.is_empty() || test.is_empty() {
            continue;
        }

        let model = train_with(&train, config)?;
        for (feature, label) in test.iter() {
            if model.classify_unchecked(feature) == label {
                correct += 1;
            }
            total += 1;
        }
    }

    if total == 0 {
        return Err(Error::Algorithm(format!(
            "cross-validation produced no test samples for {n} samples in {folds} folds"
        )));
    }
    Ok(correct as f64 / total as f64)
}

/// Classify every pixel of a multi-band raster.
///
/// Pixels whose every band equals the raster's no-data value (and pixels
/// with non-finite components) receive `fill_label` instead of a class.
pub fn classify_raster(
    model: &SvmModel,
    values: &MultibandRaster,
    fill_label: u32,
) -> Result<Raster<u32>> {
    if values.bands() != model.dim() {
        return Err(Error::InvalidParameter {
            name: "values",
            value: values.bands().to_string(),
            reason: format!("model expects {} bands", model.dim()),
        });
    }

    let (rows, cols) = values.shape();
    let data: Vec<u32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![fill_label; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                if values.is_nodata_pixel(row, col) {
                    continue;
                }
                let pixel = values.pixel(row, col);
                if pixel.iter().any(|v| !v.is_finite()) {
                    continue;
                }
                let feature = pixel.to_vec();
                *out = model.classify_unchecked(&feature);
            }
            row_data
        })
        .collect();

    let mut output = Raster::from_vec(data, rows, cols)?;
    output.set_nodata(Some(fill_label));
    Ok(output)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two well-separated 2-D clusters labeled 1 and 2
    fn separable_samples() -> SampleSet {
        let mut samples = SampleSet::new(2);
        for i in 0..10 {
            let jitter = (i % 5) as f64 * 0.1;
            samples.push(&[0.0 + jitter, 0.0 + jitter], 1);
            samples.push(&[10.0 - jitter, 10.0 - jitter], 2);
        }
        samples
    }

    #[test]
    fn test_train_and_classify_linear() {
        let samples = separable_samples();
        let config = SvmConfig {
            kernel: SvmKernel::Linear,
            ..Default::default()
        };
        let model = train_svm(&samples, &config).unwrap();

        assert_eq!(model.num_classes(), 2);
        assert_eq!(model.classes(), vec![1, 2]);
        assert_eq!(model.classify(&[0.5, 0.5]).unwrap(), 1);
        assert_eq!(model.classify(&[9.5, 9.5]).unwrap(), 2);
    }

    #[test]
    fn test_train_and_classify_rbf() {
        let samples = separable_samples();
        let config = SvmConfig {
            kernel: SvmKernel::RadialBasis { gamma: 0.5 },
            ..Default::default()
        };
        let model = train_svm(&samples, &config).unwrap();

        assert_eq!(model.classify(&[0.2, 0.1]).unwrap(), 1);
        assert_eq!(model.classify(&[9.8, 10.2]).unwrap(), 2);
    }

    #[test]
    fn test_classify_batch_recovers_training_labels() {
        let samples = separable_samples();
        let model = train_svm(
            &samples,
            &SvmConfig {
                kernel: SvmKernel::Linear,
                ..Default::default()
            },
        )
        .unwrap();

        let produced = model.classify_batch(&samples).unwrap();
        assert_eq!(produced, samples.labels());
    }

    #[test]
    fn test_empty_training_set_is_fatal() {
        let samples = SampleSet::new(2);
        let result = train_svm(&samples, &SvmConfig::default());
        assert!(matches!(result, Err(Error::NoTrainingSamples)));
    }

    #[test]
    fn test_sigmoid_kernel_is_rejected() {
        let samples = separable_samples();
        let config = SvmConfig {
            kernel: SvmKernel::Sigmoid {
                gamma: 0.1,
                coef0: 0.0,
            },
            ..Default::default()
        };
        let result = train_svm(&samples, &config);
        assert!(matches!(result, Err(Error::UnsupportedKernel(_))));
    }

    #[test]
    fn test_save_load_round_trip() {
        let samples = separable_samples();
        let model = train_svm(
            &samples,
            &SvmConfig {
                kernel: SvmKernel::RadialBasis { gamma: 0.5 },
                ..Default::default()
            },
        )
        .unwrap();

        let dir = std::env::temp_dir().join("remsen-svm-roundtrip");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.json");
        model.save(&path).unwrap();
        let loaded = SvmModel::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.num_classes(), model.num_classes());
        let probe: Vec<[f64; 2]> = vec![[0.3, 0.4], [5.1, 4.9], [9.7, 9.9], [2.0, 8.0]];
        for p in probe {
            assert_eq!(
                loaded.classify(&p).unwrap(),
                model.classify(&p).unwrap(),
                "loaded model diverges at {p:?}"
            );
        }
    }

    #[test]
    fn test_load_missing_file_is_fatal() {
        let result = SvmModel::load("/nonexistent/remsen-model.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_classify_dimension_mismatch() {
        let samples = separable_samples();
        let model = train_svm(
            &samples,
            &SvmConfig {
                kernel: SvmKernel::Linear,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(model.classify(&[1.0]).is_err());
        assert!(model.classify_batch(&SampleSet::new(3)).is_err());
    }

    #[test]
    fn test_optimize_picks_a_working_configuration() {
        let samples = separable_samples();
        let config = SvmConfig {
            kernel: SvmKernel::Linear,
            cost: 1.0,
            optimize: true,
            folds: 4,
        };
        let model = train_svm(&samples, &config).unwrap();
        assert_eq!(model.classify(&[0.0, 0.0]).unwrap(), 1);
        assert_eq!(model.classify(&[10.0, 10.0]).unwrap(), 2);
    }

    #[test]
    fn test_classify_raster_with_nodata() {
        let samples = separable_samples();
        let model = train_svm(
            &samples,
            &SvmConfig {
                kernel: SvmKernel::Linear,
                ..Default::default()
            },
        )
        .unwrap();

        let mut values = MultibandRaster::new(2, 2, 2);
        values.set_nodata(Some(-9999.0));
        values.set_pixel(0, 0, &[0.1, 0.2]).unwrap();
        values.set_pixel(0, 1, &[9.9, 9.8]).unwrap();
        values.set_pixel(1, 0, &[-9999.0, -9999.0]).unwrap();
        values.set_pixel(1, 1, &[0.4, 0.3]).unwrap();

        let classified = classify_raster(&model, &values, 0).unwrap();
        assert_eq!(classified.get(0, 0).unwrap(), 1);
        assert_eq!(classified.get(0, 1).unwrap(), 2);
        assert_eq!(classified.get(1, 0).unwrap(), 0);
        assert_eq!(classified.get(1, 1).unwrap(), 1);
    }
}
