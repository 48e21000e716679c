//! Mergeable per-label statistics accumulator
//!
//! One accumulator tracks the running statistics of every pixel routed to
//! one label within one worker's partition. Workers never share an
//! accumulator; their maps are merged once, after all regions of a pass
//! have been processed.

use ndarray::ArrayView1;

/// Running per-label statistics: count, per-band sum, sum of squares,
/// valid-sample count, minimum and maximum.
///
/// `merge` is algebraically equivalent to having fed both pixel streams
/// through a single accumulator, which makes the final statistics
/// independent of how the image was tiled and in what order the tiles were
/// processed.
#[derive(Debug, Clone)]
pub struct LabelAccumulator {
    count: u64,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    band_valid: Vec<u64>,
    min: Vec<f64>,
    max: Vec<f64>,
}

/// Finalized statistics for one label
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStatistics {
    /// Number of pixels carrying the label
    pub population: u64,
    /// Per-band mean
    pub mean: Vec<f64>,
    /// Per-band unbiased standard deviation
    pub std_dev: Vec<f64>,
    /// Per-band minimum
    pub min: Vec<f64>,
    /// Per-band maximum
    pub max: Vec<f64>,
}

impl LabelAccumulator {
    /// Create an empty accumulator for `bands` components per pixel
    pub fn new(bands: usize) -> Self {
        Self {
            count: 0,
            sum: vec![0.0; bands],
            sum_sq: vec![0.0; bands],
            band_valid: vec![0; bands],
            min: vec![f64::INFINITY; bands],
            max: vec![f64::NEG_INFINITY; bands],
        }
    }

    /// Number of bands this accumulator tracks
    pub fn bands(&self) -> usize {
        self.sum.len()
    }

    /// Number of pixels routed to this accumulator
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Per-band count of values that actually entered the statistics
    pub fn band_valid(&self) -> &[u64] {
        &self.band_valid
    }

    /// Fold one pixel into the running statistics.
    ///
    /// A band equal to `nodata` (or non-finite) contributes to nothing for
    /// this pixel, but the pixel itself still counts toward the label's
    /// population; image-level no-data pixels are the caller's concern.
    pub fn update(&mut self, pixel: ArrayView1<'_, f64>, nodata: Option<f64>) {
        debug_assert_eq!(pixel.len(), self.bands());
        self.count += 1;

        for (band, &v) in pixel.iter().enumerate() {
            if !v.is_finite() {
                continue;
            }
            if let Some(nd) = nodata {
                if v == nd {
                    continue;
                }
            }

            self.sum[band] += v;
            self.sum_sq[band] += v * v;
            self.band_valid[band] += 1;
            if v < self.min[band] {
                self.min[band] = v;
            }
            if v > self.max[band] {
                self.max[band] = v;
            }
        }
    }

    /// Fold another accumulator for the same label into this one.
    ///
    /// Counts, sums and sums of squares are additive; minima and maxima
    /// combine componentwise.
    pub fn merge(&mut self, other: &LabelAccumulator) {
        assert_eq!(
            self.bands(),
            other.bands(),
            "accumulators of one pass must share the band layout"
        );

        self.count += other.count;
        for band in 0..self.bands() {
            self.sum[band] += other.sum[band];
            self.sum_sq[band] += other.sum_sq[band];
            self.band_valid[band] += other.band_valid[band];
            if other.min[band] < self.min[band] {
                self.min[band] = other.min[band];
            }
            if other.max[band] > self.max[band] {
                self.max[band] = other.max[band];
            }
        }
    }

    /// Finalize into published statistics.
    ///
    /// Standard deviation uses the unbiased estimator
    /// `sqrt((sum_sq - sum * mean) / (n - 1))`. A band with one or zero
    /// valid samples publishes a standard deviation of `0.0` rather than
    /// NaN; a band with zero valid samples publishes NaN mean/min/max.
    pub fn finalize(&self) -> LabelStatistics {
        let bands = self.bands();
        let mut mean = vec![f64::NAN; bands];
        let mut std_dev = vec![0.0; bands];
        let mut min = vec![f64::NAN; bands];
        let mut max = vec![f64::NAN; bands];

        for band in 0..bands {
            let n = self.band_valid[band];
            if n == 0 {
                continue;
            }

            let m = self.sum[band] / n as f64;
            mean[band] = m;
            min[band] = self.min[band];
            max[band] = self.max[band];

            if n > 1 {
                let var = (self.sum_sq[band] - self.sum[band] * m) / (n - 1) as f64;
                // Rounding can push a uniform band's variance a hair below zero
                std_dev[band] = var.max(0.0).sqrt();
            }
        }

        LabelStatistics {
            population: self.count,
            mean,
            std_dev,
            min,
            max,
        }
    }
}
