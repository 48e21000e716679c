//! Shift-scale feature normalization
//!
//! Standardizes feature ranges before training and classification,
//! typically with per-band mean as shift and standard deviation as scale
//! from a whole-image statistics pass.

use tracing::warn;

use crate::classification::samples::SampleSet;
use remsen_core::{Error, Result};

/// Scales at or below this threshold fall back to shift-only
pub const SCALE_EPSILON: f64 = 1e-10;

/// Apply `(x - shift) / scale` per band to every sample.
///
/// A band whose scale is not above [`SCALE_EPSILON`] is only shifted;
/// dividing by a near-zero standard deviation would blow the band up, so
/// the degenerate band keeps its spread instead. The input set is not
/// modified.
pub fn shift_scale(samples: &SampleSet, shifts: &[f64], scales: &[f64]) -> Result<SampleSet> {
    let dim = samples.dim();
    if shifts.len() != dim || scales.len() != dim {
        return Err(Error::InvalidParameter {
            name: "shifts/scales",
            value: format!("{}/{}", shifts.len(), scales.len()),
            reason: format!("expected one entry per band ({dim})"),
        });
    }

    let degenerate: Vec<usize> = (0..dim).filter(|&b| scales[b] <= SCALE_EPSILON).collect();
    if !degenerate.is_empty() {
        warn!(
            bands = ?degenerate,
            "near-zero scale, falling back to shift-only for these bands"
        );
    }

    let mut output = SampleSet::new(dim);
    let mut buffer = vec![0.0; dim];
    for (feature, label) in samples.iter() {
        for band in 0..dim {
            let shifted = feature[band] - shifts[band];
            buffer[band] = if scales[band] > SCALE_EPSILON {
                shifted / scales[band]
            } else {
                shifted
            };
        }
        output.push(&buffer, label);
    }

    Ok(output)
}
