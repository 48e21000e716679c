//! Confusion matrix and derived accuracy metrics
//!
//! Rows are reference labels, columns are produced labels. Per-class
//! precision, recall and F-score, plus the global kappa index and overall
//! accuracy, are derived once from the counted matrix.

use std::io::Write;

use ndarray::{Array2, ArrayView2};

use crate::classification::svm::OUTLIER_SENTINEL;
use remsen_core::{Error, Result};

/// Replace the one-class outlier sentinel with a fixed outlier class.
///
/// The backing SVM library reports one-class outliers as the maximum
/// representable label; confusion-matrix consumers expect a real class
/// there, so the remap is kept as an explicit step rather than folded into
/// the counting.
pub fn remap_outlier_sentinel(labels: &mut [u32], outlier_class: u32) {
    for label in labels.iter_mut() {
        if *label == OUTLIER_SENTINEL {
            *label = outlier_class;
        }
    }
}

/// A square confusion matrix over the union of reference and produced
/// labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    classes: Vec<u32>,
    matrix: Array2<u64>,
}

impl ConfusionMatrix {
    /// Count reference/produced label pairs into a matrix.
    ///
    /// The two slices must pair up element by element; a length mismatch
    /// is fatal. The class axis is the sorted union of the labels seen on
    /// either side, so every sample lands in exactly one cell.
    pub fn from_labels(reference: &[u32], produced: &[u32]) -> Result<Self> {
        if reference.len() != produced.len() {
            return Err(Error::Algorithm(format!(
                "reference and produced label counts differ: {} vs {}",
                reference.len(),
                produced.len()
            )));
        }

        let mut classes: Vec<u32> = reference.iter().chain(produced.iter()).copied().collect();
        classes.sort_unstable();
        classes.dedup();

        let n = classes.len();
        let mut matrix = Array2::zeros((n, n));
        for (&r, &p) in reference.iter().zip(produced.iter()) {
            let ri = classes.binary_search(&r).expect("class axis covers labels");
            let pi = classes.binary_search(&p).expect("class axis covers labels");
            matrix[(ri, pi)] += 1;
        }

        Ok(Self { classes, matrix })
    }

    /// Class labels along both axes, ascending
    pub fn classes(&self) -> &[u32] {
        &self.classes
    }

    /// The counted matrix, rows = reference, columns = produced
    pub fn matrix(&self) -> ArrayView2<'_, u64> {
        self.matrix.view()
    }

    /// Total number of classified samples
    pub fn total(&self) -> u64 {
        self.matrix.sum()
    }

    /// Count of samples with the given reference and produced labels
    pub fn count(&self, reference: u32, produced: u32) -> u64 {
        let (Ok(ri), Ok(pi)) = (
            self.classes.binary_search(&reference),
            self.classes.binary_search(&produced),
        ) else {
            return 0;
        };
        self.matrix[(ri, pi)]
    }

    fn class_index(&self, class: u32) -> Option<usize> {
        self.classes.binary_search(&class).ok()
    }

    fn reference_total(&self, index: usize) -> u64 {
        self.matrix.row(index).sum()
    }

    fn produced_total(&self, index: usize) -> u64 {
        self.matrix.column(index).sum()
    }

    /// Precision of one class: diagonal over produced total, 0 when the
    /// class was never produced
    pub fn precision(&self, class: u32) -> f64 {
        let Some(i) = self.class_index(class) else {
            return 0.0;
        };
        ratio(self.matrix[(i, i)], self.produced_total(i))
    }

    /// Recall of one class: diagonal over reference total, 0 when the
    /// class never appears in the reference
    pub fn recall(&self, class: u32) -> f64 {
        let Some(i) = self.class_index(class) else {
            return 0.0;
        };
        ratio(self.matrix[(i, i)], self.reference_total(i))
    }

    /// F-score of one class: harmonic mean of precision and recall
    pub fn f_score(&self, class: u32) -> f64 {
        let p = self.precision(class);
        let r = self.recall(class);
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Per-class precisions, in class order
    pub fn precisions(&self) -> Vec<f64> {
        self.classes.iter().map(|&c| self.precision(c)).collect()
    }

    /// Per-class recalls, in class order
    pub fn recalls(&self) -> Vec<f64> {
        self.classes.iter().map(|&c| self.recall(c)).collect()
    }

    /// Per-class F-scores, in class order
    pub fn f_scores(&self) -> Vec<f64> {
        self.classes.iter().map(|&c| self.f_score(c)).collect()
    }

    /// Share of samples on the diagonal
    pub fn overall_accuracy(&self) -> f64 {
        let total = self.total();
        let diagonal: u64 = (0..self.classes.len()).map(|i| self.matrix[(i, i)]).sum();
        ratio(diagonal, total)
    }

    /// Kappa index: agreement corrected for chance.
    ///
    /// When chance agreement is 1 (all mass in a single class on both
    /// axes) the usual formula degenerates to 0/0; perfect agreement then
    /// reports 1.0 and anything else 0.0.
    pub fn kappa(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;

        let observed = self.overall_accuracy();
        let chance: f64 = (0..self.classes.len())
            .map(|i| self.reference_total(i) as f64 * self.produced_total(i) as f64)
            .sum::<f64>()
            / (n * n);

        if (1.0 - chance).abs() < f64::EPSILON {
            if (observed - 1.0).abs() < f64::EPSILON {
                1.0
            } else {
                0.0
            }
        } else {
            (observed - chance) / (1.0 - chance)
        }
    }

    /// Write the matrix as CSV with reference/produced header comments
    pub fn write_csv<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let header: Vec<String> = self.classes.iter().map(|c| c.to_string()).collect();
        writeln!(out, "#Reference labels (rows):{}", header.join(","))?;
        writeln!(out, "#Produced labels (columns):{}", header.join(","))?;
        for row in self.matrix.rows() {
            let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            writeln!(out, "{}", cells.join(","))?;
        }
        Ok(())
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_sum_equals_sample_count() {
        let reference = [1, 1, 2, 2, 3, 3, 3];
        let produced = [1, 2, 2, 2, 3, 1, 3];
        let cm = ConfusionMatrix::from_labels(&reference, &produced).unwrap();
        assert_eq!(cm.total(), 7);
        assert_eq!(cm.classes(), &[1, 2, 3]);
    }

    #[test]
    fn test_known_small_case() {
        // reference 1: produced [1, 1, 2]; reference 2: produced [2, 2]
        let reference = [1, 1, 1, 2, 2];
        let produced = [1, 1, 2, 2, 2];
        let cm = ConfusionMatrix::from_labels(&reference, &produced).unwrap();

        assert_eq!(cm.count(1, 1), 2);
        assert_eq!(cm.count(1, 2), 1);
        assert_eq!(cm.count(2, 2), 2);
        assert!((cm.precision(1) - 1.0).abs() < 1e-12);
        assert!((cm.recall(1) - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.precision(2) - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.recall(2) - 1.0).abs() < 1e-12);
        assert!((cm.f_score(1) - 0.8).abs() < 1e-12);
        assert!((cm.overall_accuracy() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_metric_ranges() {
        let reference = [1, 2, 3, 1, 2, 3, 1, 1];
        let produced = [1, 3, 3, 2, 2, 1, 1, 3];
        let cm = ConfusionMatrix::from_labels(&reference, &produced).unwrap();

        let kappa = cm.kappa();
        assert!((-1.0..=1.0).contains(&kappa));
        for &class in cm.classes() {
            assert!((0.0..=1.0).contains(&cm.precision(class)));
            assert!((0.0..=1.0).contains(&cm.recall(class)));
            assert!((0.0..=1.0).contains(&cm.f_score(class)));
        }
    }

    #[test]
    fn test_perfect_agreement_kappa() {
        let labels = [1, 2, 3, 1, 2, 3];
        let cm = ConfusionMatrix::from_labels(&labels, &labels).unwrap();
        assert!((cm.kappa() - 1.0).abs() < 1e-12);
        assert!((cm.overall_accuracy() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_degenerate_kappa() {
        let cm = ConfusionMatrix::from_labels(&[5, 5, 5], &[5, 5, 5]).unwrap();
        assert_eq!(cm.kappa(), 1.0);
    }

    #[test]
    fn test_length_mismatch_is_fatal() {
        let result = ConfusionMatrix::from_labels(&[1, 2], &[1]);
        assert!(result.is_err());
    }

    #[test]
    fn test_outlier_sentinel_remap() {
        let mut produced = vec![1, OUTLIER_SENTINEL, 2, OUTLIER_SENTINEL];
        remap_outlier_sentinel(&mut produced, 0);
        assert_eq!(produced, vec![1, 0, 2, 0]);

        let reference = [1, 1, 2, 2];
        let cm = ConfusionMatrix::from_labels(&reference, &produced).unwrap();
        assert_eq!(cm.classes(), &[0, 1, 2]);
        assert_eq!(cm.count(1, 0), 1);
        assert_eq!(cm.count(2, 0), 1);
    }

    #[test]
    fn test_csv_export() {
        let reference = [1, 1, 2];
        let produced = [1, 2, 2];
        let cm = ConfusionMatrix::from_labels(&reference, &produced).unwrap();

        let mut buffer = Vec::new();
        cm.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.starts_with("#Reference labels (rows):1,2\n"));
        assert!(text.contains("#Produced labels (columns):1,2\n"));
        assert!(text.ends_with("1,1\n0,1\n"));
    }
}
