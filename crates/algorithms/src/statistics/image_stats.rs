//! Whole-image per-band statistics
//!
//! Streams a multi-band raster region by region through the same mergeable
//! accumulator the per-label pass uses, publishing one count/mean/stddev/
//! min/max per band. The result feeds shift-scale normalization before
//! classifier training.

use crate::maybe_rayon::*;
use crate::statistics::accumulator::LabelAccumulator;
use remsen_core::raster::{split_region, MultibandRaster};
use remsen_core::Result;

/// Per-band statistics of one or more value images
#[derive(Debug, Clone)]
pub struct BandStatistics {
    /// Valid-sample count per band
    pub count: Vec<u64>,
    /// Per-band mean
    pub mean: Vec<f64>,
    /// Per-band unbiased standard deviation
    pub std_dev: Vec<f64>,
    /// Per-band minimum
    pub min: Vec<f64>,
    /// Per-band maximum
    pub max: Vec<f64>,
}

/// Compute per-band statistics of a single image.
///
/// `nodata` masks matching band values the same way the per-label pass
/// does; `target_regions` controls the streaming granularity.
pub fn image_statistics(
    values: &MultibandRaster,
    nodata: Option<f64>,
    target_regions: usize,
) -> Result<BandStatistics> {
    combined_band_statistics(std::iter::once(values), nodata, target_regions)
}

/// Compute per-band statistics over several images of the same band count,
/// as if their pixels formed one stream.
pub fn combined_band_statistics<'a>(
    images: impl IntoIterator<Item = &'a MultibandRaster>,
    nodata: Option<f64>,
    target_regions: usize,
) -> Result<BandStatistics> {
    let mut total: Option<LabelAccumulator> = None;

    for values in images {
        let regions = split_region(values.domain(), target_regions.max(1));
        let partials: Vec<LabelAccumulator> = regions
            .into_par_iter()
            .map(|region| {
                let mut acc = LabelAccumulator::new(values.bands());
                for row in region.row_range() {
                    for col in region.col_range() {
                        acc.update(values.pixel(row, col), nodata);
                    }
                }
                acc
            })
            .collect();

        let acc = total.get_or_insert_with(|| LabelAccumulator::new(values.bands()));
        for partial in &partials {
            acc.merge(partial);
        }
    }

    let acc = total.unwrap_or_else(|| LabelAccumulator::new(0));
    let count = acc.band_valid().to_vec();
    let stats = acc.finalize();
    Ok(BandStatistics {
        count,
        mean: stats.mean,
        std_dev: stats.std_dev,
        min: stats.min,
        max: stats.max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_statistics_basic() {
        let mut values = MultibandRaster::new(4, 4, 2);
        for row in 0..4 {
            for col in 0..4 {
                let v = (row * 4 + col) as f64;
                values.set_pixel(row, col, &[v, 2.0 * v]).unwrap();
            }
        }

        let stats = image_statistics(&values, None, 4).unwrap();
        assert_eq!(stats.count, vec![16, 16]);
        assert!((stats.mean[0] - 7.5).abs() < 1e-12);
        assert!((stats.mean[1] - 15.0).abs() < 1e-12);
        assert_eq!(stats.min[0], 0.0);
        assert_eq!(stats.max[0], 15.0);
        assert!(stats.std_dev[0] > 0.0);
    }

    #[test]
    fn test_region_count_invariance() {
        let mut values = MultibandRaster::new(9, 5, 1);
        for row in 0..9 {
            for col in 0..5 {
                values.set_pixel(row, col, &[(row * col) as f64]).unwrap();
            }
        }

        let a = image_statistics(&values, None, 1).unwrap();
        let b = image_statistics(&values, None, 9).unwrap();
        assert_eq!(a.count, b.count);
        assert!((a.mean[0] - b.mean[0]).abs() < 1e-12);
        assert!((a.std_dev[0] - b.std_dev[0]).abs() < 1e-12);
    }

    #[test]
    fn test_combined_over_two_images() {
        let mut a = MultibandRaster::new(2, 2, 1);
        let mut b = MultibandRaster::new(1, 2, 1);
        for (i, v) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            a.set_pixel(i / 2, i % 2, &[*v]).unwrap();
        }
        b.set_pixel(0, 0, &[5.0]).unwrap();
        b.set_pixel(0, 1, &[6.0]).unwrap();

        let stats = combined_band_statistics([&a, &b], None, 2).unwrap();
        assert_eq!(stats.count, vec![6]);
        assert!((stats.mean[0] - 3.5).abs() < 1e-12);
        assert_eq!(stats.min[0], 1.0);
        assert_eq!(stats.max[0], 6.0);
    }

    #[test]
    fn test_nodata_masked() {
        let mut values = MultibandRaster::new(1, 3, 1);
        values.set_pixel(0, 0, &[-1.0]).unwrap();
        values.set_pixel(0, 1, &[3.0]).unwrap();
        values.set_pixel(0, 2, &[5.0]).unwrap();

        let stats = image_statistics(&values, Some(-1.0), 1).unwrap();
        assert_eq!(stats.count, vec![2]);
        assert!((stats.mean[0] - 4.0).abs() < 1e-12);
    }
}
