//! Streaming per-label statistics over a tiled image pair
//!
//! Computes population, mean, standard deviation, minimum and maximum per
//! label of a label image, reading the paired value image region by region.
//! Each region pass fills a private accumulator map, so disjoint regions can
//! be processed by independent workers with no locking; the only
//! synchronization point is the final merge in [`LabelStatisticsAggregator::synthetize`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::maybe_rayon::*;
use crate::statistics::accumulator::{LabelAccumulator, LabelStatistics};
use remsen_core::raster::{split_region, MultibandRaster, Raster, Region};
use remsen_core::{Error, Result};

/// Finalized statistics keyed by label, in ascending label order
pub type LabelStatisticsMap = BTreeMap<u32, LabelStatistics>;

/// Parameters for a label-statistics pass
#[derive(Debug, Clone)]
pub struct LabelStatsParams {
    /// Per-band no-data value excluded from band statistics
    pub nodata: Option<f64>,
    /// Label excluded entirely from the published map (background)
    pub background: Option<u32>,
    /// Number of row bands the parallel entry point streams over
    pub target_regions: usize,
}

impl Default for LabelStatsParams {
    fn default() -> Self {
        Self {
            nodata: None,
            background: None,
            target_regions: 8,
        }
    }
}

/// Accumulate one region of the (value, label) image pair into a fresh
/// per-label accumulator map.
///
/// This is the worker-side kernel of the streaming pass: it touches no
/// shared state, so any number of calls over disjoint regions may run
/// concurrently. Pixels are visited in row-major order, but the merge
/// algebra makes the published statistics independent of visit order.
pub fn accumulate_region(
    values: &MultibandRaster,
    labels: &Raster<u32>,
    region: Region,
    params: &LabelStatsParams,
) -> Result<BTreeMap<u32, LabelAccumulator>> {
    check_extents(values, labels)?;

    let (rows, cols) = labels.shape();
    if region.end_row() > rows || region.end_col() > cols {
        return Err(Error::IndexOutOfBounds {
            row: region.end_row().saturating_sub(1),
            col: region.end_col().saturating_sub(1),
            rows,
            cols,
        });
    }

    let bands = values.bands();
    let mut partial: BTreeMap<u32, LabelAccumulator> = BTreeMap::new();

    for row in region.row_range() {
        for col in region.col_range() {
            let label = unsafe { labels.get_unchecked(row, col) };
            if params.background == Some(label) {
                continue;
            }

            partial
                .entry(label)
                .or_insert_with(|| LabelAccumulator::new(bands))
                .update(values.pixel(row, col), params.nodata);
        }
    }

    Ok(partial)
}

/// Streaming label-statistics aggregator.
///
/// Lifecycle: [`reset`](Self::reset) →
/// [`process_region`](Self::process_region) over the regions of one pass,
/// in any order → [`synthetize`](Self::synthetize) →
/// [`statistics`](Self::statistics).
///
/// Reading the map before `synthetize` yields the empty (or stale) map,
/// and reusing the aggregator without `reset` silently carries the prior
/// pass's partials into the next merge; both mirror the behavior of
/// streaming statistics filters this design follows.
#[derive(Debug, Default)]
pub struct LabelStatisticsAggregator {
    params: LabelStatsParams,
    partials: Vec<BTreeMap<u32, LabelAccumulator>>,
    published: LabelStatisticsMap,
}

impl LabelStatisticsAggregator {
    /// Create an aggregator with the given pass parameters
    pub fn new(params: LabelStatsParams) -> Self {
        Self {
            params,
            partials: Vec::new(),
            published: LabelStatisticsMap::new(),
        }
    }

    /// Pass parameters
    pub fn params(&self) -> &LabelStatsParams {
        &self.params
    }

    /// Clear all partial accumulator maps and the published map.
    ///
    /// Must be called before reusing the aggregator for a new image pair.
    pub fn reset(&mut self) {
        self.partials.clear();
        self.published.clear();
    }

    /// Accumulate one region into a private partial map.
    ///
    /// Fails fast on value/label extent mismatch or a region outside the
    /// image domain.
    pub fn process_region(
        &mut self,
        values: &MultibandRaster,
        labels: &Raster<u32>,
        region: Region,
    ) -> Result<()> {
        let partial = accumulate_region(values, labels, region, &self.params)?;
        self.partials.push(partial);
        Ok(())
    }

    /// Merge all partial maps and finalize the published statistics.
    ///
    /// Labels present in only one partial are inserted as-is; labels
    /// present in several are merged pairwise. Call exactly once after all
    /// regions of a pass have been processed. The partials themselves stay
    /// in place, which is why a skipped `reset` carries them into the next
    /// pass.
    pub fn synthetize(&mut self) {
        let mut merged: BTreeMap<u32, LabelAccumulator> = BTreeMap::new();
        for partial in &self.partials {
            for (label, acc) in partial {
                match merged.entry(*label) {
                    Entry::Occupied(mut slot) => slot.get_mut().merge(acc),
                    Entry::Vacant(slot) => {
                        slot.insert(acc.clone());
                    }
                }
            }
        }

        self.published = merged
            .into_iter()
            .map(|(label, acc)| (label, acc.finalize()))
            .collect();
    }

    /// The published per-label statistics
    pub fn statistics(&self) -> &LabelStatisticsMap {
        &self.published
    }

    /// Consume the aggregator, yielding the published map
    pub fn into_statistics(self) -> LabelStatisticsMap {
        self.published
    }
}

/// Compute per-label statistics for a (value, label) image pair.
///
/// Splits the domain into `params.target_regions` row bands, accumulates
/// the bands in parallel, merges and finalizes. For a fixed input pair and
/// configuration the result is identical for any region count (up to
/// floating-point rounding), so the parallelism is free to vary.
pub fn label_statistics(
    values: &MultibandRaster,
    labels: &Raster<u32>,
    params: &LabelStatsParams,
) -> Result<LabelStatisticsMap> {
    check_extents(values, labels)?;

    let regions = split_region(labels.domain(), params.target_regions.max(1));
    let partials: Vec<BTreeMap<u32, LabelAccumulator>> = regions
        .into_par_iter()
        .map(|region| accumulate_region(values, labels, region, params))
        .collect::<Result<_>>()?;

    let mut aggregator = LabelStatisticsAggregator::new(params.clone());
    aggregator.partials = partials;
    aggregator.synthetize();
    Ok(aggregator.into_statistics())
}

fn check_extents(values: &MultibandRaster, labels: &Raster<u32>) -> Result<()> {
    if values.shape() != labels.shape() {
        let (er, ec) = values.shape();
        let (ar, ac) = labels.shape();
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    Ok(())
}
