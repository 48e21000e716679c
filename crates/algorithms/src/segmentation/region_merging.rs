//! Small-region merging
//!
//! Relabels segments whose population falls below a minimum size into
//! their spectrally closest adjacent segment, using the per-label
//! statistics pass for populations and mean vectors.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use tracing::warn;

use crate::maybe_rayon::*;
use crate::segmentation::adjacency::label_adjacency;
use crate::statistics::label_stats::{label_statistics, LabelStatisticsMap, LabelStatsParams};
use remsen_core::raster::{MultibandRaster, Raster};
use remsen_core::{Error, Result};

/// A label remapping, transitively resolved at construction.
///
/// No replacement value is itself replaced, so applying the table twice
/// yields the same raster as applying it once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelabelingTable {
    map: BTreeMap<u32, u32>,
}

impl RelabelingTable {
    /// Replacement for `label`; labels without an entry map to themselves
    pub fn target(&self, label: u32) -> u32 {
        self.map.get(&label).copied().unwrap_or(label)
    }

    /// Number of labels that are actually remapped
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table is the identity
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate (original, replacement) pairs in ascending label order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.map.iter().map(|(&from, &to)| (from, to))
    }

    /// Collapse merge chains so every entry points at its terminal label.
    ///
    /// `A→B, B→C` becomes `A→C, B→C`. A cycle (labels merging into each
    /// other) collapses every member onto the smallest label in the cycle,
    /// which then maps to itself and is dropped from the table.
    fn resolve(&mut self) {
        let keys: Vec<u32> = self.map.keys().copied().collect();
        let mut resolved = BTreeMap::new();

        for &start in &keys {
            let mut path = vec![start];
            let mut current = self.map[&start];
            let terminal = loop {
                if let Some(pos) = path.iter().position(|&p| p == current) {
                    break path[pos..].iter().copied().min().unwrap_or(current);
                }
                match self.map.get(&current) {
                    Some(&next) => {
                        path.push(current);
                        current = next;
                    }
                    None => break current,
                }
            };
            if terminal != start {
                resolved.insert(start, terminal);
            }
        }

        self.map = resolved;
    }
}

/// Parameters for [`merge_small_regions`]
#[derive(Debug, Clone)]
pub struct RegionMergingParams {
    /// Segments with population strictly below this merge into a neighbor
    pub min_size: u64,
    /// Statistics-pass configuration (no-data, background, tiling)
    pub stats: LabelStatsParams,
}

impl Default for RegionMergingParams {
    fn default() -> Self {
        Self {
            min_size: 50,
            stats: LabelStatsParams::default(),
        }
    }
}

/// Decide which small labels merge into which neighbors.
///
/// Labels are visited in increasing (population, label) order. A label
/// whose population is strictly below `min_size` merges into the adjacent
/// label whose mean vector is nearest in Euclidean distance; distance ties
/// break on the smallest label value. A small label with no adjacent label
/// at all is left unmapped. Chains are resolved transitively before the
/// table is published.
pub fn compute_relabeling(
    stats: &LabelStatisticsMap,
    adjacency: &BTreeMap<u32, BTreeSet<u32>>,
    min_size: u64,
) -> RelabelingTable {
    let mut order: Vec<(u64, u32)> = stats
        .iter()
        .map(|(&label, s)| (s.population, label))
        .collect();
    order.sort_unstable();

    let mut table = RelabelingTable::default();

    for (population, label) in order {
        if population >= min_size {
            break;
        }

        let Some(neighbors) = adjacency.get(&label) else {
            warn!(label, population, "small region has no adjacent label, left unmerged");
            continue;
        };

        let mean = &stats[&label].mean;
        let mut best: Option<(f64, u32)> = None;
        // Ascending neighbor order: the first strictly smaller distance
        // wins, so equal distances resolve to the smallest label
        for &neighbor in neighbors {
            let Some(neighbor_stats) = stats.get(&neighbor) else {
                continue;
            };
            let distance = euclidean_distance(mean, &neighbor_stats.mean);
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, neighbor));
            }
        }

        match best {
            Some((_, target)) => {
                table.map.insert(label, target);
            }
            None => {
                warn!(label, population, "small region has no adjacent label, left unmerged");
            }
        }
    }

    table.resolve();
    table
}

/// Rewrite a label raster through a relabeling table
pub fn apply_relabeling(labels: &Raster<u32>, table: &RelabelingTable) -> Result<Raster<u32>> {
    let (rows, cols) = labels.shape();

    let data: Vec<u32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| table.target(unsafe { labels.get_unchecked(row, col) }))
                .collect::<Vec<u32>>()
        })
        .collect();

    let mut output = Raster::from_array(
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?,
    );
    output.set_nodata(labels.nodata());
    Ok(output)
}

/// Merge small segments of a label image into their spectrally closest
/// neighbors, in one statistics → adjacency → relabel pass.
pub fn merge_small_regions(
    values: &MultibandRaster,
    labels: &Raster<u32>,
    params: &RegionMergingParams,
) -> Result<(Raster<u32>, RelabelingTable)> {
    let stats = label_statistics(values, labels, &params.stats)?;
    let adjacency = label_adjacency(labels, params.stats.background);
    let table = compute_relabeling(&stats, &adjacency, params.min_size);
    let relabeled = apply_relabeling(labels, &table)?;
    Ok((relabeled, table))
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::accumulator::LabelStatistics;

    fn stats_entry(population: u64, mean: Vec<f64>) -> LabelStatistics {
        let bands = mean.len();
        LabelStatistics {
            population,
            mean,
            std_dev: vec![0.0; bands],
            min: vec![0.0; bands],
            max: vec![0.0; bands],
        }
    }

    fn adjacency_of(pairs: &[(u32, u32)]) -> BTreeMap<u32, BTreeSet<u32>> {
        let mut map: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
        for &(a, b) in pairs {
            map.entry(a).or_default().insert(b);
            map.entry(b).or_default().insert(a);
        }
        map
    }

    #[test]
    fn test_small_label_merges_into_nearest_mean() {
        let mut stats = LabelStatisticsMap::new();
        stats.insert(1, stats_entry(5, vec![10.0]));
        stats.insert(2, stats_entry(100, vec![12.0]));
        stats.insert(3, stats_entry(100, vec![50.0]));
        let adjacency = adjacency_of(&[(1, 2), (1, 3)]);

        let table = compute_relabeling(&stats, &adjacency, 10);
        assert_eq!(table.target(1), 2);
        assert_eq!(table.target(2), 2);
        assert_eq!(table.target(3), 3);
    }

    #[test]
    fn test_distance_tie_breaks_on_smallest_label() {
        let mut stats = LabelStatisticsMap::new();
        stats.insert(5, stats_entry(2, vec![10.0]));
        stats.insert(7, stats_entry(100, vec![20.0]));
        stats.insert(9, stats_entry(100, vec![0.0]));
        let adjacency = adjacency_of(&[(5, 7), (5, 9)]);

        let table = compute_relabeling(&stats, &adjacency, 10);
        assert_eq!(table.target(5), 7);
    }

    #[test]
    fn test_chain_resolves_transitively() {
        // 1 (pop 2) merges into 2 (pop 5), which merges into 3 (pop 100):
        // after resolution both small labels point straight at 3
        let mut stats = LabelStatisticsMap::new();
        stats.insert(1, stats_entry(2, vec![0.0]));
        stats.insert(2, stats_entry(5, vec![10.0]));
        stats.insert(3, stats_entry(100, vec![11.0]));
        let adjacency = adjacency_of(&[(1, 2), (2, 3)]);

        let table = compute_relabeling(&stats, &adjacency, 10);
        assert_eq!(table.target(1), 3);
        assert_eq!(table.target(2), 3);
        // One hop only: no replacement value is itself a key
        for (_, to) in table.iter() {
            assert_eq!(table.target(to), to);
        }
    }

    #[test]
    fn test_mutual_merge_collapses_to_smallest() {
        // Two small labels adjacent only to each other
        let mut stats = LabelStatisticsMap::new();
        stats.insert(4, stats_entry(3, vec![0.0]));
        stats.insert(8, stats_entry(3, vec![0.5]));
        let adjacency = adjacency_of(&[(4, 8)]);

        let table = compute_relabeling(&stats, &adjacency, 10);
        assert_eq!(table.target(4), 4);
        assert_eq!(table.target(8), 4);
    }

    #[test]
    fn test_isolated_small_label_is_identity() {
        let mut stats = LabelStatisticsMap::new();
        stats.insert(1, stats_entry(2, vec![0.0]));
        stats.insert(2, stats_entry(100, vec![5.0]));
        // No adjacency at all for label 1
        let adjacency = adjacency_of(&[]);

        let table = compute_relabeling(&stats, &adjacency, 10);
        assert!(table.is_empty());
        assert_eq!(table.target(1), 1);
    }

    #[test]
    fn test_apply_relabeling_is_idempotent() {
        let mut labels: Raster<u32> = Raster::new(2, 3);
        for (i, l) in [1u32, 1, 2, 2, 3, 3].iter().enumerate() {
            labels.set(i / 3, i % 3, *l).unwrap();
        }

        let mut table = RelabelingTable::default();
        table.map.insert(1, 2);
        table.map.insert(2, 3);
        table.resolve();

        let once = apply_relabeling(&labels, &table).unwrap();
        let twice = apply_relabeling(&once, &table).unwrap();
        assert_eq!(once.data(), twice.data());
        assert!(once.data().iter().all(|&l| l == 3));
    }

    #[test]
    fn test_merge_small_regions_end_to_end() {
        // A 6x6 image: a 2x2 island labeled 7 with color close to region 1,
        // region 1 on the left, region 2 on the right
        let rows = 6;
        let cols = 6;
        let mut values = MultibandRaster::new(rows, cols, 2);
        let mut labels: Raster<u32> = Raster::new(rows, cols);
        for row in 0..rows {
            for col in 0..cols {
                let (label, color) = if col < 3 {
                    (1, [10.0, 10.0])
                } else {
                    (2, [200.0, 200.0])
                };
                labels.set(row, col, label).unwrap();
                values.set_pixel(row, col, &color).unwrap();
            }
        }
        for row in 2..4 {
            for col in 2..4 {
                labels.set(row, col, 7).unwrap();
                values.set_pixel(row, col, &[12.0, 12.0]).unwrap();
            }
        }

        let params = RegionMergingParams {
            min_size: 5,
            stats: LabelStatsParams::default(),
        };
        let (relabeled, table) = merge_small_regions(&values, &labels, &params).unwrap();

        // The island (population 4, mean near region 1) joins region 1
        assert_eq!(table.target(7), 1);
        assert_eq!(relabeled.get(2, 2).unwrap(), 1);
        assert_eq!(relabeled.get(0, 0).unwrap(), 1);
        assert_eq!(relabeled.get(0, 5).unwrap(), 2);
    }
}
