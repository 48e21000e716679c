//! Label adjacency discovery
//!
//! The region-merging policy consumes an adjacency relation but does not
//! compute one; this border scan is the default collaborator supplying it.

use std::collections::{BTreeMap, BTreeSet};

use remsen_core::raster::Raster;

/// Discover which labels touch which, under 4-connectivity.
///
/// Scans each pixel's right and down neighbors once, so every border is
/// seen exactly once and recorded symmetrically. Pixels carrying the
/// `background` label (if any) form no adjacencies. Labels with no
/// neighbor at all (single-label image, or islands inside background) are
/// absent from the returned map.
pub fn label_adjacency(
    labels: &Raster<u32>,
    background: Option<u32>,
) -> BTreeMap<u32, BTreeSet<u32>> {
    let (rows, cols) = labels.shape();
    let mut adjacency: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();

    let mut link = |a: u32, b: u32| {
        if a == b || background == Some(a) || background == Some(b) {
            return;
        }
        adjacency.entry(a).or_default().insert(b);
        adjacency.entry(b).or_default().insert(a);
    };

    for row in 0..rows {
        for col in 0..cols {
            let here = unsafe { labels.get_unchecked(row, col) };
            if col + 1 < cols {
                link(here, unsafe { labels.get_unchecked(row, col + 1) });
            }
            if row + 1 < rows {
                link(here, unsafe { labels.get_unchecked(row + 1, col) });
            }
        }
    }

    adjacency
}
