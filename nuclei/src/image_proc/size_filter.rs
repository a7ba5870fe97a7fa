//! Per-label extent over a subset of axes.
//!
//! The extent of a label over axes `A` is the number of distinct coordinate
//! tuples on `A` among its voxels: over `YX` that is the projected area, over
//! `Z` the number of slices it spans.

use ndarray::{ArrayD, ArrayViewD, Dimension};
use std::collections::{BTreeMap, HashSet};

pub fn axis_sizes(labels: &ArrayViewD<u32>, axes: &[usize]) -> BTreeMap<u32, usize> {
    let shape = labels.shape();
    let mut seen: HashSet<(u32, usize)> = HashSet::new();
    for (index, &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let coords = index.slice();
        let key = axes
            .iter()
            .fold(0usize, |acc, &axis| acc * shape[axis] + coords[axis]);
        seen.insert((label, key));
    }

    let mut sizes = BTreeMap::new();
    for (label, _) in seen {
        *sizes.entry(label).or_insert(0) += 1;
    }
    sizes
}

/// Zero labels whose extent over `axes` lies outside `[min, max]`.
pub fn filter_by_axis_size(
    labels: &ArrayViewD<u32>,
    axes: &[usize],
    min: f64,
    max: f64,
) -> ArrayD<u32> {
    let sizes = axis_sizes(labels, axes);
    labels.mapv(|label| match sizes.get(&label) {
        Some(&size) if (min..=max).contains(&(size as f64)) => label,
        _ => 0,
    })
}
