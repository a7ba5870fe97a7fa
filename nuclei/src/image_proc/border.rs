//! Removal of components touching image borders.
//!
//! XY clearing looks at the row and column faces only; Z clearing looks at
//! the first and last depth slice. Both relabel the surviving components so
//! labels stay consecutive, which also makes the operation idempotent.

use ndarray::{ArrayD, ArrayViewD, Axis as NdAxis};
use std::collections::HashSet;

use super::labeling::{label_regions, Connectivity};
use crate::image::{AxesOrder, Axis};
use crate::report::Reporter;

/// Zero every label present on either face of the given axes, then relabel.
pub fn clear_border_labels(labels: &ArrayViewD<u32>, face_axes: &[usize]) -> ArrayD<u32> {
    let mut on_border = HashSet::new();
    for &axis in face_axes {
        let n = labels.len_of(NdAxis(axis));
        if n == 0 {
            continue;
        }
        for index in [0, n - 1] {
            on_border.extend(
                labels
                    .index_axis(NdAxis(axis), index)
                    .iter()
                    .copied()
                    .filter(|&l| l != 0),
            );
        }
    }
    let kept = labels.mapv(|l| if on_border.contains(&l) { 0 } else { l });
    label_regions(&kept.view(), Connectivity::Full).0
}

fn plane_axes(axes: &AxesOrder) -> Option<[usize; 2]> {
    Some([axes.position(Axis::Row)?, axes.position(Axis::Column)?])
}

/// Remove components touching the row or column edges.
///
/// A 2D image loses everything touching its outline. A 3D image ignores its
/// first and last depth slice here; see [`clear_z_borders`].
pub fn clear_xy_borders(
    labels: &ArrayViewD<u32>,
    axes: &AxesOrder,
    reporter: &dyn Reporter,
) -> ArrayD<u32> {
    match (labels.ndim(), plane_axes(axes)) {
        (2 | 3, Some(face_axes)) => clear_border_labels(labels, &face_axes),
        _ => {
            reporter.warn(&format!(
                "XY border clearing not implemented for images with {} dimensions ({axes})",
                labels.ndim()
            ));
            labels.to_owned()
        }
    }
}

/// Remove components touching the first or last depth slice.
///
/// Images without a depth axis are returned unchanged.
pub fn clear_z_borders(
    labels: &ArrayViewD<u32>,
    axes: &AxesOrder,
    reporter: &dyn Reporter,
) -> ArrayD<u32> {
    match (labels.ndim(), axes.position(Axis::Depth)) {
        (2, _) | (_, None) => labels.to_owned(),
        (3, Some(depth)) => clear_border_labels(labels, &[depth]),
        _ => {
            reporter.warn(&format!(
                "Z border clearing not implemented for images with {} dimensions",
                labels.ndim()
            ));
            labels.to_owned()
        }
    }
}
