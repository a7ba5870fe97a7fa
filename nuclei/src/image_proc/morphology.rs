//! Binary morphology with a 3-wide box structuring element.
//!
//! The box element is separable, so dilation and erosion run as one 3-tap
//! pass per axis. Dilation treats samples beyond the edge as background and
//! erosion treats them as foreground, which keeps objects touching the edge
//! from shrinking.
//!
//! Public operations accept 2D and 3D masks. Any other rank is reported and
//! the input is returned unchanged.

use ndarray::{ArrayD, ArrayViewD, Axis, Dimension, IxDyn, Slice, Zip};
use std::collections::HashSet;

use super::labeling::{connected_components, Connectivity};
use crate::report::Reporter;

fn supported(mask: &ArrayViewD<bool>, operation: &str, reporter: &dyn Reporter) -> bool {
    if matches!(mask.ndim(), 2 | 3) {
        true
    } else {
        reporter.warn(&format!(
            "{operation} not implemented for images with {} dimensions",
            mask.ndim()
        ));
        false
    }
}

fn dilate_nd(mask: &ArrayViewD<bool>) -> ArrayD<bool> {
    let mut current = mask.to_owned();
    for axis in 0..mask.ndim() {
        let source = current.clone();
        Zip::from(current.lanes_mut(Axis(axis)))
            .and(source.lanes(Axis(axis)))
            .for_each(|mut out, src| {
                let n = src.len();
                for k in 0..n {
                    out[k] = src[k] || (k > 0 && src[k - 1]) || (k + 1 < n && src[k + 1]);
                }
            });
    }
    current
}

fn erode_nd(mask: &ArrayViewD<bool>) -> ArrayD<bool> {
    let mut current = mask.to_owned();
    for axis in 0..mask.ndim() {
        let source = current.clone();
        Zip::from(current.lanes_mut(Axis(axis)))
            .and(source.lanes(Axis(axis)))
            .for_each(|mut out, src| {
                let n = src.len();
                for k in 0..n {
                    out[k] = src[k] && (k == 0 || src[k - 1]) && (k + 1 == n || src[k + 1]);
                }
            });
    }
    current
}

/// Holes are background regions (face connectivity) not touching the edge.
fn fill_holes_nd(mask: &ArrayViewD<bool>) -> ArrayD<bool> {
    let background = mask.mapv(|v| !v);
    let (labels, _) = connected_components(&background.view(), Connectivity::Face);
    let shape = mask.shape();

    let mut border = HashSet::new();
    for (index, &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let on_edge = index
            .slice()
            .iter()
            .zip(shape)
            .any(|(&i, &n)| i == 0 || i + 1 == n);
        if on_edge {
            border.insert(label);
        }
    }

    Zip::from(mask)
        .and(&labels)
        .map_collect(|&m, &l| m || (l != 0 && !border.contains(&l)))
}

pub fn dilate(mask: &ArrayViewD<bool>, reporter: &dyn Reporter) -> ArrayD<bool> {
    if !supported(mask, "dilation", reporter) {
        return mask.to_owned();
    }
    dilate_nd(mask)
}

pub fn erode(mask: &ArrayViewD<bool>, reporter: &dyn Reporter) -> ArrayD<bool> {
    if !supported(mask, "erosion", reporter) {
        return mask.to_owned();
    }
    erode_nd(mask)
}

/// Dilation followed by erosion.
pub fn close(mask: &ArrayViewD<bool>, reporter: &dyn Reporter) -> ArrayD<bool> {
    if !supported(mask, "closing", reporter) {
        return mask.to_owned();
    }
    erode_nd(&dilate_nd(mask).view())
}

/// Erosion followed by dilation.
pub fn open(mask: &ArrayViewD<bool>, reporter: &dyn Reporter) -> ArrayD<bool> {
    if !supported(mask, "opening", reporter) {
        return mask.to_owned();
    }
    dilate_nd(&erode_nd(mask).view())
}

/// Fill enclosed background.
///
/// 3D masks are filled as a volume first, then plane by plane along the
/// first axis, which also closes holes that leak through the top or bottom
/// slice.
pub fn fill_holes(mask: &ArrayViewD<bool>, reporter: &dyn Reporter) -> ArrayD<bool> {
    if !supported(mask, "hole filling", reporter) {
        return mask.to_owned();
    }
    let mut filled = fill_holes_nd(mask);
    if filled.ndim() == 3 {
        for mut plane in filled.axis_iter_mut(Axis(0)) {
            let plane_filled = fill_holes_nd(&plane.view());
            plane.assign(&plane_filled);
        }
    }
    filled
}

/// `iterations` dilations, hole filling, then as many erosions.
///
/// Closes gaps up to `2 * iterations` wide before filling. Zero iterations
/// returns the input.
pub fn dilate_fill_erode(
    mask: &ArrayViewD<bool>,
    iterations: usize,
    reporter: &dyn Reporter,
) -> ArrayD<bool> {
    if iterations == 0 || !supported(mask, "dilate-fill-erode", reporter) {
        return mask.to_owned();
    }
    let mut current = mask.to_owned();
    for _ in 0..iterations {
        current = dilate_nd(&current.view());
    }
    current = fill_holes(&current.view(), reporter);
    for _ in 0..iterations {
        current = erode_nd(&current.view());
    }
    current
}

/// Pad every axis by `width` on both sides with `fill`.
pub fn pad<T: Clone>(array: &ArrayViewD<T>, width: usize, fill: T) -> ArrayD<T> {
    let shape: Vec<usize> = array.shape().iter().map(|&n| n + 2 * width).collect();
    let mut padded = ArrayD::from_elem(IxDyn(&shape), fill);
    padded
        .slice_each_axis_mut(|ax| Slice::from(width..width + array.len_of(ax.axis)))
        .assign(array);
    padded
}
