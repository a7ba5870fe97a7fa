//! N-dimensional connected-component labeling.
//!
//! Two-pass union-find over a raster scan. Only neighbors that precede the
//! current voxel in raster order are visited in the first pass, so each
//! voxel is examined once. Final labels are consecutive starting at 1, in
//! order of first appearance.

use ndarray::{ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which neighbors are considered adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity {
    /// Neighbors sharing a face (4 in 2D, 6 in 3D).
    Face,
    /// Every neighbor in the surrounding 3^n box (8 in 2D, 26 in 3D).
    #[default]
    Full,
}

fn find_root(parents: &mut [usize], mut x: usize) -> usize {
    let mut root = x;
    while parents[root] != root {
        root = parents[root];
    }
    while parents[x] != root {
        let next = parents[x];
        parents[x] = root;
        x = next;
    }
    root
}

fn union_labels(parents: &mut [usize], a: usize, b: usize) -> usize {
    let root_a = find_root(parents, a);
    let root_b = find_root(parents, b);
    if root_a == root_b {
        return root_a;
    }
    let (small, large) = if root_a < root_b {
        (root_a, root_b)
    } else {
        (root_b, root_a)
    };
    parents[large] = small;
    small
}

/// Offsets to already-visited neighbors: the first nonzero component is -1.
fn preceding_offsets(ndim: usize, connectivity: Connectivity) -> Vec<Vec<isize>> {
    let total = 3usize.pow(ndim as u32);
    let mut offsets = Vec::new();
    for code in 0..total {
        let mut rest = code;
        let mut offset = vec![0isize; ndim];
        for slot in offset.iter_mut().rev() {
            *slot = (rest % 3) as isize - 1;
            rest /= 3;
        }
        let nonzero = offset.iter().filter(|&&d| d != 0).count();
        let preceding = offset.iter().find(|&&d| d != 0) == Some(&-1);
        let allowed = match connectivity {
            Connectivity::Face => nonzero == 1,
            Connectivity::Full => nonzero >= 1,
        };
        if preceding && allowed {
            offsets.push(offset);
        }
    }
    offsets
}

/// Label regions of equal non-zero value.
///
/// Two adjacent voxels join the same component only if they carry the same
/// value, so touching but distinct labels stay separate. Returns the labels
/// and the component count.
pub fn label_regions(values: &ArrayViewD<u32>, connectivity: Connectivity) -> (ArrayD<u32>, u32) {
    let shape = values.shape().to_vec();
    let ndim = shape.len();
    let flat: Vec<u32> = values.iter().copied().collect();
    let mut out = ArrayD::<u32>::zeros(values.raw_dim());
    if flat.is_empty() {
        return (out, 0);
    }

    let mut strides = vec![1usize; ndim];
    for axis in (0..ndim.saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    let offsets = preceding_offsets(ndim, connectivity);

    // Provisional label per voxel, 0 for background; parents[0] is unused.
    let mut provisional = vec![0usize; flat.len()];
    let mut parents: Vec<usize> = vec![0];
    let mut coords = vec![0usize; ndim];

    for index in 0..flat.len() {
        let value = flat[index];
        if value != 0 {
            let mut current = 0usize;
            for offset in &offsets {
                let mut neighbor = index as isize;
                let mut inside = true;
                for axis in 0..ndim {
                    let c = coords[axis] as isize + offset[axis];
                    if c < 0 || c >= shape[axis] as isize {
                        inside = false;
                        break;
                    }
                    neighbor += offset[axis] * strides[axis] as isize;
                }
                if !inside {
                    continue;
                }
                let neighbor = neighbor as usize;
                if flat[neighbor] != value {
                    continue;
                }
                let label = provisional[neighbor];
                current = if current == 0 {
                    find_root(&mut parents, label)
                } else {
                    union_labels(&mut parents, current, label)
                };
            }
            if current == 0 {
                current = parents.len();
                parents.push(current);
            }
            provisional[index] = current;
        }

        for axis in (0..ndim).rev() {
            coords[axis] += 1;
            if coords[axis] < shape[axis] {
                break;
            }
            coords[axis] = 0;
        }
    }

    // Roots are the smallest provisional label of their set, and provisional
    // labels grow in raster order, so numbering roots ascending preserves
    // first-appearance order.
    let mut compact = vec![0u32; parents.len()];
    let mut count = 0u32;
    for label in 1..parents.len() {
        let root = find_root(&mut parents, label);
        if root == label {
            count += 1;
            compact[label] = count;
        }
    }

    for (o, &p) in out.iter_mut().zip(provisional.iter()) {
        if p != 0 {
            *o = compact[find_root(&mut parents, p)];
        }
    }
    (out, count)
}

/// Label the foreground of a binary mask.
pub fn connected_components(
    mask: &ArrayViewD<bool>,
    connectivity: Connectivity,
) -> (ArrayD<u32>, u32) {
    let values = mask.mapv(u32::from);
    label_regions(&values.view(), connectivity)
}

/// Sorted distinct non-zero labels.
pub fn unique_labels(labels: &ArrayViewD<u32>) -> Vec<u32> {
    labels
        .iter()
        .copied()
        .filter(|&v| v != 0)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
