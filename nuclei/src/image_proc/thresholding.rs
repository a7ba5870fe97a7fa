//! Global and local thresholding.
//!
//! The global threshold is Otsu's method over a fixed-bin histogram. The local
//! threshold is computed independently for each 2D plane: a neighborhood
//! statistic (median, mean or Gaussian-weighted mean) minus an offset, with a
//! configurable rule for samples beyond the plane edge.

use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, Axis};
use serde::{Deserialize, Serialize};

/// Calculate Otsu's threshold for an image
///
/// Otsu's method picks the histogram cut that maximizes the between-class
/// variance of background and foreground.
///
/// # Arguments
///
/// * `image` - Input intensities, any shape
/// * `bins` - Number of histogram bins (default 256)
///
/// # Returns
///
/// The optimal threshold; foreground is strictly above it. A flat image
/// returns its single value.
pub fn otsu_threshold(image: &ArrayViewD<f64>, bins: Option<usize>) -> f64 {
    let bins = bins.unwrap_or(256).max(2);

    let min_val = image.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max_val = image.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    if !min_val.is_finite() || !max_val.is_finite() {
        return 0.0;
    }
    if (max_val - min_val).abs() < 1e-6 {
        return min_val;
    }

    let mut histogram = vec![0u64; bins];
    let scale = (bins as f64 - 1.0) / (max_val - min_val);
    for &pixel in image.iter() {
        let bin = ((pixel - min_val) * scale).round() as usize;
        histogram[bin.min(bins - 1)] += 1;
    }

    let total_pixels = image.len() as f64;
    let weighted_hist: Vec<f64> = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| (i as f64) * (count as f64))
        .collect();
    let total_mean = weighted_hist.iter().sum::<f64>() / total_pixels;

    let mut cum_sum = 0u64;
    let mut cum_mean = 0.0;
    let mut best_threshold = 0;
    let mut max_variance = 0.0;

    for t in 0..bins - 1 {
        cum_sum += histogram[t];
        cum_mean += weighted_hist[t];

        let w_bg = cum_sum as f64 / total_pixels;
        if w_bg == 0.0 || w_bg == 1.0 {
            continue;
        }
        let w_fg = 1.0 - w_bg;

        let mean_bg = cum_mean / cum_sum as f64;
        let mean_fg = (total_mean * total_pixels - cum_mean) / (total_pixels - cum_sum as f64);

        let variance = w_bg * w_fg * (mean_bg - mean_fg).powi(2);
        if variance > max_variance {
            max_variance = variance;
            best_threshold = t;
        }
    }

    min_val + (best_threshold as f64) / scale
}

/// Binary mask of samples strictly above `threshold`.
pub fn apply_threshold(image: &ArrayViewD<f64>, threshold: f64) -> ArrayD<bool> {
    image.mapv(|v| v > threshold)
}

/// Neighborhood statistic used as the local threshold surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LocalMethod {
    Gaussian,
    Mean,
    #[default]
    Median,
}

/// How samples beyond the plane edge are synthesized.
///
/// For a row `a b c d`:
/// - `Constant(k)`: `k k | a b c d | k k`
/// - `Nearest`: `a a | a b c d | d d`
/// - `Reflect`: `b a | a b c d | d c`
/// - `Mirror`: `c b | a b c d | c b`
/// - `Wrap`: `c d | a b c d | a b`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BoundaryMode {
    Constant(f64),
    Nearest,
    Reflect,
    Mirror,
    Wrap,
}

impl Default for BoundaryMode {
    fn default() -> Self {
        BoundaryMode::Constant(0.0)
    }
}

/// Smallest odd value not below `side`.
pub fn odd_block_size(side: usize) -> usize {
    if side % 2 == 0 {
        side + 1
    } else {
        side
    }
}

/// Source index for padded position `i` along an axis of length `n`.
/// `None` means the constant fill value.
fn source_index(i: isize, n: usize, mode: BoundaryMode) -> Option<usize> {
    let len = n as isize;
    if (0..len).contains(&i) {
        return Some(i as usize);
    }
    match mode {
        BoundaryMode::Constant(_) => None,
        BoundaryMode::Nearest => Some(i.clamp(0, len - 1) as usize),
        BoundaryMode::Reflect => {
            let period = 2 * len;
            let m = i.rem_euclid(period);
            Some(if m < len { m } else { period - 1 - m } as usize)
        }
        BoundaryMode::Mirror => {
            if len == 1 {
                return Some(0);
            }
            let period = 2 * len - 2;
            let m = i.rem_euclid(period);
            Some(if m < len { m } else { period - m } as usize)
        }
        BoundaryMode::Wrap => Some(i.rem_euclid(len) as usize),
    }
}

/// Pad a plane by `radius` on every side.
fn pad_plane(plane: &ArrayView2<f64>, radius: usize, mode: BoundaryMode) -> Array2<f64> {
    let (h, w) = plane.dim();
    let fill = match mode {
        BoundaryMode::Constant(value) => value,
        _ => 0.0,
    };
    let r = radius as isize;
    Array2::from_shape_fn((h + 2 * radius, w + 2 * radius), |(i, j)| {
        match (
            source_index(i as isize - r, h, mode),
            source_index(j as isize - r, w, mode),
        ) {
            (Some(y), Some(x)) => plane[[y, x]],
            _ => fill,
        }
    })
}

fn mean_filter(plane: &ArrayView2<f64>, block: usize, mode: BoundaryMode) -> Array2<f64> {
    let (h, w) = plane.dim();
    let padded = pad_plane(plane, block / 2, mode);
    let (ph, pw) = padded.dim();

    // Summed-area table with a zero border row and column.
    let mut integral = Array2::<f64>::zeros((ph + 1, pw + 1));
    for i in 0..ph {
        let mut row_sum = 0.0;
        for j in 0..pw {
            row_sum += padded[[i, j]];
            integral[[i + 1, j + 1]] = integral[[i, j + 1]] + row_sum;
        }
    }

    let area = (block * block) as f64;
    Array2::from_shape_fn((h, w), |(i, j)| {
        let (y0, x0, y1, x1) = (i, j, i + block, j + block);
        (integral[[y1, x1]] - integral[[y0, x1]] - integral[[y1, x0]] + integral[[y0, x0]])
            / area
    })
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as usize;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|k| {
            let d = k as f64 - radius as f64;
            (-0.5 * d * d / (sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= total);
    kernel
}

fn gaussian_filter(plane: &ArrayView2<f64>, block: usize, mode: BoundaryMode) -> Array2<f64> {
    let sigma = (block as f64 - 1.0) / 6.0;
    if sigma <= 0.0 {
        return plane.to_owned();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let (h, w) = plane.dim();
    let padded = pad_plane(plane, radius, mode);

    let horizontal = Array2::from_shape_fn((h + 2 * radius, w), |(i, j)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, weight)| weight * padded[[i, j + k]])
            .sum::<f64>()
    });
    Array2::from_shape_fn((h, w), |(i, j)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, weight)| weight * horizontal[[i + k, j]])
            .sum::<f64>()
    })
}

/// Sliding-histogram median over rank-compressed samples.
fn median_filter(plane: &ArrayView2<f64>, block: usize, mode: BoundaryMode) -> Array2<f64> {
    let (h, w) = plane.dim();
    let padded = pad_plane(plane, block / 2, mode);

    let mut levels: Vec<f64> = padded.iter().copied().collect();
    levels.sort_by(f64::total_cmp);
    levels.dedup();
    let ranks = padded.mapv(|v| levels.partition_point(|l| l.total_cmp(&v).is_lt()));

    let half = block * block / 2;
    let mut histogram = vec![0usize; levels.len()];
    let mut out = Array2::<f64>::zeros((h, w));

    for i in 0..h {
        histogram.fill(0);
        for di in 0..block {
            for dj in 0..block {
                histogram[ranks[[i + di, dj]]] += 1;
            }
        }
        let mut median = 0usize;
        let mut below = 0usize;
        settle_median(&histogram, &mut median, &mut below, half);
        out[[i, 0]] = levels[median];

        for j in 1..w {
            for di in 0..block {
                let leaving = ranks[[i + di, j - 1]];
                histogram[leaving] -= 1;
                if leaving < median {
                    below -= 1;
                }
                let entering = ranks[[i + di, j + block - 1]];
                histogram[entering] += 1;
                if entering < median {
                    below += 1;
                }
            }
            settle_median(&histogram, &mut median, &mut below, half);
            out[[i, j]] = levels[median];
        }
    }
    out
}

/// Move `median` until `below <= half < below + histogram[median]`.
fn settle_median(histogram: &[usize], median: &mut usize, below: &mut usize, half: usize) {
    while *below > half {
        *median -= 1;
        *below -= histogram[*median];
    }
    while *below + histogram[*median] <= half {
        *below += histogram[*median];
        *median += 1;
    }
}

/// Local threshold surface of a single plane.
///
/// An even `block_size` is bumped to the next odd value.
pub fn threshold_local(
    plane: &ArrayView2<f64>,
    block_size: usize,
    method: LocalMethod,
    mode: BoundaryMode,
    offset: f64,
) -> Array2<f64> {
    let block = odd_block_size(block_size.max(1));
    let filtered = match method {
        LocalMethod::Mean => mean_filter(plane, block, mode),
        LocalMethod::Gaussian => gaussian_filter(plane, block, mode),
        LocalMethod::Median => median_filter(plane, block, mode),
    };
    filtered - offset
}

/// Per-plane local threshold mask; foreground is at or above the surface.
///
/// Works on 2D images and on 3D images plane by plane along the first axis.
/// Returns `None` for any other rank.
pub fn local_threshold_mask(
    image: &ArrayViewD<f64>,
    block_size: usize,
    method: LocalMethod,
    mode: BoundaryMode,
    offset: f64,
) -> Option<ArrayD<bool>> {
    let plane_mask = |plane: ArrayView2<f64>| {
        let surface = threshold_local(&plane, block_size, method, mode, offset);
        ndarray::Zip::from(&plane)
            .and(&surface)
            .map_collect(|&v, &t| v >= t)
    };

    match image.ndim() {
        2 => {
            let plane = image.view().into_dimensionality::<ndarray::Ix2>().ok()?;
            Some(plane_mask(plane).into_dyn())
        }
        3 => {
            let stack = image.view().into_dimensionality::<ndarray::Ix3>().ok()?;
            let mut mask = ndarray::Array3::from_elem(stack.raw_dim(), false);
            for (plane, mut out) in stack
                .axis_iter(Axis(0))
                .zip(mask.axis_iter_mut(Axis(0)))
            {
                out.assign(&plane_mask(plane));
            }
            Some(mask.into_dyn())
        }
        _ => None,
    }
}
