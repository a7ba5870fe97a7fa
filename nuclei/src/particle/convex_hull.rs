//! Convex hull of a 2D occupancy mask.
//!
//! The hull is taken over the four corners of every foreground pixel, and
//! its area is measured as the number of pixel centers it covers.

use ndarray::ArrayViewD;

const EPSILON: f64 = 1e-9;

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Counter-clockwise hull vertices (Andrew's monotone chain) of the pixel
/// corners of `mask`. Empty for an empty or non-2D mask.
pub fn convex_hull_points(mask: &ArrayViewD<bool>) -> Vec<(f64, f64)> {
    if mask.ndim() != 2 {
        return Vec::new();
    }
    let mut points: Vec<(f64, f64)> = Vec::new();
    for (index, &value) in mask.indexed_iter() {
        if value {
            let (r, c) = (index[0] as f64, index[1] as f64);
            for (dr, dc) in [(-0.5, -0.5), (-0.5, 0.5), (0.5, -0.5), (0.5, 0.5)] {
                points.push((r + dr, c + dc));
            }
        }
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &points {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in points.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Number of pixels whose center lies inside (or on) the convex hull of
/// the foreground of `mask`.
pub fn convex_hull_area(mask: &ArrayViewD<bool>) -> usize {
    let hull = convex_hull_points(mask);
    if hull.len() < 3 {
        return 0;
    }
    let (rows, cols) = (mask.shape()[0], mask.shape()[1]);
    let mut count = 0;
    for r in 0..rows {
        for c in 0..cols {
            let p = (r as f64, c as f64);
            let inside = (0..hull.len())
                .all(|i| cross(hull[i], hull[(i + 1) % hull.len()], p) >= -EPSILON);
            if inside {
                count += 1;
            }
        }
    }
    count
}
