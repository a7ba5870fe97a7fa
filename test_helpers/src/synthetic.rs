//! Synthetic stacks and populations for tests and benchmarks.

use ndarray::{Array3, ArrayD, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Voxels within `radius` of `center` (Z, Y, X voxel coordinates).
pub fn ball(shape: (usize, usize, usize), center: [f64; 3], radius: f64) -> Array3<bool> {
    Array3::from_shape_fn(shape, |(z, y, x)| {
        let d2 = (z as f64 - center[0]).powi(2)
            + (y as f64 - center[1]).powi(2)
            + (x as f64 - center[2]).powi(2);
        d2 <= radius * radius
    })
}

/// Voxels in the half-open box `start..end`.
pub fn cuboid(shape: (usize, usize, usize), start: [usize; 3], end: [usize; 3]) -> Array3<bool> {
    Array3::from_shape_fn(shape, |(z, y, x)| {
        (start[0]..end[0]).contains(&z)
            && (start[1]..end[1]).contains(&y)
            && (start[2]..end[2]).contains(&x)
    })
}

/// Paint each mask with its 1-based index; later masks overwrite earlier ones.
pub fn label_stack(masks: &[Array3<bool>]) -> Array3<u32> {
    let shape = masks.first().map(|m| m.dim()).unwrap_or((0, 0, 0));
    let mut labels = Array3::<u32>::zeros(shape);
    for (i, mask) in masks.iter().enumerate() {
        Zip::from(&mut labels).and(mask).for_each(|l, &m| {
            if m {
                *l = i as u32 + 1;
            }
        });
    }
    labels
}

/// Intensities of `foreground` inside `mask` and `background` outside, with
/// additive Gaussian noise of `sigma`, clipped at 0.
pub fn noisy_field(
    mask: &Array3<bool>,
    background: f64,
    foreground: f64,
    sigma: f64,
    seed: u64,
) -> ArrayD<u32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma.max(f64::MIN_POSITIVE)).expect("valid noise sigma");
    mask.mapv(|inside| {
        let level = if inside { foreground } else { background };
        (level + noise.sample(&mut rng)).round().max(0.0) as u32
    })
    .into_dyn()
}

/// `n_low` draws from `N(low.0, low.1)` followed by `n_high` draws from
/// `N(high.0, high.1)`.
pub fn bimodal_population(
    n_low: usize,
    low: (f64, f64),
    n_high: usize,
    high: (f64, f64),
    seed: u64,
) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let low = Normal::new(low.0, low.1).expect("valid low cluster");
    let high = Normal::new(high.0, high.1).expect("valid high cluster");
    let mut values: Vec<f64> = (0..n_low).map(|_| low.sample(&mut rng)).collect();
    values.extend((0..n_high).map(|_| high.sample(&mut rng)));
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ball_is_symmetric() {
        let mask = ball((9, 9, 9), [4.0, 4.0, 4.0], 3.0);
        assert!(mask[[4, 4, 4]]);
        assert!(mask[[4, 4, 7]] && mask[[1, 4, 4]]);
        assert!(!mask[[0, 0, 0]]);
    }

    #[test]
    fn test_label_stack_orders_masks() {
        let a = cuboid((2, 4, 4), [0, 0, 0], [2, 2, 2]);
        let b = cuboid((2, 4, 4), [0, 2, 2], [1, 4, 4]);
        let labels = label_stack(&[a, b]);
        assert_eq!(labels[[0, 0, 0]], 1);
        assert_eq!(labels[[0, 3, 3]], 2);
        assert_eq!(labels.iter().filter(|&&l| l == 2).count(), 4);
    }

    #[test]
    fn test_noisy_field_is_seeded() {
        let mask = cuboid((2, 5, 5), [0, 1, 1], [2, 4, 4]);
        let a = noisy_field(&mask, 10.0, 200.0, 3.0, 42);
        let b = noisy_field(&mask, 10.0, 200.0, 3.0, 42);
        assert_eq!(a, b);
        assert!(a[[0, 2, 2]] > 150 && a[[0, 0, 0]] < 50);
    }

    #[test]
    fn test_bimodal_population_sizes() {
        let values = bimodal_population(100, (100.0, 5.0), 50, (200.0, 5.0), 1);
        assert_eq!(values.len(), 150);
        let low_mean = values[..100].iter().sum::<f64>() / 100.0;
        assert!((low_mean - 100.0).abs() < 2.0);
    }
}
