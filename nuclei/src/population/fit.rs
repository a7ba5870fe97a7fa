//! Cell-cycle distribution fitting.
//!
//! A [`CellCycleFitter`] models a feature distribution (nuclear size or DNA
//! content) and derives the acceptance range around its G1 peak. The
//! bundled [`GaussianMixtureFitter`] first tries a two-component Gaussian
//! mixture, fitted by expectation maximization, and falls back to a single
//! Gaussian when the mixture is degenerate or poorly separated.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianComponent {
    pub weight: f64,
    pub mean: f64,
    pub sigma: f64,
}

impl GaussianComponent {
    fn density(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.sigma;
        self.weight * (-0.5 * z * z).exp() / (self.sigma * (2.0 * PI).sqrt())
    }
}

/// How far down the fallback chain a fit had to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitQuality {
    TwoComponents,
    OneComponent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParameters {
    pub quality: FitQuality,
    /// Sorted by ascending mean.
    pub components: Vec<GaussianComponent>,
}

impl FitParameters {
    /// The lowest-mean component, taken as the G1 peak.
    pub fn peak(&self) -> Option<&GaussianComponent> {
        self.components.first()
    }
}

pub trait CellCycleFitter: Send + Sync {
    /// Fit `values`; `None` when even the fallback is impossible.
    fn fit(&self, values: &[f64]) -> Option<FitParameters>;

    /// Acceptance interval of `k_sigma` around the fitted peak, `None` when
    /// it cannot be derived or selects none of `values`.
    fn range_from_fit(
        &self,
        values: &[f64],
        fit: &FitParameters,
        k_sigma: f64,
    ) -> Option<(f64, f64)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianMixtureFitter {
    pub max_iterations: usize,
    /// Relative log-likelihood change that ends the iteration.
    pub tolerance: f64,
    /// Minimum Ashman's D between the two components.
    pub min_separation: f64,
    /// Minimum mixing weight of either component.
    pub min_weight: f64,
}

impl Default for GaussianMixtureFitter {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-9,
            min_separation: 2.0,
            min_weight: 0.05,
        }
    }
}

fn finite_sorted(values: &[f64]) -> Vec<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_by(f64::total_cmp);
    finite
}

fn mean_and_sigma(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl GaussianMixtureFitter {
    fn fit_mixture(&self, values: &[f64]) -> Option<[GaussianComponent; 2]> {
        let (_, sigma) = mean_and_sigma(values);
        if sigma.is_nan() || sigma <= 0.0 {
            return None;
        }
        let floor = (sigma * 1e-3).powi(2);
        let start_sigma = sigma / 2.0;
        let mut components = [
            GaussianComponent {
                weight: 0.5,
                mean: percentile(values, 0.25),
                sigma: start_sigma,
            },
            GaussianComponent {
                weight: 0.5,
                mean: percentile(values, 0.75),
                sigma: start_sigma,
            },
        ];

        let mut responsibilities = vec![0.0; values.len()];
        let mut previous = f64::NEG_INFINITY;
        for _ in 0..self.max_iterations {
            let mut log_likelihood = 0.0;
            for (r, &x) in responsibilities.iter_mut().zip(values) {
                let p0 = components[0].density(x);
                let p1 = components[1].density(x);
                let total = p0 + p1;
                if total > 0.0 {
                    *r = p0 / total;
                    log_likelihood += total.ln();
                } else {
                    *r = if (x - components[0].mean).abs() <= (x - components[1].mean).abs() {
                        1.0
                    } else {
                        0.0
                    };
                    log_likelihood += f64::MIN_POSITIVE.ln();
                }
            }

            for (k, component) in components.iter_mut().enumerate() {
                let weight_of = |r: f64| if k == 0 { r } else { 1.0 - r };
                let nk: f64 = responsibilities.iter().map(|&r| weight_of(r)).sum();
                if nk <= f64::EPSILON {
                    return None;
                }
                let mean = responsibilities
                    .iter()
                    .zip(values)
                    .map(|(&r, &x)| weight_of(r) * x)
                    .sum::<f64>()
                    / nk;
                let var = responsibilities
                    .iter()
                    .zip(values)
                    .map(|(&r, &x)| weight_of(r) * (x - mean).powi(2))
                    .sum::<f64>()
                    / nk;
                *component = GaussianComponent {
                    weight: nk / values.len() as f64,
                    mean,
                    sigma: var.max(floor).sqrt(),
                };
            }

            if (log_likelihood - previous).abs() <= self.tolerance * log_likelihood.abs() {
                break;
            }
            previous = log_likelihood;
        }

        components.sort_by(|a, b| a.mean.total_cmp(&b.mean));
        Some(components)
    }

    fn is_well_separated(&self, components: &[GaussianComponent; 2]) -> bool {
        let [a, b] = components;
        let all_finite = components
            .iter()
            .all(|c| c.weight.is_finite() && c.mean.is_finite() && c.sigma.is_finite());
        let ashman_d =
            2f64.sqrt() * (a.mean - b.mean).abs() / (a.sigma.powi(2) + b.sigma.powi(2)).sqrt();
        all_finite
            && a.weight >= self.min_weight
            && b.weight >= self.min_weight
            && ashman_d > self.min_separation
    }
}

impl CellCycleFitter for GaussianMixtureFitter {
    fn fit(&self, values: &[f64]) -> Option<FitParameters> {
        let values = finite_sorted(values);
        if values.len() < 2 {
            return None;
        }
        if let Some(components) = self.fit_mixture(&values) {
            if self.is_well_separated(&components) {
                return Some(FitParameters {
                    quality: FitQuality::TwoComponents,
                    components: components.to_vec(),
                });
            }
        }

        let (mean, sigma) = mean_and_sigma(&values);
        (sigma > 0.0 && sigma.is_finite()).then(|| FitParameters {
            quality: FitQuality::OneComponent,
            components: vec![GaussianComponent {
                weight: 1.0,
                mean,
                sigma,
            }],
        })
    }

    fn range_from_fit(
        &self,
        values: &[f64],
        fit: &FitParameters,
        k_sigma: f64,
    ) -> Option<(f64, f64)> {
        let peak = fit.peak()?;
        let positive = |v: f64| v > 0.0;
        if !positive(peak.sigma) || !positive(k_sigma) || !peak.mean.is_finite() {
            return None;
        }
        let range = (peak.mean - k_sigma * peak.sigma, peak.mean + k_sigma * peak.sigma);
        values
            .iter()
            .any(|v| (range.0..=range.1).contains(v))
            .then_some(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn bimodal(seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let low = Normal::new(100.0, 5.0).unwrap();
        let high = Normal::new(200.0, 8.0).unwrap();
        let mut values: Vec<f64> = (0..300).map(|_| low.sample(&mut rng)).collect();
        values.extend((0..150).map(|_| high.sample(&mut rng)));
        values
    }

    #[test]
    fn test_two_components_found() {
        let fit = GaussianMixtureFitter::default().fit(&bimodal(7)).unwrap();
        assert_eq!(fit.quality, FitQuality::TwoComponents);
        let peak = fit.peak().unwrap();
        assert!((peak.mean - 100.0).abs() < 2.0, "{peak:?}");
        assert!((peak.sigma - 5.0).abs() < 1.5, "{peak:?}");
        assert!((peak.weight - 2.0 / 3.0).abs() < 0.05, "{peak:?}");
    }

    #[test]
    fn test_unimodal_falls_back() {
        let mut rng = StdRng::seed_from_u64(3);
        let normal = Normal::new(50.0, 4.0).unwrap();
        let values: Vec<f64> = (0..400).map(|_| normal.sample(&mut rng)).collect();
        let fit = GaussianMixtureFitter::default().fit(&values).unwrap();
        assert_eq!(fit.quality, FitQuality::OneComponent);
        assert!((fit.components[0].mean - 50.0).abs() < 1.0);
    }

    #[test]
    fn test_degenerate_inputs() {
        let fitter = GaussianMixtureFitter::default();
        assert!(fitter.fit(&[]).is_none());
        assert!(fitter.fit(&[1.0]).is_none());
        assert!(fitter.fit(&[3.0, 3.0, 3.0]).is_none());
        assert!(fitter.fit(&[f64::NAN, 2.0]).is_none());
    }

    #[test]
    fn test_range_around_peak() {
        let values = bimodal(11);
        let fitter = GaussianMixtureFitter::default();
        let fit = fitter.fit(&values).unwrap();
        let (lo, hi) = fitter.range_from_fit(&values, &fit, 2.5).unwrap();
        let peak = fit.peak().unwrap();
        assert!((lo - (peak.mean - 2.5 * peak.sigma)).abs() < 1e-9);
        assert!(lo < 100.0 && hi > 100.0 && hi < 200.0);
    }

    #[test]
    fn test_range_unavailable_when_empty() {
        let fit = FitParameters {
            quality: FitQuality::OneComponent,
            components: vec![GaussianComponent {
                weight: 1.0,
                mean: 10.0,
                sigma: 1.0,
            }],
        };
        let fitter = GaussianMixtureFitter::default();
        assert!(fitter.range_from_fit(&[100.0, 200.0], &fit, 2.0).is_none());
        assert!(fitter.range_from_fit(&[10.0], &fit, -1.0).is_none());
    }
}
