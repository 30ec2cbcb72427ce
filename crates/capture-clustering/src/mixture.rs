//! Two-component Gaussian mixture over interval durations.
//!
//! Plain expectation-maximization on one-dimensional data. Initialization
//! is deterministic, with the components seeded at the sample extremes, so
//! repeated fits over the same durations produce the same split.

use crate::error::{Result, SessionError};

const MAX_ITER: usize = 100;
const TOL: f64 = 1e-6;
/// Variance floor; keeps densities finite when a component collapses onto
/// near-identical samples.
const VAR_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct GaussianMixture {
    weights: [f64; 2],
    means: [f64; 2],
    variances: [f64; 2],
}

impl GaussianMixture {
    pub fn new() -> Self {
        Self {
            weights: [0.5; 2],
            means: [0.0; 2],
            variances: [1.0; 2],
        }
    }

    /// Fitted component means.
    ///
    /// Order follows the internal components, not their magnitude; callers
    /// must derive any larger/smaller mapping from the values themselves.
    pub fn means(&self) -> [f64; 2] {
        self.means
    }

    /// Fit both components to `samples`.
    ///
    /// Fewer than 2 samples cannot support a two-component fit and fail
    /// the batch rather than produce a guessed split.
    pub fn fit(&mut self, samples: &[f64]) -> Result<()> {
        if samples.len() < 2 {
            return Err(SessionError::MixtureUnderflow {
                count: samples.len(),
            });
        }

        let n = samples.len() as f64;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

        self.weights = [0.5, 0.5];
        self.means = [min, max];
        self.variances = [variance.max(VAR_FLOOR); 2];

        let mut previous = f64::NEG_INFINITY;
        for _ in 0..MAX_ITER {
            // E-step: per-sample component responsibilities
            let responsibilities: Vec<[f64; 2]> =
                samples.iter().map(|&s| self.responsibility(s)).collect();

            // M-step: re-estimate weights, means, variances
            for k in 0..2 {
                let total: f64 = responsibilities.iter().map(|r| r[k]).sum::<f64>().max(f64::EPSILON);
                self.weights[k] = total / n;
                self.means[k] = samples
                    .iter()
                    .zip(&responsibilities)
                    .map(|(&s, r)| r[k] * s)
                    .sum::<f64>()
                    / total;
                self.variances[k] = (samples
                    .iter()
                    .zip(&responsibilities)
                    .map(|(&s, r)| r[k] * (s - self.means[k]).powi(2))
                    .sum::<f64>()
                    / total)
                    .max(VAR_FLOOR);
            }

            let log_likelihood: f64 = samples.iter().map(|&s| self.density(s).ln()).sum();
            if (log_likelihood - previous).abs() < TOL {
                break;
            }
            previous = log_likelihood;
        }

        Ok(())
    }

    /// Index of the most probable component for `x` under the fitted model.
    pub fn predict(&self, x: f64) -> usize {
        let [a, b] = self.weighted_densities(x);
        usize::from(b > a)
    }

    fn responsibility(&self, x: f64) -> [f64; 2] {
        let d = self.weighted_densities(x);
        let total = d[0] + d[1];
        if total > 0.0 {
            [d[0] / total, d[1] / total]
        } else {
            [0.5, 0.5]
        }
    }

    fn weighted_densities(&self, x: f64) -> [f64; 2] {
        [0usize, 1].map(|k| self.weights[k] * gaussian(x, self.means[k], self.variances[k]))
    }

    fn density(&self, x: f64) -> f64 {
        let d = self.weighted_densities(x);
        (d[0] + d[1]).max(f64::MIN_POSITIVE)
    }
}

impl Default for GaussianMixture {
    fn default() -> Self {
        Self::new()
    }
}

fn gaussian(x: f64, mean: f64, variance: f64) -> f64 {
    let exponent = -((x - mean).powi(2)) / (2.0 * variance);
    exponent.exp() / (2.0 * std::f64::consts::PI * variance).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underflow_rejected() {
        let mut gmm = GaussianMixture::new();
        assert!(matches!(
            gmm.fit(&[0.5]),
            Err(SessionError::MixtureUnderflow { count: 1 })
        ));
        assert!(matches!(
            gmm.fit(&[]),
            Err(SessionError::MixtureUnderflow { count: 0 })
        ));
    }

    #[test]
    fn test_well_separated_clusters() {
        let samples = [0.1, 0.12, 0.11, 0.9, 0.95, 0.92];
        let mut gmm = GaussianMixture::new();
        gmm.fit(&samples).unwrap();

        let means = gmm.means();
        let (small, large) = if means[0] < means[1] {
            (means[0], means[1])
        } else {
            (means[1], means[0])
        };
        assert!((small - 0.11).abs() < 0.05, "small mean was {small}");
        assert!((large - 0.923).abs() < 0.05, "large mean was {large}");

        // Every sample lands in the component whose mean it sits near
        let large_component = usize::from(means[1] > means[0]);
        for s in [0.9, 0.95, 0.92] {
            assert_eq!(gmm.predict(s), large_component);
        }
        for s in [0.1, 0.12, 0.11] {
            assert_ne!(gmm.predict(s), large_component);
        }
    }

    #[test]
    fn test_two_samples() {
        let mut gmm = GaussianMixture::new();
        gmm.fit(&[0.2, 2.0]).unwrap();

        let means = gmm.means();
        let large_component = usize::from(means[1] > means[0]);
        assert_eq!(gmm.predict(2.0), large_component);
        assert_ne!(gmm.predict(0.2), large_component);
    }

    #[test]
    fn test_identical_samples_stay_finite() {
        let mut gmm = GaussianMixture::new();
        gmm.fit(&[0.5, 0.5, 0.5]).unwrap();

        let means = gmm.means();
        assert!((means[0] - 0.5).abs() < 1e-9);
        assert!((means[1] - 0.5).abs() < 1e-9);
        // Prediction is still defined, just arbitrary between equal components
        assert!(gmm.predict(0.5) < 2);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let samples = [0.3, 1.7, 0.25, 1.9, 0.28];
        let mut a = GaussianMixture::new();
        let mut b = GaussianMixture::new();
        a.fit(&samples).unwrap();
        b.fit(&samples).unwrap();
        assert_eq!(a.means(), b.means());
    }
}
