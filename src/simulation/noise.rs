use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Poisson};
use serde::Deserialize;

/// Poisson means above this are sampled from the normal approximation
const NORMAL_APPROXIMATION_LAMBDA: f64 = 1e7;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub seed: Option<u64>,
    /// Leave the expected counts untouched
    pub disabled: bool,
}

impl NoiseConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => rand::make_rng(),
    }
}

/// Replace each expected count with a Poisson draw
pub fn apply_counting_noise(expected: &[f64], config: &NoiseConfig) -> Vec<f64> {
    if config.disabled {
        return expected.to_vec();
    }
    let mut rng = create_rng(config.seed);
    expected
        .iter()
        .map(|&lambda| {
            if !(lambda > 0.0) {
                0.0
            } else if lambda > NORMAL_APPROXIMATION_LAMBDA {
                Normal::new(lambda, lambda.sqrt())
                    .map_or(lambda, |d| d.sample(&mut rng).max(0.0).round())
            } else {
                Poisson::new(lambda).map_or(lambda, |d| d.sample(&mut rng))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_noise_reproducible() {
        let expected = vec![100.0; 256];
        let config = NoiseConfig::default().with_seed(12345);
        let a = apply_counting_noise(&expected, &config);
        let b = apply_counting_noise(&expected, &config);
        assert_eq!(a, b);
        assert_ne!(a, expected);
    }

    #[test]
    fn test_poisson_statistics() {
        let expected = vec![400.0; 20_000];
        let noisy = apply_counting_noise(&expected, &NoiseConfig::default().with_seed(7));
        let mean = noisy.iter().sum::<f64>() / noisy.len() as f64;
        let var = noisy.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / noisy.len() as f64;
        assert!((mean - 400.0).abs() < 1.0, "mean {}", mean);
        assert!((var - 400.0).abs() < 30.0, "variance {}", var);
        assert!(noisy.iter().all(|c| c.fract() == 0.0 && *c >= 0.0));
    }

    #[test]
    fn test_zero_mean_and_disabled() {
        let noisy = apply_counting_noise(&[0.0, -1.0], &NoiseConfig::default());
        assert_eq!(noisy, vec![0.0, 0.0]);
        let config = NoiseConfig {
            disabled: true,
            ..NoiseConfig::default()
        };
        assert_eq!(apply_counting_noise(&[3.5], &config), vec![3.5]);
    }
}
