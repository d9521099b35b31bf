use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{
    data::Measurements,
    error::CharacterizationError,
    noise_estimator::NoiseEstimate,
    utils::{check_sampling_frequency, get_sampling_period_f64},
};

///
/// Static sensor simulator: white measurement noise of variance R on top of
/// a bias random walk driven by continuous intensity q.
///
/// y[k] = b[k] + v[k] + mean, v[k] ~ N(0, R), b[k] = b[k-1] + w[k], w[k] ~ N(0, q/fs)
///
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSensorBuilder {
    fs: f64,
    white_noise_variance: Option<f64>,
    random_walk_intensity: Option<f64>,
    mean: f64,
}

impl SyntheticSensorBuilder {
    pub fn new(fs: f64) -> Self {
        Self {
            fs,
            white_noise_variance: None,
            random_walk_intensity: None,
            mean: 0.0,
        }
    }

    pub fn from_estimate(estimate: &NoiseEstimate, fs: f64) -> Self {
        Self {
            white_noise_variance: estimate.r,
            random_walk_intensity: estimate.q,
            ..Self::new(fs)
        }
    }

    pub fn with_white_noise(self, variance: f64) -> Self {
        Self {
            white_noise_variance: Some(variance),
            ..self
        }
    }

    pub fn with_random_walk(self, intensity: f64) -> Self {
        Self {
            random_walk_intensity: Some(intensity),
            ..self
        }
    }

    pub fn with_mean(self, mean: f64) -> Self {
        Self { mean, ..self }
    }

    pub fn generate<R: Rng + ?Sized>(
        &self,
        sample_count: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>, CharacterizationError> {
        let fs = check_sampling_frequency(self.fs)?;
        let white_noise = gaussian(self.white_noise_variance, "white noise variance")?;
        let random_walk = gaussian(
            self.random_walk_intensity
                .map(|q| q * get_sampling_period_f64(fs)),
            "random walk intensity",
        )?;

        let mut bias = 0.0;
        let mut samples = Vec::with_capacity(sample_count);
        for _ in 0..sample_count {
            if let Some(increment) = &random_walk {
                bias += increment.sample(rng);
            }
            let noise = match &white_noise {
                Some(white_noise) => white_noise.sample(rng),
                None => 0.0,
            };
            samples.push(bias + noise + self.mean);
        }
        Ok(samples)
    }

    pub fn generate_measurements<R: Rng + ?Sized>(
        &self,
        sample_count: usize,
        rng: &mut R,
    ) -> Result<Measurements, CharacterizationError> {
        Measurements::from_samples(self.generate(sample_count, rng)?, self.fs)
    }
}

// NaN is accepted as "not present" so estimates coming from NaN-based tools
// can be fed back unchanged.
fn gaussian(
    variance: Option<f64>,
    name: &str,
) -> Result<Option<Normal<f64>>, CharacterizationError> {
    match variance {
        None => Ok(None),
        Some(variance) if variance.is_nan() => Ok(None),
        Some(variance) if variance < 0.0 || variance.is_infinite() => Err(
            CharacterizationError::invalid_argument(format!(
                "{name} must be finite and non-negative, got {variance}"
            )),
        ),
        Some(variance) => Normal::new(0.0, variance.sqrt())
            .map(Some)
            .map_err(|e| CharacterizationError::invalid_argument(format!("{name}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::*;
    use rand::{rngs::StdRng, SeedableRng};

    const FS: f64 = 80.0;

    fn sample_variance(values: &[f64]) -> f64 {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
    }

    #[test]
    fn given_same_seed_expect_identical_sequences() {
        let builder = SyntheticSensorBuilder::new(FS)
            .with_white_noise(0.001)
            .with_random_walk(0.00001);
        let first = builder.generate(500, &mut StdRng::seed_from_u64(7)).unwrap();
        let second = builder.generate(500, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn given_zero_samples_expect_empty_sequence() {
        let samples = SyntheticSensorBuilder::new(FS)
            .with_white_noise(1.0)
            .generate(0, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn given_no_noise_expect_constant_mean() {
        let samples = SyntheticSensorBuilder::new(FS)
            .with_mean(250.0)
            .generate(10, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert!(samples.iter().all(|&sample| sample == 250.0));
    }

    #[test]
    fn given_nan_parameters_expect_them_to_contribute_nothing() {
        let samples = SyntheticSensorBuilder::new(FS)
            .with_white_noise(f64::NAN)
            .with_random_walk(f64::NAN)
            .with_mean(3.0)
            .generate(10, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert!(samples.iter().all(|&sample| sample == 3.0));
    }

    #[test]
    fn given_negative_variance_expect_invalid_argument() {
        let mut rng = StdRng::seed_from_u64(1);
        let white = SyntheticSensorBuilder::new(FS).with_white_noise(-1.0).generate(10, &mut rng);
        let walk = SyntheticSensorBuilder::new(FS).with_random_walk(-1.0).generate(10, &mut rng);
        assert!(matches!(white, Err(CharacterizationError::InvalidArgument(_))));
        assert!(matches!(walk, Err(CharacterizationError::InvalidArgument(_))));
    }

    #[test]
    fn given_non_positive_frequency_expect_invalid_argument() {
        let result = SyntheticSensorBuilder::new(0.0)
            .with_white_noise(1.0)
            .generate(10, &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(CharacterizationError::InvalidArgument(_))));
    }

    #[test]
    fn white_noise_has_requested_variance_around_mean() {
        let variance = 0.5;
        let samples = SyntheticSensorBuilder::new(FS)
            .with_white_noise(variance)
            .with_mean(100.0)
            .generate(100_000, &mut StdRng::seed_from_u64(11))
            .unwrap();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        approx::assert_abs_diff_eq!(mean, 100.0, epsilon = 0.02);
        assert_lt!((sample_variance(&samples) - variance).abs() / variance, 0.03);
    }

    #[test]
    fn random_walk_increments_have_variance_q_over_fs() {
        let intensity = 0.2;
        let samples = SyntheticSensorBuilder::new(FS)
            .with_random_walk(intensity)
            .generate(100_000, &mut StdRng::seed_from_u64(12))
            .unwrap();
        let increments: Vec<f64> = samples.windows(2).map(|w| w[1] - w[0]).collect();
        let expected = intensity / FS;
        assert_lt!(
            (sample_variance(&increments) - expected).abs() / expected,
            0.03
        );
    }

    #[test]
    fn from_estimate_takes_fitted_parameters() {
        let estimate = NoiseEstimate {
            r: Some(0.25),
            q: None,
            white_noise: None,
            random_walk: None,
        };
        let builder = SyntheticSensorBuilder::from_estimate(&estimate, FS);
        assert_eq!(builder, SyntheticSensorBuilder::new(FS).with_white_noise(0.25));
    }

    #[test]
    fn generated_measurements_keep_sampling_frequency() {
        let measurements = SyntheticSensorBuilder::new(FS)
            .with_white_noise(1.0)
            .generate_measurements(32, &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert_eq!(measurements.len(), 32);
        assert_eq!(measurements.fs(), FS);
    }
}
