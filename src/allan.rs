use std::{fmt, iter::successors, str::FromStr};

use nalgebra::DMatrix;

use crate::{data::Measurements, error::CharacterizationError};

/// Shortest sequence that still forms two windows of the shortest interval.
pub const MIN_SAMPLES: usize = 4;

/// How averaging interval lengths are chosen between 2 samples and N/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntervalPolicy {
    /// Every interval length 2, 3, ..., N/2.
    Linear,
    /// Powers of two 2, 4, ..., up to N/2.
    #[default]
    Exponential,
}

impl IntervalPolicy {
    /// Interval lengths in samples, strictly increasing and never above
    /// `floor(sample_count / 2)`, so every length forms at least two windows.
    pub fn interval_lengths(self, sample_count: usize) -> Vec<usize> {
        let max_length = sample_count / 2;
        match self {
            IntervalPolicy::Linear => (2..=max_length).collect(),
            IntervalPolicy::Exponential => successors(Some(2_usize), |m| m.checked_mul(2))
                .take_while(|&m| m <= max_length)
                .collect(),
        }
    }
}

impl FromStr for IntervalPolicy {
    type Err = CharacterizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(IntervalPolicy::Linear),
            "exponential" => Ok(IntervalPolicy::Exponential),
            other => Err(CharacterizationError::invalid_argument(format!(
                "interval policy must be either 'linear' or 'exponential', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for IntervalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalPolicy::Linear => write!(f, "linear"),
            IntervalPolicy::Exponential => write!(f, "exponential"),
        }
    }
}

/// Allan variance of every channel over a set of averaging intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct AllanVariance {
    interval_lengths: Vec<usize>,
    taus: Vec<f64>,
    fs: f64,
    // rows: intervals, columns: channels
    variance: DMatrix<f64>,
}

impl AllanVariance {
    pub fn interval_lengths(&self) -> &[usize] {
        &self.interval_lengths
    }

    /// Interval durations in seconds.
    pub fn taus(&self) -> &[f64] {
        &self.taus
    }

    /// Sampling frequency of the analysed record.
    pub fn fs(&self) -> f64 {
        self.fs
    }

    pub fn variance(&self) -> &DMatrix<f64> {
        &self.variance
    }

    pub fn deviation(&self) -> DMatrix<f64> {
        self.variance.map(f64::sqrt)
    }

    pub fn channel_variance(&self, channel: usize) -> Option<Vec<f64>> {
        (channel < self.channel_count())
            .then(|| self.variance.column(channel).iter().copied().collect())
    }

    pub fn channel_deviation(&self, channel: usize) -> Option<Vec<f64>> {
        self.channel_variance(channel)
            .map(|variance| variance.into_iter().map(f64::sqrt).collect())
    }

    pub fn channel_count(&self) -> usize {
        self.variance.ncols()
    }

    pub fn len(&self) -> usize {
        self.taus.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.taus.is_empty()
    }
}

///
/// Non-overlapping Allan variance: for every interval length m the channel is
/// cut into floor(N/m) windows (trailing samples dropped), and the variance is
/// half the mean squared difference of consecutive window means.
///
pub fn compute_allan_variance(
    measurements: &Measurements,
    policy: IntervalPolicy,
) -> Result<AllanVariance, CharacterizationError> {
    let sample_count = measurements.len();
    if sample_count < MIN_SAMPLES {
        return Err(CharacterizationError::invalid_argument(format!(
            "at least {MIN_SAMPLES} samples are needed to form an averaging interval, got {sample_count}"
        )));
    }

    let interval_lengths = policy.interval_lengths(sample_count);
    let channels: Vec<&[f64]> = (0..measurements.channel_count())
        .filter_map(|channel| measurements.channel_slice(channel))
        .collect();
    let variance = DMatrix::from_fn(interval_lengths.len(), channels.len(), |row, col| {
        allan_variance_at(channels[col], interval_lengths[row])
    });
    let taus = interval_lengths
        .iter()
        .map(|&m| m as f64 / measurements.fs())
        .collect();

    Ok(AllanVariance {
        interval_lengths,
        taus,
        fs: measurements.fs(),
        variance,
    })
}

fn allan_variance_at(samples: &[f64], interval_length: usize) -> f64 {
    let window_means: Vec<f64> = samples
        .chunks_exact(interval_length)
        .map(|window| window.iter().sum::<f64>() / interval_length as f64)
        .collect();
    let squared_differences: f64 = window_means
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).powi(2))
        .sum();
    0.5 * squared_differences / (window_means.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal_generator::SyntheticSensorBuilder;
    use assertables::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn measurements(samples: Vec<f64>, fs: f64) -> Measurements {
        Measurements::from_samples(samples, fs).unwrap()
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("linear".parse::<IntervalPolicy>().unwrap(), IntervalPolicy::Linear);
        assert_eq!(
            " Exponential ".parse::<IntervalPolicy>().unwrap(),
            IntervalPolicy::Exponential
        );
    }

    #[test]
    fn unknown_policy_is_invalid_argument() {
        let result = "logarithmic".parse::<IntervalPolicy>();
        assert!(matches!(result, Err(CharacterizationError::InvalidArgument(_))));
    }

    #[test]
    fn policy_display_round_trips_through_parse() {
        for policy in [IntervalPolicy::Linear, IntervalPolicy::Exponential] {
            assert_eq!(policy.to_string().parse::<IntervalPolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn linear_policy_includes_half_length() {
        assert_eq!(IntervalPolicy::Linear.interval_lengths(20), (2..=10).collect::<Vec<_>>());
        assert_eq!(IntervalPolicy::Linear.interval_lengths(21), (2..=10).collect::<Vec<_>>());
    }

    #[test]
    fn exponential_policy_stops_at_largest_power_of_two_within_half_length() {
        assert_eq!(IntervalPolicy::Exponential.interval_lengths(20), vec![2, 4, 8]);
        assert_eq!(IntervalPolicy::Exponential.interval_lengths(64), vec![2, 4, 8, 16, 32]);
    }

    #[test]
    fn too_short_sequences_produce_no_intervals() {
        assert!(IntervalPolicy::Linear.interval_lengths(3).is_empty());
        assert!(IntervalPolicy::Exponential.interval_lengths(3).is_empty());
    }

    #[test]
    fn four_samples_linear_yield_exactly_one_interval() {
        let avar = compute_allan_variance(
            &measurements(vec![1.0, 3.0, 5.0, 7.0], 2.0),
            IntervalPolicy::Linear,
        )
        .unwrap();
        assert_eq!(avar.interval_lengths(), &[2]);
        assert_eq!(avar.taus(), &[1.0]);
        assert_eq!(avar.fs(), 2.0);
        // window means 2 and 6
        approx::assert_abs_diff_eq!(avar.variance()[(0, 0)], 8.0);
    }

    #[test]
    fn three_samples_are_rejected() {
        for policy in [IntervalPolicy::Linear, IntervalPolicy::Exponential] {
            let result = compute_allan_variance(&measurements(vec![1.0, 2.0, 3.0], 1.0), policy);
            assert!(matches!(result, Err(CharacterizationError::InvalidArgument(_))));
        }
    }

    #[test]
    fn trailing_samples_beyond_last_window_are_ignored() {
        let with_tail = compute_allan_variance(
            &measurements(vec![0.0, 0.0, 0.0, 3.0, 3.0, 3.0, 1000.0], 1.0),
            IntervalPolicy::Linear,
        )
        .unwrap();
        let position = with_tail.interval_lengths().iter().position(|&m| m == 3).unwrap();
        approx::assert_abs_diff_eq!(with_tail.variance()[(position, 0)], 4.5);
    }

    #[test]
    fn constant_signal_has_zero_variance() {
        let constant = measurements(vec![42.0; 64], 10.0);
        let avar = compute_allan_variance(&constant, IntervalPolicy::Linear).unwrap();
        assert!(avar.variance().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn variance_is_non_negative_for_random_input() {
        let samples = SyntheticSensorBuilder::new(50.0)
            .with_white_noise(2.0)
            .with_random_walk(0.3)
            .with_mean(-10.0)
            .generate(1_000, &mut StdRng::seed_from_u64(5))
            .unwrap();
        for policy in [IntervalPolicy::Linear, IntervalPolicy::Exponential] {
            let avar =
                compute_allan_variance(&measurements(samples.clone(), 50.0), policy).unwrap();
            assert!(avar.variance().iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn taus_are_strictly_increasing_for_both_policies() {
        let data = measurements(vec![0.5; 1_000], 80.0);
        for policy in [IntervalPolicy::Linear, IntervalPolicy::Exponential] {
            let avar = compute_allan_variance(&data, policy).unwrap();
            assert!(!avar.is_empty());
            assert!(avar.taus().windows(2).all(|pair| pair[0] < pair[1]));
            assert!(avar.interval_lengths().windows(2).all(|pair| pair[0] < pair[1]));
            approx::assert_abs_diff_eq!(
                avar.taus()[0],
                avar.interval_lengths()[0] as f64 / 80.0
            );
        }
    }

    #[test]
    fn channels_are_processed_independently() {
        let first: Vec<f64> = (0..64).map(|i| ((i * 7) % 5) as f64).collect();
        let second: Vec<f64> = first.iter().map(|v| 2.0 * v).collect();
        let data = Measurements::from_channels(&[first, second], 4.0).unwrap();
        let avar = compute_allan_variance(&data, IntervalPolicy::Exponential).unwrap();
        assert_eq!(avar.channel_count(), 2);
        for row in 0..avar.len() {
            approx::assert_relative_eq!(
                avar.variance()[(row, 1)],
                4.0 * avar.variance()[(row, 0)],
                max_relative = 1e-12
            );
        }
        assert_eq!(avar.channel_deviation(2), None);
    }

    #[test]
    fn repeated_computation_gives_identical_results() {
        let samples = SyntheticSensorBuilder::new(80.0)
            .with_white_noise(0.1)
            .with_random_walk(0.01)
            .generate(4_096, &mut StdRng::seed_from_u64(9))
            .unwrap();
        let data = measurements(samples, 80.0);
        let first = compute_allan_variance(&data, IntervalPolicy::Exponential).unwrap();
        let second = compute_allan_variance(&data, IntervalPolicy::Exponential).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn deviation_is_square_root_of_variance() {
        let avar = compute_allan_variance(
            &measurements(vec![1.0, 3.0, 5.0, 7.0], 2.0),
            IntervalPolicy::Exponential,
        )
        .unwrap();
        approx::assert_abs_diff_eq!(avar.deviation()[(0, 0)], 8.0_f64.sqrt());
        assert_eq!(avar.channel_deviation(0), Some(vec![8.0_f64.sqrt()]));
    }

    #[test]
    fn white_noise_deviation_follows_inverse_square_root_of_tau() {
        let (fs, r) = (100.0, 0.01);
        let samples = SyntheticSensorBuilder::new(fs)
            .with_white_noise(r)
            .generate(1 << 16, &mut StdRng::seed_from_u64(21))
            .unwrap();
        let avar = compute_allan_variance(&measurements(samples, fs), IntervalPolicy::Exponential)
            .unwrap();
        let deviation = avar.channel_deviation(0).unwrap();
        for (i, (&m, &tau)) in avar.interval_lengths().iter().zip(avar.taus()).enumerate() {
            if m > 256 {
                break;
            }
            let expected = (r / fs).sqrt() / tau.sqrt();
            assert_lt!((deviation[i] - expected).abs() / expected, 0.15);
        }
    }

    #[test]
    fn random_walk_deviation_follows_square_root_of_tau() {
        let (fs, q) = (100.0, 0.001);
        let samples = SyntheticSensorBuilder::new(fs)
            .with_random_walk(q)
            .generate(1 << 16, &mut StdRng::seed_from_u64(22))
            .unwrap();
        let avar = compute_allan_variance(&measurements(samples, fs), IntervalPolicy::Exponential)
            .unwrap();
        let deviation = avar.channel_deviation(0).unwrap();
        for (i, (&m, &tau)) in avar.interval_lengths().iter().zip(avar.taus()).enumerate() {
            if !(4..=256).contains(&m) {
                continue;
            }
            let expected = (q / 3.0).sqrt() * tau.sqrt();
            assert_lt!((deviation[i] - expected).abs() / expected, 0.2);
        }
    }
}
