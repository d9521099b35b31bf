use std::time::Duration;

use nalgebra::DMatrix;
use serde::Serialize;

use crate::{
    error::CharacterizationError,
    utils::{check_sampling_frequency, get_sampling_period, mean},
};

/// Static measurement record: one row per sample, one column per channel,
/// uniformly sampled at `fs` Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurements {
    samples: DMatrix<f64>,
    fs: f64,
}

impl Measurements {
    pub fn new(samples: DMatrix<f64>, fs: f64) -> Result<Self, CharacterizationError> {
        let fs = check_sampling_frequency(fs)?;
        if samples.ncols() == 0 {
            return Err(CharacterizationError::invalid_argument(
                "measurements need at least one channel",
            ));
        }
        Ok(Self { samples, fs })
    }

    pub fn from_samples(samples: Vec<f64>, fs: f64) -> Result<Self, CharacterizationError> {
        let rows = samples.len();
        Self::new(DMatrix::from_vec(rows, 1, samples), fs)
    }

    pub fn from_channels(channels: &[Vec<f64>], fs: f64) -> Result<Self, CharacterizationError> {
        let Some(first) = channels.first() else {
            return Err(CharacterizationError::invalid_argument(
                "measurements need at least one channel",
            ));
        };
        if channels.iter().any(|channel| channel.len() != first.len()) {
            return Err(CharacterizationError::invalid_argument(
                "all channels must hold the same number of samples",
            ));
        }
        let samples =
            DMatrix::from_fn(first.len(), channels.len(), |row, col| channels[col][row]);
        Self::new(samples, fs)
    }

    pub fn samples(&self) -> &DMatrix<f64> {
        &self.samples
    }

    pub fn channel(&self, channel: usize) -> Option<Vec<f64>> {
        self.channel_slice(channel).map(<[f64]>::to_vec)
    }

    /// Samples of one channel as a contiguous slice (the matrix is column-major).
    pub fn channel_slice(&self, channel: usize) -> Option<&[f64]> {
        let rows = self.len();
        (channel < self.channel_count())
            .then(|| &self.samples.as_slice()[channel * rows..(channel + 1) * rows])
    }

    pub fn channel_mean(&self, channel: usize) -> Option<f64> {
        self.channel_slice(channel)
            .filter(|samples| !samples.is_empty())
            .map(|samples| mean(samples.iter().copied()))
    }

    pub fn fs(&self) -> f64 {
        self.fs
    }

    pub fn len(&self) -> usize {
        self.samples.nrows()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel_count(&self) -> usize {
        self.samples.ncols()
    }

    pub fn duration(&self) -> Duration {
        get_sampling_period(self.fs).mul_f64(self.len() as f64)
    }
}

/// One point of an Allan deviation curve, as exported to CSV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AllanDeviationRecord {
    pub channel: usize,
    pub interval_length: usize,
    pub tau: f64,
    pub variance: f64,
    pub deviation: f64,
}

/// Fitted noise parameters of one channel, as exported to CSV. Empty fields
/// mark parameters whose slope region was not found.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoiseParametersRecord {
    pub channel: usize,
    pub r: Option<f64>,
    pub q: Option<f64>,
    pub white_noise_tau_min: Option<f64>,
    pub white_noise_tau_max: Option<f64>,
    pub random_walk_tau_min: Option<f64>,
    pub random_walk_tau_max: Option<f64>,
}
