use std::time::Duration;

use crate::error::CharacterizationError;

pub fn get_sampling_period(fs: f64) -> Duration {
    Duration::from_secs_f64(get_sampling_period_f64(fs))
}

pub fn get_sampling_period_f64(fs: f64) -> f64 {
    1.0 / fs
}

pub fn check_sampling_frequency(fs: f64) -> Result<f64, CharacterizationError> {
    if fs.is_finite() && fs > 0.0 {
        Ok(fs)
    } else {
        Err(CharacterizationError::invalid_argument(format!(
            "sampling frequency must be finite and positive, got {fs}"
        )))
    }
}

pub fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let count = values.len();
    values.sum::<f64>() / count as f64
}
