use rand::Rng;
use tracing::{debug, info, warn};

use crate::{
    allan::{compute_allan_variance, AllanVariance, IntervalPolicy},
    data::{AllanDeviationRecord, Measurements, NoiseParametersRecord},
    error::CharacterizationError,
    logger::{self, ALLAN_DEVIATION_LOG, NOISE_PARAMETERS_LOG},
    noise_estimator::{estimate_noise_parameters, NoiseEstimate, RegionDetection},
    signal_generator::SyntheticSensorBuilder,
};

/// Allan variance of a record together with the noise parameters fitted on
/// every channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Characterization {
    pub policy: IntervalPolicy,
    pub allan: AllanVariance,
    pub estimates: Vec<NoiseEstimate>,
}

/// Comparison of a measured channel against a sequence re-simulated from its
/// fitted parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FitValidation {
    pub simulated: Measurements,
    pub simulated_deviation: Vec<f64>,
    /// RMS of log10(simulated / measured deviation) over the intervals where
    /// both are positive; `None` when there is no such interval.
    pub rms_log_error: Option<f64>,
}

///
/// Allan variance and noise parameters of every channel of a record.
///
/// Every call appends the Allan deviation points and the fitted parameters to
/// the process-wide `ALLAN_DEVIATION` and `NOISE_PARAMETERS` logs. They grow
/// until drained by `csv_handler::save_logs_to_file` or `logger::take_data`.
///
pub fn characterize(
    measurements: &Measurements,
    policy: IntervalPolicy,
    detection: RegionDetection,
) -> Result<Characterization, CharacterizationError> {
    let allan = compute_allan_variance(measurements, policy)?;
    info!(
        samples = measurements.len(),
        channels = measurements.channel_count(),
        intervals = allan.len(),
        %policy,
        "Allan variance computed"
    );

    let deviation = allan.deviation();
    let estimates = deviation
        .column_iter()
        .enumerate()
        .map(|(channel, column)| {
            let column: Vec<f64> = column.iter().copied().collect();
            let estimate =
                estimate_noise_parameters(allan.taus(), &column, measurements.fs(), &detection)?;
            record_results(channel, &allan, &estimate);
            Ok(estimate)
        })
        .collect::<Result<Vec<_>, CharacterizationError>>()?;

    Ok(Characterization {
        policy,
        allan,
        estimates,
    })
}

fn record_results(channel: usize, allan: &AllanVariance, estimate: &NoiseEstimate) {
    for ((&interval_length, &tau), &variance) in allan
        .interval_lengths()
        .iter()
        .zip(allan.taus())
        .zip(allan.variance().column(channel).iter())
    {
        logger::log(
            ALLAN_DEVIATION_LOG,
            AllanDeviationRecord {
                channel,
                interval_length,
                tau,
                variance,
                deviation: variance.sqrt(),
            },
        );
    }

    match estimate.white_noise {
        Some(white) => debug!(
            channel,
            first = white.region.first,
            last = white.region.last,
            slope = white.line.slope,
            "white noise region found"
        ),
        None => warn!(channel, "no white noise region found, R is undefined"),
    }
    match estimate.random_walk {
        Some(walk) => debug!(
            channel,
            first = walk.region.first,
            last = walk.region.last,
            slope = walk.line.slope,
            "random walk region found"
        ),
        None => warn!(channel, "no random walk region found, q is undefined"),
    }
    info!(channel, r = ?estimate.r, q = ?estimate.q, "noise parameters estimated");

    logger::log(
        NOISE_PARAMETERS_LOG,
        NoiseParametersRecord {
            channel,
            r: estimate.r,
            q: estimate.q,
            white_noise_tau_min: estimate.white_noise.map(|fit| fit.tau_range.0),
            white_noise_tau_max: estimate.white_noise.map(|fit| fit.tau_range.1),
            random_walk_tau_min: estimate.random_walk.map(|fit| fit.tau_range.0),
            random_walk_tau_max: estimate.random_walk.map(|fit| fit.tau_range.1),
        },
    );
}

///
/// Re-simulates one channel from its fitted (R, q) with the same length, rate
/// and mean, and compares the Allan deviation of both on the same intervals.
///
pub fn validate_fit<R: Rng + ?Sized>(
    measurements: &Measurements,
    characterization: &Characterization,
    channel: usize,
    rng: &mut R,
) -> Result<FitValidation, CharacterizationError> {
    let (Some(estimate), Some(measured_deviation), Some(mean)) = (
        characterization.estimates.get(channel),
        characterization.allan.channel_deviation(channel),
        measurements.channel_mean(channel),
    ) else {
        return Err(CharacterizationError::invalid_argument(format!(
            "channel {channel} does not exist, record has {} channel(s)",
            characterization.estimates.len()
        )));
    };

    let simulated = SyntheticSensorBuilder::from_estimate(estimate, measurements.fs())
        .with_mean(mean)
        .generate_measurements(measurements.len(), rng)?;
    let simulated_deviation = compute_allan_variance(&simulated, characterization.policy)?
        .channel_deviation(0)
        .unwrap_or_default();

    let log_errors: Vec<f64> = simulated_deviation
        .iter()
        .zip(&measured_deviation)
        .filter(|(&simulated, &measured)| simulated > 0.0 && measured > 0.0)
        .map(|(simulated, measured)| (simulated / measured).log10())
        .collect();
    let rms_log_error = (!log_errors.is_empty()).then(|| {
        (log_errors.iter().map(|error| error * error).sum::<f64>() / log_errors.len() as f64)
            .sqrt()
    });
    debug!(channel, rms_log_error = ?rms_log_error, "fit validated against simulation");

    Ok(FitValidation {
        simulated,
        simulated_deviation,
        rms_log_error,
    })
}
