use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    allan::IntervalPolicy,
    config::*,
    csv_handler::{
        read_measurement_log, save_logs_to_file, synthetic_log_path, write_measurement_log,
        MeasurementLog,
    },
    data::NoiseParametersRecord,
    logger::{get_data, NOISE_PARAMETERS_LOG},
    noise_estimator::RegionDetection,
    pipeline::{characterize, validate_fit, Characterization, FitValidation},
    signal_generator::SyntheticSensorBuilder,
    visualization::{draw_allan_deviation, draw_time_series, time_series, PlotStyle},
};

mod allan;
mod config;
mod csv_handler;
pub mod data;
mod error;
mod logger;
mod noise_estimator;
mod pipeline;
mod signal_generator;
mod utils;
mod visualization;

/// Noise characterization of a static time of flight distance sensor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Measurement log to characterize; a synthetic record is generated when omitted
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Number of synthetic samples
    #[arg(long, default_value_t = SYNTHETIC_SAMPLES)]
    samples: usize,

    /// Synthetic sampling frequency in Hz
    #[arg(long, default_value_t = DEFAULT_SAMPLING_FREQ)]
    fs: f64,

    /// Synthetic white noise variance R
    #[arg(long, default_value_t = SYNTHETIC_WHITE_NOISE_VARIANCE)]
    white_noise: f64,

    /// Synthetic bias random walk intensity q
    #[arg(long, default_value_t = SYNTHETIC_RANDOM_WALK_INTENSITY)]
    random_walk: f64,

    /// Synthetic signal mean
    #[arg(long, default_value_t = SYNTHETIC_MEAN, allow_negative_numbers = true)]
    mean: f64,

    /// Seed of the random generator, taken from the OS when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Averaging interval policy: linear or exponential
    #[arg(long, default_value_t = IntervalPolicy::Exponential)]
    policy: IntervalPolicy,

    /// Allowed deviation of the log-log slope from -0.5 / +0.5
    #[arg(long, default_value_t = SLOPE_TOLERANCE)]
    slope_tolerance: f64,

    /// Minimum number of curve points in a slope region
    #[arg(long, default_value_t = MIN_REGION_POINTS)]
    min_points: usize,

    /// Output directory for results and plots
    #[arg(short, long, default_value = OUTPUT_PATH)]
    output: PathBuf,

    /// Write the synthetic record as a measurement log into the output directory
    #[arg(long)]
    save_synthetic: bool,

    /// Do not write the result CSV files
    #[arg(long)]
    no_save: bool,

    /// Do not draw plots
    #[arg(long)]
    no_plot: bool,
}

impl Args {
    fn region_detection(&self) -> RegionDetection {
        RegionDetection {
            slope_tolerance: self.slope_tolerance,
            min_points: self.min_points,
        }
    }
}

fn load_measurements(args: &Args, rng: &mut StdRng) -> Result<MeasurementLog> {
    if let Some(path) = &args.log_file {
        let (log, report) = read_measurement_log(path)
            .with_context(|| format!("cannot load measurement log {}", path.display()))?;
        if report.corrupt_lines > 0 {
            warn!(
                corrupt_lines = report.corrupt_lines,
                "corrupt data lines were skipped"
            );
        }
        return Ok(log);
    }

    let measurements = SyntheticSensorBuilder::new(args.fs)
        .with_white_noise(args.white_noise)
        .with_random_walk(args.random_walk)
        .with_mean(args.mean)
        .generate_measurements(args.samples, rng)
        .context("cannot generate synthetic measurements")?;
    info!(
        samples = measurements.len(),
        fs = measurements.fs(),
        r = args.white_noise,
        q = args.random_walk,
        "synthetic record generated"
    );

    let log = MeasurementLog::from_measurements(measurements);
    if args.save_synthetic {
        write_measurement_log(synthetic_log_path(&args.output), &log)
            .context("cannot save synthetic measurement log")?;
    }
    Ok(log)
}

fn format_parameter(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |value| format!("{value:.6e}"))
}

fn report_parameters(channel_names: &[String]) {
    let Some(records) = get_data::<NoiseParametersRecord>(NOISE_PARAMETERS_LOG) else {
        println!("No noise parameters estimated.");
        return;
    };

    for entry in records {
        let date_time: DateTime<Local> = entry.timestamp.into();
        let name = channel_names
            .get(entry.data.channel)
            .map_or("?", String::as_str);
        println!(
            "[{}] channel {name}: R = {} mm^2, q = {} mm^2/s",
            date_time.format("%Y-%m-%d %H:%M:%S"),
            format_parameter(entry.data.r),
            format_parameter(entry.data.q)
        );
    }
}

fn draw_plots(
    output: &Path,
    log: &MeasurementLog,
    characterization: &Characterization,
    validation: &FitValidation,
) {
    for ((channel, estimate), name) in characterization
        .estimates
        .iter()
        .enumerate()
        .zip(&log.channel_names)
    {
        let style = PlotStyle::default().with_title(format!("Allan deviation of channel {name}"));
        let path = output.join(format!("allan_deviation_{channel}.png"));
        if let Err(e) =
            draw_allan_deviation(&path, &characterization.allan, channel, estimate, &style)
        {
            warn!("Cannot draw {}: {e}", path.display());
        }
    }

    let fs = log.measurements.fs();
    let measured = log.measurements.channel_slice(0).unwrap_or_default();
    let simulated = validation.simulated.channel_slice(0).unwrap_or_default();
    let series = [
        time_series("Measured", MEASURED_PLOT_COLOR, measured, fs),
        time_series("Simulated from fit", SIMULATED_PLOT_COLOR, simulated, fs),
    ];
    let path = output.join("time_series.png");
    if let Err(e) = draw_time_series(&path, &series, &PlotStyle::default()) {
        warn!("Cannot draw {}: {e}", path.display());
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tof_calibration=info")),
        )
        .init();

    let args = Args::parse();
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let log = load_measurements(&args, &mut rng)?;
    let characterization = characterize(&log.measurements, args.policy, args.region_detection())
        .context("noise characterization failed")?;
    report_parameters(&log.channel_names);

    let validation = validate_fit(&log.measurements, &characterization, 0, &mut rng)
        .context("fit validation failed")?;
    match validation.rms_log_error {
        Some(error) => info!(
            rms_log_error = error,
            "Allan deviation of the fitted model compared with the measurement"
        ),
        None => warn!("no noise parameter could be fitted, nothing to compare"),
    }

    if !args.no_save {
        save_logs_to_file(&args.output).context("cannot save results")?;
    }
    if !args.no_plot {
        draw_plots(&args.output, &log, &characterization, &validation);
    }

    Ok(())
}
