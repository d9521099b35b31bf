use std::{fmt::Display, fs::create_dir_all, ops::Range, path::Path};

use plotters::prelude::*;
use tracing::info;

use crate::{
    allan::AllanVariance,
    config::{
        MEASURED_PLOT_COLOR, PLOT_FONT, PLOT_HEIGHT, PLOT_WIDTH, RANDOM_WALK_PLOT_COLOR,
        WHITE_NOISE_PLOT_COLOR,
    },
    error::CharacterizationError,
    noise_estimator::NoiseEstimate,
};

// Multiplicative margin around log axes, relative margin around linear ones
const LOG_AXIS_MARGIN: f64 = 1.5;
const LINEAR_AXIS_MARGIN: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub font: String,
    pub caption_size: u32,
    pub title: String,
    /// Unit of the measured quantity, used in axis descriptions.
    pub units: String,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: PLOT_WIDTH,
            height: PLOT_HEIGHT,
            font: PLOT_FONT.to_string(),
            caption_size: 30,
            title: "Distance data from ToF sensor".to_string(),
            units: "mm".to_string(),
        }
    }
}

impl PlotStyle {
    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub color: RGBColor,
    pub points: Vec<(f64, f64)>,
}

/// Pairs `x` and `y` for a log-log chart, dropping points that cannot be
/// placed on logarithmic axes.
pub fn loglog_series(label: impl Into<String>, color: RGBColor, x: &[f64], y: &[f64]) -> Series {
    let points = x
        .iter()
        .zip(y)
        .filter(|(&x, &y)| x.is_finite() && y.is_finite() && x > 0.0 && y > 0.0)
        .map(|(&x, &y)| (x, y))
        .collect();
    Series {
        label: label.into(),
        color,
        points,
    }
}

/// Samples placed on a time axis in seconds, starting at zero.
pub fn time_series(label: impl Into<String>, color: RGBColor, samples: &[f64], fs: f64) -> Series {
    Series {
        label: label.into(),
        color,
        points: samples
            .iter()
            .enumerate()
            .map(|(k, &sample)| (k as f64 / fs, sample))
            .collect(),
    }
}

/// Measured Allan deviation of a channel with the fitted white noise and
/// random walk lines, when defined.
pub fn allan_deviation_series(
    allan: &AllanVariance,
    channel: usize,
    estimate: &NoiseEstimate,
) -> Result<Vec<Series>, CharacterizationError> {
    let deviation = allan.channel_deviation(channel).ok_or_else(|| {
        CharacterizationError::invalid_argument(format!("channel {channel} does not exist"))
    })?;
    let taus = allan.taus();

    let mut series = vec![loglog_series("Measured", MEASURED_PLOT_COLOR, taus, &deviation)];
    if let (Some(r), Some(curve)) = (estimate.r, estimate.white_noise_curve(taus, allan.fs())) {
        series.push(loglog_series(
            format!("White noise, R = {r:.3e}"),
            WHITE_NOISE_PLOT_COLOR,
            taus,
            &curve,
        ));
    }
    if let (Some(q), Some(curve)) = (estimate.q, estimate.random_walk_curve(taus)) {
        series.push(loglog_series(
            format!("Random walk, q = {q:.3e}"),
            RANDOM_WALK_PLOT_COLOR,
            taus,
            &curve,
        ));
    }
    Ok(series)
}

fn bounds(series: &[Series], select: fn(&(f64, f64)) -> f64) -> Option<(f64, f64)> {
    series
        .iter()
        .flat_map(|series| series.points.iter().map(select))
        .filter(|value| value.is_finite())
        .fold(None, |bounds, value| match bounds {
            None => Some((value, value)),
            Some((min, max)) => Some((min.min(value), max.max(value))),
        })
}

fn log_axis_range(series: &[Series], select: fn(&(f64, f64)) -> f64) -> Option<Range<f64>> {
    bounds(series, select)
        .filter(|&(min, _)| min > 0.0)
        .map(|(min, max)| min / LOG_AXIS_MARGIN..max * LOG_AXIS_MARGIN)
}

fn linear_axis_range(series: &[Series], select: fn(&(f64, f64)) -> f64) -> Option<Range<f64>> {
    bounds(series, select).map(|(min, max)| {
        let margin = match max - min {
            span if span > 0.0 => span * LINEAR_AXIS_MARGIN,
            _ => (max.abs() * LINEAR_AXIS_MARGIN).max(1.0),
        };
        min - margin..max + margin
    })
}

fn plot_error(error: impl Display) -> CharacterizationError {
    CharacterizationError::Plot(error.to_string())
}

fn prepare_output(path: &Path) -> Result<(), CharacterizationError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(())
}

/// Log-log chart of a channel's Allan deviation and its fitted noise lines.
pub fn draw_allan_deviation(
    path: impl AsRef<Path>,
    allan: &AllanVariance,
    channel: usize,
    estimate: &NoiseEstimate,
    style: &PlotStyle,
) -> Result<(), CharacterizationError> {
    let path = path.as_ref();
    let series = allan_deviation_series(allan, channel, estimate)?;
    let (Some(x_range), Some(y_range)) = (
        log_axis_range(&series, |point| point.0),
        log_axis_range(&series, |point| point.1),
    ) else {
        return Err(plot_error("no positive Allan deviation to plot"));
    };
    prepare_output(path)?;

    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&style.title, (style.font.as_str(), style.caption_size))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(x_range.log_scale(), y_range.log_scale())
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("Interval length [s]")
        .y_desc(format!("Allan deviation [{}]", style.units))
        .draw()
        .map_err(plot_error)?;

    for series in &series {
        let color = series.color;
        chart
            .draw_series(LineSeries::new(series.points.iter().copied(), color))
            .map_err(plot_error)?
            .label(series.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .map_err(plot_error)?;
    root.present().map_err(plot_error)?;

    info!(path = %path.display(), channel, "Allan deviation plot saved");
    Ok(())
}

/// Samples against time, one line per series.
pub fn draw_time_series(
    path: impl AsRef<Path>,
    series: &[Series],
    style: &PlotStyle,
) -> Result<(), CharacterizationError> {
    let path = path.as_ref();
    let (Some(x_range), Some(y_range)) = (
        linear_axis_range(series, |point| point.0),
        linear_axis_range(series, |point| point.1),
    ) else {
        return Err(plot_error("no samples to plot"));
    };
    prepare_output(path)?;

    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&style.title, (style.font.as_str(), style.caption_size))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(x_range, y_range)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("Time [s]")
        .y_desc(format!("Distance data [{}]", style.units))
        .draw()
        .map_err(plot_error)?;

    for series in series {
        let color = series.color;
        chart
            .draw_series(LineSeries::new(series.points.iter().copied(), color))
            .map_err(plot_error)?
            .label(series.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .position(SeriesLabelPosition::LowerRight)
        .draw()
        .map_err(plot_error)?;
    root.present().map_err(plot_error)?;

    info!(path = %path.display(), "time series plot saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        allan::{compute_allan_variance, IntervalPolicy},
        config::SIMULATED_PLOT_COLOR,
        data::Measurements,
    };

    fn allan() -> AllanVariance {
        let samples = (0..64).map(|k| ((k * 37) % 11) as f64).collect();
        let measurements = Measurements::from_samples(samples, 10.0).unwrap();
        compute_allan_variance(&measurements, IntervalPolicy::Exponential).unwrap()
    }

    fn estimate(r: Option<f64>, q: Option<f64>) -> NoiseEstimate {
        NoiseEstimate {
            r,
            q,
            white_noise: None,
            random_walk: None,
        }
    }

    #[test]
    fn loglog_series_drops_points_outside_log_axes() {
        let series = loglog_series(
            "test",
            MEASURED_PLOT_COLOR,
            &[0.0, 1.0, 2.0, 3.0, 4.0],
            &[1.0, 0.0, f64::NAN, 5.0, -1.0],
        );
        assert_eq!(series.points, vec![(3.0, 5.0)]);
        assert_eq!(series.label, "test");
    }

    #[test]
    fn time_series_starts_at_zero_seconds() {
        let series = time_series("d", SIMULATED_PLOT_COLOR, &[5.0, 6.0, 7.0], 4.0);
        assert_eq!(series.points, vec![(0.0, 5.0), (0.25, 6.0), (0.5, 7.0)]);
    }

    #[test]
    fn fitted_lines_follow_defined_parameters() {
        let allan = allan();

        let measured_only = allan_deviation_series(&allan, 0, &estimate(None, None)).unwrap();
        let white_only = allan_deviation_series(&allan, 0, &estimate(Some(0.5), None)).unwrap();
        let both = allan_deviation_series(&allan, 0, &estimate(Some(0.5), Some(0.01))).unwrap();

        assert_eq!(measured_only.len(), 1);
        assert_eq!(white_only.len(), 2);
        assert_eq!(white_only[1].color, WHITE_NOISE_PLOT_COLOR);
        assert!(white_only[1].label.starts_with("White noise"));
        assert_eq!(both.len(), 3);
        assert_eq!(both[2].color, RANDOM_WALK_PLOT_COLOR);
        assert_eq!(both[2].points.len(), allan.len());
    }

    #[test]
    fn white_noise_line_uses_record_sampling_frequency() {
        let allan = allan();
        let series = allan_deviation_series(&allan, 0, &estimate(Some(0.5), None)).unwrap();
        let (tau, sigma) = series[1].points[0];
        approx::assert_relative_eq!(sigma, (0.5 / (10.0 * tau)).sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let result = allan_deviation_series(&allan(), 3, &estimate(None, None));
        assert!(matches!(result, Err(CharacterizationError::InvalidArgument(_))));
    }

    #[test]
    fn log_axis_range_pads_bounds() {
        let series = [
            loglog_series("a", MEASURED_PLOT_COLOR, &[0.1, 1.0], &[2.0, 3.0]),
            loglog_series("b", MEASURED_PLOT_COLOR, &[10.0], &[0.5]),
        ];
        let x = log_axis_range(&series, |point| point.0).unwrap();
        let y = log_axis_range(&series, |point| point.1).unwrap();
        approx::assert_relative_eq!(x.start, 0.1 / LOG_AXIS_MARGIN);
        approx::assert_relative_eq!(x.end, 10.0 * LOG_AXIS_MARGIN);
        approx::assert_relative_eq!(y.start, 0.5 / LOG_AXIS_MARGIN);
        approx::assert_relative_eq!(y.end, 3.0 * LOG_AXIS_MARGIN);
    }

    #[test]
    fn empty_series_have_no_range() {
        let series = [loglog_series("a", MEASURED_PLOT_COLOR, &[], &[])];
        assert_eq!(log_axis_range(&series, |point| point.0), None);
        assert_eq!(linear_axis_range(&series, |point| point.1), None);
    }

    #[test]
    fn constant_samples_get_non_empty_linear_range() {
        let series = [time_series("d", MEASURED_PLOT_COLOR, &[100.0; 4], 1.0)];
        let y = linear_axis_range(&series, |point| point.1).unwrap();
        assert!(y.start < 100.0 && y.end > 100.0);
        let x = linear_axis_range(&series, |point| point.0).unwrap();
        approx::assert_relative_eq!(x.start, -0.15);
        approx::assert_relative_eq!(x.end, 3.15);
    }

    #[test]
    fn default_style_uses_configured_size() {
        let style = PlotStyle::default().with_title("Channel d");
        assert_eq!((style.width, style.height), (PLOT_WIDTH, PLOT_HEIGHT));
        assert_eq!(style.title, "Channel d");
    }
}
