use std::fmt::Debug;
use std::fs::{create_dir_all, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Local;
use csv::{ReaderBuilder, StringRecord, Trim, Writer, WriterBuilder};
use tracing::{debug, info, warn};

use crate::config::{CORRUPT_LINE_REPORT_PERIOD, CSV_EXTENSION};
use crate::data::{AllanDeviationRecord, Measurements, NoiseParametersRecord};
use crate::error::CharacterizationError;
use crate::logger::{take_data, ALLAN_DEVIATION_LOG, NOISE_PARAMETERS_LOG};

// Metadata rows and the header row preceding the samples
const FS_ROW: &str = "Fs";
const LOGGING_TIME_ROW: &str = "Logging time";
const FIRST_DATA_LINE: usize = 4;

/// Content of a distance sensor log file.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementLog {
    pub measurements: Measurements,
    /// Requested logging duration in seconds.
    pub logging_time: f64,
    pub channel_names: Vec<String>,
}

impl MeasurementLog {
    /// Wraps measurements that did not come from a file: the logging time is
    /// the record duration and channels are named `d`, or `d0`, `d1`, ...
    pub fn from_measurements(measurements: Measurements) -> Self {
        let channel_names = match measurements.channel_count() {
            1 => vec!["d".to_string()],
            count => (0..count).map(|channel| format!("d{channel}")).collect(),
        };
        Self {
            logging_time: measurements.duration().as_secs_f64(),
            measurements,
            channel_names,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogReadReport {
    pub valid_lines: usize,
    /// Data lines skipped because of a wrong column count or a value that is
    /// not a finite number.
    pub corrupt_lines: usize,
}

fn format_error(path: &Path, reason: impl Into<String>) -> CharacterizationError {
    CharacterizationError::InvalidLogFormat {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

fn read_metadata(
    record: Option<csv::Result<StringRecord>>,
    name: &str,
) -> Result<f64, String> {
    let record = record
        .ok_or_else(|| format!("missing '{name}' row"))?
        .map_err(|e| format!("unreadable '{name}' row: {e}"))?;
    let value = record
        .get(1)
        .ok_or_else(|| format!("'{name}' row has no value"))?;
    value
        .parse::<f64>()
        .map_err(|_| format!("'{name}' value '{value}' is not a number"))
}

fn parse_row(record: &StringRecord, channel_count: usize) -> Result<Vec<f64>, String> {
    if record.len() != channel_count {
        return Err(format!(
            "expected {channel_count} value(s), got {}",
            record.len()
        ));
    }
    record
        .iter()
        .map(|field| match field.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(format!("'{field}' is not a finite number")),
        })
        .collect()
}

///
/// Reads a log written by the acquisition tool or by [`write_measurement_log`]:
///
/// Fs,<sampling frequency in Hz>
/// Logging time,<seconds>
/// <channel names>
/// <value>[,<value>...]
///
/// Corrupt data lines are skipped and counted in the returned report.
///
pub fn read_measurement_log(
    path: impl AsRef<Path>,
) -> Result<(MeasurementLog, LogReadReport), CharacterizationError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);
    let mut records = reader.records();

    let fs = read_metadata(records.next(), FS_ROW).map_err(|reason| format_error(path, reason))?;
    if !(fs.is_finite() && fs > 0.0) {
        return Err(format_error(
            path,
            format!("sampling frequency must be positive, got {fs}"),
        ));
    }
    let logging_time = read_metadata(records.next(), LOGGING_TIME_ROW)
        .map_err(|reason| format_error(path, reason))?;

    let channel_names: Vec<String> = match records.next() {
        Some(Ok(header)) => header.iter().map(String::from).collect(),
        Some(Err(e)) => return Err(format_error(path, format!("unreadable header row: {e}"))),
        None => return Err(format_error(path, "missing header row")),
    };

    let mut channels = vec![Vec::new(); channel_names.len()];
    let mut report = LogReadReport::default();
    for (index, record) in records.enumerate() {
        match record
            .map_err(|e| e.to_string())
            .and_then(|record| parse_row(&record, channel_names.len()))
        {
            Ok(values) => {
                report.valid_lines += 1;
                for (channel, value) in channels.iter_mut().zip(values) {
                    channel.push(value);
                }
            }
            Err(reason) => {
                report.corrupt_lines += 1;
                debug!(line = index + FIRST_DATA_LINE, %reason, "skipping corrupt line");
                if report.corrupt_lines % CORRUPT_LINE_REPORT_PERIOD == 0 {
                    warn!(
                        total = report.corrupt_lines,
                        path = %path.display(),
                        "corrupt data lines skipped"
                    );
                }
            }
        }
    }

    if report.valid_lines == 0 {
        return Err(format_error(path, "no valid measurement rows"));
    }
    info!(
        path = %path.display(),
        fs,
        samples = report.valid_lines,
        corrupt = report.corrupt_lines,
        "measurement log read"
    );

    let log = MeasurementLog {
        measurements: Measurements::from_channels(&channels, fs)?,
        logging_time,
        channel_names,
    };
    Ok((log, report))
}

pub fn write_measurement_log(
    path: impl AsRef<Path>,
    log: &MeasurementLog,
) -> Result<(), CharacterizationError> {
    let path = path.as_ref();
    if log.channel_names.len() != log.measurements.channel_count() {
        return Err(CharacterizationError::invalid_argument(format!(
            "{} channel name(s) given for {} channel(s)",
            log.channel_names.len(),
            log.measurements.channel_count()
        )));
    }
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new().flexible(true).from_path(path)?;
    writer.write_record([FS_ROW.to_string(), log.measurements.fs().to_string()])?;
    writer.write_record([LOGGING_TIME_ROW.to_string(), log.logging_time.to_string()])?;
    writer.write_record(&log.channel_names)?;
    for row in log.measurements.samples().row_iter() {
        writer.write_record(row.iter().map(f64::to_string))?;
    }
    writer.flush()?;

    info!(path = %path.display(), samples = log.measurements.len(), "measurement log written");
    Ok(())
}

/// File name of a generated log, stamped with the local time of creation.
pub fn synthetic_log_path(dir: impl AsRef<Path>) -> PathBuf {
    let time_stamp = Local::now().format("%d_%m_%Y_%H_%M");
    dir.as_ref()
        .join(format!("tof_distance_data_{time_stamp}_synthetic.{CSV_EXTENSION}"))
}

/// Drains the records logged under `component_name` into a CSV file, one row
/// per record with a header taken from the record's field names.
fn save_log_to_file<T: serde::Serialize + Send + Clone + Debug + Sync + 'static>(
    path: &Path,
    component_name: &str,
) -> Result<(), CharacterizationError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    let mut writer = Writer::from_writer(file);

    match take_data::<T>(component_name) {
        Some(data) => {
            for entry in data {
                writer.serialize(&entry.data)?;
            }
            writer.flush()?;
        }
        None => warn!("Logged {component_name} data not found"),
    }

    Ok(())
}

#[inline]
fn concat_path(dir: &Path, component_name: &str) -> PathBuf {
    let file_name = component_name.to_lowercase();
    dir.join(format!("{file_name}.{CSV_EXTENSION}"))
}

/// Writes the Allan deviation points and noise parameters recorded so far into
/// `dir`, returning the paths of the written files.
pub fn save_logs_to_file(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, CharacterizationError> {
    let dir = dir.as_ref();

    let allan_path = concat_path(dir, ALLAN_DEVIATION_LOG);
    save_log_to_file::<AllanDeviationRecord>(&allan_path, ALLAN_DEVIATION_LOG)?;
    let parameters_path = concat_path(dir, NOISE_PARAMETERS_LOG);
    save_log_to_file::<NoiseParametersRecord>(&parameters_path, NOISE_PARAMETERS_LOG)?;

    for path in [&allan_path, &parameters_path] {
        info!(path = %path.display(), "results saved");
    }
    Ok(vec![allan_path, parameters_path])
}
