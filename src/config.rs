use plotters::style::RGBColor;
// Here are stored configuration values for the project

// Sampling rate of the VL53L0X continuous mode firmware in Hz
pub const DEFAULT_SAMPLING_FREQ: f64 = 80.0;

// Synthetic signal defaults, used when no log file is given
pub const SYNTHETIC_SAMPLES: usize = 60_000;
pub const SYNTHETIC_WHITE_NOISE_VARIANCE: f64 = 0.001; // mm^2
pub const SYNTHETIC_RANDOM_WALK_INTENSITY: f64 = 0.00001; // mm^2/s
pub const SYNTHETIC_MEAN: f64 = 0.0;

// Allan deviation region detection
pub const SLOPE_TOLERANCE: f64 = 0.1;
pub const MIN_REGION_POINTS: usize = 4;
pub const WHITE_NOISE_SLOPE: f64 = -0.5;
pub const RANDOM_WALK_SLOPE: f64 = 0.5;

// Output
pub const OUTPUT_PATH: &str = "output";
pub const CSV_EXTENSION: &str = "csv";
pub const CORRUPT_LINE_REPORT_PERIOD: usize = 100;

// Visualization parameters
pub const PLOT_WIDTH: u32 = 2000;
pub const PLOT_HEIGHT: u32 = 1000;
pub const PLOT_FONT: &str = "sans-serif";
pub const MEASURED_PLOT_COLOR: RGBColor = RGBColor(31, 119, 180);
pub const WHITE_NOISE_PLOT_COLOR: RGBColor = RGBColor(214, 39, 40);
pub const RANDOM_WALK_PLOT_COLOR: RGBColor = RGBColor(44, 160, 44);
pub const SIMULATED_PLOT_COLOR: RGBColor = RGBColor(255, 127, 14);
