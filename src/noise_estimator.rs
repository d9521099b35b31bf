use crate::{
    config::{MIN_REGION_POINTS, RANDOM_WALK_SLOPE, SLOPE_TOLERANCE, WHITE_NOISE_SLOPE},
    error::CharacterizationError,
    utils::check_sampling_frequency,
};

/// Tuning of the slope region search on the log-log Allan deviation curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionDetection {
    /// Allowed deviation of a local slope from the ideal -0.5 / +0.5.
    pub slope_tolerance: f64,
    /// Minimum number of consecutive curve points forming a region.
    pub min_points: usize,
}

impl Default for RegionDetection {
    fn default() -> Self {
        Self {
            slope_tolerance: SLOPE_TOLERANCE,
            min_points: MIN_REGION_POINTS,
        }
    }
}

impl RegionDetection {
    fn validate(&self) -> Result<(), CharacterizationError> {
        if !(self.slope_tolerance.is_finite() && self.slope_tolerance > 0.0) {
            return Err(CharacterizationError::invalid_argument(format!(
                "slope tolerance must be finite and positive, got {}",
                self.slope_tolerance
            )));
        }
        if self.min_points < 2 {
            return Err(CharacterizationError::invalid_argument(format!(
                "a region needs at least 2 points to be fitted, got min_points = {}",
                self.min_points
            )));
        }
        Ok(())
    }
}

/// Inclusive range of curve point indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlopeRegion {
    pub first: usize,
    pub last: usize,
}

impl SlopeRegion {
    pub fn span(&self) -> usize {
        self.last - self.first
    }

    pub fn point_count(&self) -> usize {
        self.span() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

/// Region used for one parameter and the log-log line fitted through it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionFit {
    pub region: SlopeRegion,
    /// First and last interval duration of the region, in seconds.
    pub tau_range: (f64, f64),
    pub line: LinearFit,
}

/// Noise parameters of the random walk + white noise measurement model
///
/// d_k = p_k + b_k + v_k,  v_k ~ N(0, R)
/// b_k+1 = b_k + w_k,      w_k ~ N(0, q * Ts)
///
/// A parameter is `None` when its slope region was not found on the curve.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseEstimate {
    /// White measurement noise variance [u^2].
    pub r: Option<f64>,
    /// Bias random walk intensity [u^2/s].
    pub q: Option<f64>,
    pub white_noise: Option<RegionFit>,
    pub random_walk: Option<RegionFit>,
}

impl NoiseEstimate {
    /// sigma(tau) = sqrt(R / fs) / sqrt(tau)
    pub fn white_noise_curve(&self, taus: &[f64], fs: f64) -> Option<Vec<f64>> {
        self.r
            .map(|r| taus.iter().map(|tau| (r / fs).sqrt() / tau.sqrt()).collect())
    }

    /// sigma(tau) = sqrt(q / 3) * sqrt(tau)
    pub fn random_walk_curve(&self, taus: &[f64]) -> Option<Vec<f64>> {
        self.q
            .map(|q| taus.iter().map(|tau| (q / 3.0).sqrt() * tau.sqrt()).collect())
    }
}

/// Slopes between adjacent points of a curve, n - 1 values for n points.
pub fn local_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(x, y)| (y[1] - y[0]) / (x[1] - x[0]))
        .collect()
}

///
/// Longest run of consecutive slopes within tolerance of `target_slope`.
/// Slopes a..=b describe points a..=b+1; the run counts only when it covers
/// at least `min_points` points. Equal spans resolve to the earliest run.
///
pub fn find_slope_region(
    slopes: &[f64],
    target_slope: f64,
    detection: &RegionDetection,
) -> Option<SlopeRegion> {
    let mut best: Option<SlopeRegion> = None;
    let mut run_start = None;

    for i in 0..=slopes.len() {
        let matching = slopes
            .get(i)
            .is_some_and(|slope| (slope - target_slope).abs() < detection.slope_tolerance);
        match (matching, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(first)) => {
                let candidate = SlopeRegion { first, last: i };
                if candidate.point_count() >= detection.min_points
                    && best.map_or(true, |best| candidate.span() > best.span())
                {
                    best = Some(candidate);
                }
                run_start = None;
            }
            _ => {}
        }
    }
    best
}

/// Ordinary least squares line through (x, y). `None` for fewer than two
/// points or when all x are equal.
pub fn linear_regression(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;
    let (covariance, variance) = x[..n]
        .iter()
        .zip(&y[..n])
        .fold((0.0, 0.0), |(cov, var), (xi, yi)| {
            (cov + (xi - mean_x) * (yi - mean_y), var + (xi - mean_x).powi(2))
        });
    if variance == 0.0 {
        return None;
    }
    let slope = covariance / variance;
    Some(LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}

///
/// Detects the white noise (-0.5) and random walk (+0.5) regions of an Allan
/// deviation curve and inverts the fitted intercepts:
///
/// log10(sigma) = -0.5 log10(tau) + log10(sqrt(R / fs))  =>  R = fs * 10^(2 b)
/// log10(sigma) = +0.5 log10(tau) + log10(sqrt(q / 3))   =>  q = 3 * 10^(2 b)
///
pub fn estimate_noise_parameters(
    taus: &[f64],
    deviation: &[f64],
    fs: f64,
    detection: &RegionDetection,
) -> Result<NoiseEstimate, CharacterizationError> {
    let fs = check_sampling_frequency(fs)?;
    detection.validate()?;
    if taus.len() != deviation.len() {
        return Err(CharacterizationError::invalid_argument(format!(
            "tau and deviation must have the same length, got {} and {}",
            taus.len(),
            deviation.len()
        )));
    }
    if taus.len() < 2 {
        return Err(CharacterizationError::invalid_argument(
            "an Allan deviation curve needs at least two points",
        ));
    }

    let log_tau: Vec<f64> = taus.iter().map(|tau| tau.log10()).collect();
    let log_deviation: Vec<f64> = deviation.iter().map(|sigma| sigma.log10()).collect();
    let slopes = local_slopes(&log_tau, &log_deviation);

    let fit = |target_slope: f64| {
        find_slope_region(&slopes, target_slope, detection).and_then(|region| {
            let points = region.first..=region.last;
            linear_regression(&log_tau[points.clone()], &log_deviation[points]).map(|line| {
                RegionFit {
                    region,
                    tau_range: (taus[region.first], taus[region.last]),
                    line,
                }
            })
        })
    };

    let white_noise = fit(WHITE_NOISE_SLOPE);
    let random_walk = fit(RANDOM_WALK_SLOPE);

    Ok(NoiseEstimate {
        r: white_noise.map(|white| fs * 10_f64.powf(2.0 * white.line.intercept)),
        q: random_walk.map(|walk| 3.0 * 10_f64.powf(2.0 * walk.line.intercept)),
        white_noise,
        random_walk,
    })
}
