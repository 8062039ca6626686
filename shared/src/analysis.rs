//! Ride analysis over recorded session files
//!
//! Summarises a drive from its decoded rows: speed statistics in km/h,
//! lateral/longitudinal acceleration spread, time spent stopped, and how
//! abruptly speed changes. Signals are smoothed with a quadratic
//! Savitzky-Golay filter before the statistics are taken.

use serde::Serialize;
use thiserror::Error;

use crate::codec::CsvRow;

/// Smoothing window length in rows (odd)
pub const SMOOTHING_WINDOW: usize = 15;

/// Row lag used for the speed variation metric
pub const SPEED_VARIATION_LAG: usize = 5;

/// Default segment duration for per-segment summaries
pub const DEFAULT_SEGMENT_SECS: u64 = 180;

const MPS_TO_KMH: f64 = 3.6;

/// Header of the summary CSV
pub const SUMMARY_HEADER: &str =
    "File,Mean speed (km/h),Max speed (km/h),Std X (m/s2),Std Y (m/s2),Stop time (%),Speed variation";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Need at least {needed} rows to analyze, found {found}")]
    TooFewRows { needed: usize, found: usize },

    #[error("Segment length must be at least one row")]
    EmptySegment,
}

/// Statistics for a whole file or one segment of it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RideSummary {
    pub name: String,
    /// Index of the segment within the file, `None` for a whole-file summary
    pub segment: Option<usize>,
    pub mean_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub std_accel_x: f64,
    pub std_accel_y: f64,
    pub stop_time_percent: f64,
    pub mean_speed_variation: f64,
}

impl RideSummary {
    /// Format as one line of the summary CSV (no trailing newline)
    pub fn to_csv_line(&self) -> String {
        let name = if self.name.contains([',', '"']) {
            format!("\"{}\"", self.name.replace('"', "\"\""))
        } else {
            self.name.clone()
        };
        format!(
            "{},{},{},{},{},{},{}",
            name,
            self.mean_speed_kmh,
            self.max_speed_kmh,
            self.std_accel_x,
            self.std_accel_y,
            self.stop_time_percent,
            self.mean_speed_variation,
        )
    }
}

/// Number of rows covering `segment_secs` at the given sampling interval,
/// 0 when the interval is 0 or the duration overflows
pub fn rows_per_segment(segment_secs: u64, sample_interval_ms: u64) -> usize {
    if sample_interval_ms == 0 {
        return 0;
    }
    segment_secs
        .checked_mul(1000)
        .and_then(|ms| usize::try_from(ms / sample_interval_ms).ok())
        .unwrap_or(0)
}

/// Summarise a complete set of rows
pub fn analyze_rows(name: &str, rows: &[CsvRow]) -> Result<RideSummary, AnalysisError> {
    let speed_kmh: Vec<f64> = rows.iter().map(|r| r.speed * MPS_TO_KMH).collect();
    let accel_x: Vec<f64> = rows.iter().map(|r| r.accel_x).collect();
    let accel_y: Vec<f64> = rows.iter().map(|r| r.accel_y).collect();

    let accel_x = smooth(&accel_x)?;
    let accel_y = smooth(&accel_y)?;
    let speed = smooth(&speed_kmh)?;

    let stopped = speed.iter().filter(|v| **v == 0.0).count();

    Ok(RideSummary {
        name: name.to_string(),
        segment: None,
        mean_speed_kmh: mean(&speed),
        max_speed_kmh: speed.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        std_accel_x: std_dev(&accel_x),
        std_accel_y: std_dev(&accel_y),
        stop_time_percent: stopped as f64 / speed.len() as f64 * 100.0,
        mean_speed_variation: mean_lagged_variation(&speed, SPEED_VARIATION_LAG),
    })
}

/// Summarise consecutive, non-overlapping segments. A trailing partial
/// segment is discarded.
pub fn analyze_segments(
    name: &str,
    rows: &[CsvRow],
    rows_per_segment: usize,
) -> Result<Vec<RideSummary>, AnalysisError> {
    if rows_per_segment == 0 {
        return Err(AnalysisError::EmptySegment);
    }

    rows.chunks_exact(rows_per_segment)
        .enumerate()
        .map(|(index, chunk)| {
            let mut summary = analyze_rows(name, chunk)?;
            summary.segment = Some(index);
            Ok(summary)
        })
        .collect()
}

/// Quadratic Savitzky-Golay smoothing over [`SMOOTHING_WINDOW`] rows.
///
/// Interior points take the value of a least-squares parabola centred on
/// them; the first and last half-window are evaluated on the parabola
/// fitted to the first and last full window.
pub fn smooth(values: &[f64]) -> Result<Vec<f64>, AnalysisError> {
    let n = values.len();
    let window = SMOOTHING_WINDOW;
    let half = window / 2;

    if n < window {
        return Err(AnalysisError::TooFewRows {
            needed: window,
            found: n,
        });
    }

    let smoothed = (0..n)
        .map(|i| {
            let start = i.saturating_sub(half).min(n - window);
            let offset = i as f64 - (start + half) as f64;
            QuadraticFit::new(&values[start..start + window]).at(offset)
        })
        .collect();

    Ok(smoothed)
}

/// Least-squares parabola `a + b*t + c*t²` over a window centred on t = 0
struct QuadraticFit {
    a: f64,
    b: f64,
    c: f64,
}

impl QuadraticFit {
    fn new(window: &[f64]) -> Self {
        let half = (window.len() / 2) as f64;
        let (mut s0, mut s2, mut s4) = (0.0, 0.0, 0.0);
        let (mut sy, mut sty, mut st2y) = (0.0, 0.0, 0.0);

        for (j, y) in window.iter().enumerate() {
            let t = j as f64 - half;
            let t2 = t * t;
            s0 += 1.0;
            s2 += t2;
            s4 += t2 * t2;
            sy += y;
            sty += t * y;
            st2y += t2 * y;
        }

        // Odd moments vanish on a centred window
        let det = s0 * s4 - s2 * s2;
        Self {
            a: (sy * s4 - s2 * st2y) / det,
            b: sty / s2,
            c: (s0 * st2y - s2 * sy) / det,
        }
    }

    fn at(&self, t: f64) -> f64 {
        self.a + self.b * t + self.c * t * t
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Mean of `|v[i] - v[i - lag]|`, with the first `lag` differences taken as 0
fn mean_lagged_variation(values: &[f64], lag: usize) -> f64 {
    let total: f64 = values
        .iter()
        .skip(lag)
        .zip(values.iter())
        .map(|(current, previous)| (current - previous).abs())
        .sum();
    total / values.len() as f64
}
