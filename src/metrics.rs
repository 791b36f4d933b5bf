//! Per-breath quality metrics
//!
//! Flow samples are buffered while an exhale is in progress and reduced to
//! three scores when it completes:
//! - smoothness, from the second derivative of flow
//! - peak flow magnitude
//! - symmetry, the position of the peak within the exhale
//!
//! The engine keeps only the latest completed breath's metrics plus the
//! calibration gate; rolling history belongs to the scoring stage.

use crate::config::MAX_EXHALE_SAMPLES;
use crate::types::{BreathMetrics, BreathRecord};

/// Default number of valid breaths before the calibration gate opens.
pub const DEFAULT_CALIBRATION_BREATHS: u32 = 6;

/// Flow magnitude below which smoothness is not computable.
const SMOOTHNESS_MIN_MEAN_FLOW: f64 = 0.05;

/// Relative mean acceleration at or above which smoothness bottoms out.
const SMOOTHNESS_MAX_REL_ACCEL: f64 = 0.2;

/// Exhale sample buffer plus latest-value metrics cache.
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    samples: Vec<f64>,
    latest: BreathMetrics,
    breath_count: u32,
    calibration_breaths: u32,
    is_calibrating: bool,
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsEngine {
    pub fn new() -> Self {
        Self {
            samples: Vec::with_capacity(MAX_EXHALE_SAMPLES),
            latest: BreathMetrics::default(),
            breath_count: 0,
            calibration_breaths: DEFAULT_CALIBRATION_BREATHS,
            is_calibrating: true,
        }
    }

    /// Latest completed breath's metrics.
    pub fn latest(&self) -> BreathMetrics {
        self.latest
    }

    /// Valid breaths recorded this session.
    pub fn breath_count(&self) -> u32 {
        self.breath_count
    }

    /// True until enough valid breaths have been recorded.
    pub fn calibrating(&self) -> bool {
        self.is_calibrating
    }

    /// Replace the calibration length. Takes effect at the next breath;
    /// an already-open gate does not close.
    pub fn set_calibration_breaths(&mut self, breaths: u32) {
        self.calibration_breaths = breaths;
    }

    /// An exhale began: drop any stale samples.
    pub fn start_exhale(&mut self) {
        self.samples.clear();
    }

    /// Buffer one flow sample from an in-progress exhale. Writes stop at
    /// the cap; the earliest samples win.
    pub fn record_sample(&mut self, flow: f64) {
        if self.samples.len() < MAX_EXHALE_SAMPLES {
            self.samples.push(flow);
        }
    }

    /// A validated breath cycle completed: reduce the buffer and refresh
    /// the metrics cache.
    pub fn observe(&mut self, record: &BreathRecord) {
        self.latest = BreathMetrics {
            exhale_dur: record.exhale_s,
            inhale_dur: record.inhale_s,
            cycle_dur: record.cycle_s(),
            smoothness: compute_smoothness(&self.samples),
            peak_flow: compute_peak_flow(&self.samples),
            symmetry: compute_symmetry(&self.samples),
        };

        self.breath_count += 1;
        if self.breath_count >= self.calibration_breaths {
            self.is_calibrating = false;
        }
    }

    /// Session reset. Configured calibration length is retained.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.latest = BreathMetrics::default();
        self.breath_count = 0;
        self.is_calibrating = true;
    }
}

/// Compute exhale smoothness from buffered flow samples.
///
/// Uses the second difference (acceleration) of the flow: a smooth exhale
/// changes velocity gradually, a jerky one in bursts.
///
/// Formula: `100 - min(0.2, mean|d²flow| / mean|flow|) * 500`, clamped to
/// [0, 100]. Fewer than 7 samples, or near-zero mean flow, score 100:
/// insufficient data is not penalized.
pub fn compute_smoothness(samples: &[f64]) -> u32 {
    if samples.len() < 7 {
        return 100;
    }

    let mean_abs_flow = samples.iter().map(|s| s.abs()).sum::<f64>() / samples.len() as f64;
    if mean_abs_flow < SMOOTHNESS_MIN_MEAN_FLOW {
        return 100;
    }

    let first_diff: Vec<f64> = samples.windows(2).map(|w| w[1] - w[0]).collect();
    let second_diff: Vec<f64> = first_diff.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    if second_diff.is_empty() {
        return 100;
    }

    let mean_accel = second_diff.iter().sum::<f64>() / second_diff.len() as f64;
    let relative_accel = mean_accel / mean_abs_flow;

    let smoothness = 100 - (relative_accel.min(SMOOTHNESS_MAX_REL_ACCEL) * 500.0) as i64;
    smoothness.clamp(0, 100) as u32
}

/// Peak absolute flow magnitude in the buffer; 0 when empty.
pub fn compute_peak_flow(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0, |peak, s| peak.max(s.abs()))
}

/// Locate the flow peak within the exhale.
///
/// Formula: `peak_index / (len - 1) * 100`, so 0 means the peak sits at
/// the start (explosive exhale) and 100 at the end (gradual release).
/// Fewer than 3 samples score 50 (assumed symmetric).
pub fn compute_symmetry(samples: &[f64]) -> u32 {
    if samples.len() < 3 {
        return 50;
    }

    let mut peak_idx = 0;
    let mut peak_mag = 0.0;
    for (i, s) in samples.iter().enumerate() {
        if s.abs() > peak_mag {
            peak_mag = s.abs();
            peak_idx = i;
        }
    }

    let symmetry = (peak_idx as f64 / (samples.len() - 1) as f64 * 100.0) as i64;
    symmetry.clamp(0, 100) as u32
}
