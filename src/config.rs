//! Tuning constants and runtime-replaceable parameter sets
//!
//! The fixed constants here are the tuned values for thermistor-based breath
//! sensing and are not meant to be adjusted per user. Per-user adjustment
//! happens through the three replaceable sets:
//! - [`SensitivityPreset`] (indexed 0-9, swaps the flow filter + thresholds)
//! - [`DepthThresholds`] (exhale duration to depth band boundaries)
//! - [`MoodThresholds`] (scoring thresholds and calibration length)

use serde::{Deserialize, Serialize};

/// Internal sample rate in Hz. The detector self-paces to this rate
/// regardless of how often its tick is called.
pub const FS_HZ: f64 = 100.0;

/// Sample period in seconds.
pub const DT: f64 = 1.0 / FS_HZ;

/// Fast EMA coefficient for the raw temperature reading.
pub const ALPHA_FAST: f64 = 0.22;

/// Slow EMA coefficient (thermal baseline).
pub const ALPHA_SLOW: f64 = 0.004;

/// Minimum duration of any phase in seconds. Half of this value is also
/// the refractory window after a non-idle transition.
pub const MIN_PHASE_S: f64 = 0.20;

/// EMA coefficient pulling the active scale toward the tracked peak.
pub const EMA_MAG: f64 = 0.20;

/// Multiplicative per-sample decay of the leaky peak trackers.
pub const LEAK_DECAY: f64 = 0.994;

/// Lower bound on both adaptive scales. Keeps normalization finite on a
/// near-silent signal.
pub const SCALE_FLOOR: f64 = 0.02;

/// Initial value for the peak trackers and scales.
pub const SCALE_SEED: f64 = 0.10;

/// Normalized magnitude below which a sample counts toward idle.
pub const IDLE_MAG_FRAC: f64 = 0.20;

/// Normalized slope magnitude below which a sample counts toward idle.
pub const IDLE_SLOPE_FRAC: f64 = 0.06;

/// Nominal idle confirmation hold in seconds. The phase machine requires
/// the condition to hold for 1.5x this value before entering idle.
pub const IDLE_HOLD_S: f64 = 2.2;

/// Shortest physiologically plausible exhale in seconds.
pub const EXHALE_MIN_S: f64 = 0.3;

/// Longest plausible exhale; beyond this the breath is treated as a hold.
pub const EXHALE_MAX_S: f64 = 15.0;

/// Shortest plausible inhale in seconds.
pub const INHALE_MIN_S: f64 = 0.2;

/// Longest plausible inhale in seconds.
pub const INHALE_MAX_S: f64 = 10.0;

/// Exhales at or below this length are treated as sensing artifacts and
/// feed the unworn streak instead of the breath history.
pub const ARTIFACT_SHORT_MAX_S: f64 = 0.6;

/// Consecutive artifact exhales required to declare the device unworn.
pub const UNWORN_STREAK_NEEDED: u32 = 6;

/// Exhale length that clears an unworn flag once seen.
pub const WORN_RECOVERY_MIN_S: f64 = 1.5;

/// Cap on buffered flow samples per exhale. Writes stop at the cap; the
/// buffer is not a sliding window.
pub const MAX_EXHALE_SAMPLES: usize = 50;

/// A sensitivity preset: the per-user tunable subset of the signal path.
///
/// `th_end` is carried for preset completeness and exposed through the
/// setter contract; phase end is detected by opposite-sign crossing or
/// idle entry rather than a dedicated end threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityPreset {
    /// Low-pass coefficient for the flow signal.
    pub alpha_flow: f64,
    /// Gain on the flow derivative added before the low-pass.
    pub deriv_gain: f64,
    /// Normalized magnitude that starts an inhale (positive) or exhale
    /// (negative crossing).
    pub th_start: f64,
    /// Normalized magnitude associated with phase end.
    pub th_end: f64,
}

/// Sensitivity presets from least (0) to most (9) sensitive.
pub const SENSITIVITY_PRESETS: [SensitivityPreset; 10] = [
    SensitivityPreset { alpha_flow: 0.28, deriv_gain: 0.06, th_start: 0.45, th_end: 0.30 },
    SensitivityPreset { alpha_flow: 0.26, deriv_gain: 0.08, th_start: 0.42, th_end: 0.28 },
    SensitivityPreset { alpha_flow: 0.24, deriv_gain: 0.10, th_start: 0.40, th_end: 0.26 },
    SensitivityPreset { alpha_flow: 0.22, deriv_gain: 0.12, th_start: 0.38, th_end: 0.24 },
    SensitivityPreset { alpha_flow: 0.20, deriv_gain: 0.12, th_start: 0.36, th_end: 0.22 },
    SensitivityPreset { alpha_flow: 0.18, deriv_gain: 0.12, th_start: 0.35, th_end: 0.20 },
    SensitivityPreset { alpha_flow: 0.16, deriv_gain: 0.14, th_start: 0.33, th_end: 0.20 },
    SensitivityPreset { alpha_flow: 0.14, deriv_gain: 0.16, th_start: 0.31, th_end: 0.18 },
    SensitivityPreset { alpha_flow: 0.12, deriv_gain: 0.18, th_start: 0.29, th_end: 0.16 },
    SensitivityPreset { alpha_flow: 0.10, deriv_gain: 0.20, th_start: 0.27, th_end: 0.14 },
];

/// Preset index used by a freshly constructed detector.
pub const DEFAULT_PRESET_INDEX: usize = 5;

/// Look up a preset, clamping out-of-range indices to the nearest valid one.
pub fn preset(index: usize) -> SensitivityPreset {
    SENSITIVITY_PRESETS[index.min(SENSITIVITY_PRESETS.len() - 1)]
}

/// Exhale-duration boundaries between depth bands, in seconds.
///
/// A duration maps to the first band whose boundary it does not exceed;
/// anything beyond `long_max` is the deepest band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthThresholds {
    pub very_short_max: f64,
    pub short_max: f64,
    pub medium_max: f64,
    pub long_max: f64,
}

impl Default for DepthThresholds {
    fn default() -> Self {
        Self {
            very_short_max: 2.0,
            short_max: 3.5,
            medium_max: 5.0,
            long_max: 6.5,
        }
    }
}

/// Exhale/inhale ratio at or below which breathing reads as anxious.
pub const STRESS_RATIO_ANXIOUS: f64 = 0.8;

/// Successive-difference CV at or above which breathing reads as anxious.
pub const STRESS_RMSSD_CV_ANXIOUS: f64 = 0.50;

/// Cycle duration below which breathing is too fast for meditation.
pub const MEDITATION_CYCLE_MIN_S: f64 = 6.0;

/// Cycle duration of resonance breathing (about 6 breaths per minute).
pub const MEDITATION_CYCLE_OPTIMAL_S: f64 = 10.0;

/// Consistency CV below which the rhythm counts as stable for meditation.
pub const MEDITATION_STABILITY_CV: f64 = 0.15;

/// Configurable scoring thresholds, replaced as a whole set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoodThresholds {
    /// Exhale/inhale ratio at or above which breathing reads as calm.
    pub calm_ratio: f64,
    /// Successive-difference CV at or below which breathing reads as calm.
    pub calm_variability_cv: f64,
    /// Consistency CV anchoring the four-band focus map.
    pub focus_consistency_cv: f64,
    /// Valid breaths required before scores become available.
    pub calibration_breaths: u32,
}

impl Default for MoodThresholds {
    fn default() -> Self {
        Self {
            calm_ratio: 1.5,
            calm_variability_cv: 0.10,
            focus_consistency_cv: 0.15,
            calibration_breaths: 6,
        }
    }
}
