//! Core types for the respire detection pipeline
//!
//! This module defines the data that flows between pipeline stages: the
//! phase enum, per-breath records and metrics, mood scores, and the
//! fixed-shape state snapshot read by collaborators.

use crate::config::DepthThresholds;
use serde::{Deserialize, Serialize};

/// Breathing phase. Exactly one value is active at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreathPhase {
    Idle,
    Inhale,
    Exhale,
}

impl BreathPhase {
    /// Wire code used by transports that predate the enum (0/1/2).
    pub fn code(&self) -> u8 {
        match self {
            BreathPhase::Idle => 0,
            BreathPhase::Inhale => 1,
            BreathPhase::Exhale => 2,
        }
    }
}

/// Depth band derived from exhale duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthBand {
    VeryShort,
    Short,
    Medium,
    Long,
    Deep,
}

impl DepthBand {
    /// Classify an exhale duration against the given boundaries.
    pub fn from_duration(duration_s: f64, thresholds: &DepthThresholds) -> Self {
        if duration_s <= thresholds.very_short_max {
            DepthBand::VeryShort
        } else if duration_s <= thresholds.short_max {
            DepthBand::Short
        } else if duration_s <= thresholds.medium_max {
            DepthBand::Medium
        } else if duration_s <= thresholds.long_max {
            DepthBand::Long
        } else {
            DepthBand::Deep
        }
    }

    /// Wire code (0 = very short .. 4 = deep).
    pub fn code(&self) -> u8 {
        match self {
            DepthBand::VeryShort => 0,
            DepthBand::Short => 1,
            DepthBand::Medium => 2,
            DepthBand::Long => 3,
            DepthBand::Deep => 4,
        }
    }
}

/// A validated breath cycle. Produced once per completed cycle; cycles
/// outside the physiologic bounds are discarded before one is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreathRecord {
    pub exhale_s: f64,
    pub inhale_s: f64,
}

impl BreathRecord {
    pub fn cycle_s(&self) -> f64 {
        self.exhale_s + self.inhale_s
    }
}

/// Latest per-breath quality metrics. Overwritten at each completed
/// breath; never historical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreathMetrics {
    /// Last valid exhale duration in seconds.
    pub exhale_dur: f64,
    /// Last valid inhale duration in seconds.
    pub inhale_dur: f64,
    /// Last valid full-cycle duration in seconds.
    pub cycle_dur: f64,
    /// 0-100, 100 = perfectly smooth exhale.
    pub smoothness: u32,
    /// Peak absolute flow magnitude during the exhale.
    pub peak_flow: f64,
    /// 0-100 position of the flow peak within the exhale (50 = middle).
    pub symmetry: u32,
}

impl Default for BreathMetrics {
    fn default() -> Self {
        Self {
            exhale_dur: 0.0,
            inhale_dur: 0.0,
            cycle_dur: 0.0,
            smoothness: 100,
            peak_flow: 0.0,
            symmetry: 50,
        }
    }
}

/// Mood scores derived from recent breath history. Absent from snapshots
/// until the calibration gate opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodScores {
    /// -5 (serene) to +5 (anxious).
    pub stress: i32,
    /// 0 (distracted) to 10 (deeply focused).
    pub focus: u32,
    /// 0 (active) to 10 (deep meditation).
    pub meditation: u32,
}

/// Read-only snapshot of detector state, taken once per collaborator tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreathSnapshot {
    /// Current phase.
    pub phase: BreathPhase,
    /// Current normalized flow, roughly [-1, +1].
    pub norm: f64,
    /// Depth band of the most recent exhale.
    pub depth_band: DepthBand,
    /// Latest per-breath metrics.
    pub metrics: BreathMetrics,
    /// Valid breaths recorded this session.
    pub breath_count: u32,
    /// Device inferred as not worn.
    pub unworn: bool,
    /// Still accumulating the calibration history.
    pub calibrating: bool,
    /// Mood scores; `None` while calibrating or when no scoring stage is
    /// attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<MoodScores>,
}
