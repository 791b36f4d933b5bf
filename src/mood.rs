//! Mood scoring from recent breath history
//!
//! An optional stage layered on top of the detection pipeline. It keeps a
//! short rolling window of validated breaths and reduces it to three
//! scores:
//! - stress, from the exhale/inhale ratio, the pace relative to a session
//!   baseline, and successive-difference variability
//! - focus, from the consistency of cycle timing
//! - meditation depth, from cycle length and rhythm stability
//!
//! Variability measures are expressed as coefficients of variation
//! (normalized by mean cycle duration) so slow breathers are not penalized
//! for absolute variability. Scores stay unavailable until the calibration
//! gate has seen enough valid breaths.

use crate::config::{
    MoodThresholds, MEDITATION_CYCLE_MIN_S, MEDITATION_CYCLE_OPTIMAL_S, MEDITATION_STABILITY_CV,
    STRESS_RATIO_ANXIOUS, STRESS_RMSSD_CV_ANXIOUS,
};
use crate::types::{BreathRecord, MoodScores};
use std::collections::VecDeque;

/// Breaths kept in the rolling window. Short for quick response.
const RECENT_WINDOW: usize = 5;

/// Successive cycle-duration differences kept for the variability measure.
const DIFF_WINDOW: usize = 4;

/// EMA coefficient of the session cycle-duration baseline.
const BASELINE_ALPHA: f64 = 0.10;

/// Inhale floor for the ratio, in seconds.
const RATIO_INHALE_FLOOR_S: f64 = 0.1;

/// A scoring stage consuming validated breath cycles.
///
/// The detection pipeline is identical with or without a stage attached;
/// deployments that only want raw metrics simply run without one.
pub trait ScoringStage {
    /// Feed one validated breath cycle.
    fn observe(&mut self, record: &BreathRecord);

    /// Current scores; `None` while the stage is still calibrating.
    fn scores(&self) -> Option<MoodScores>;

    /// Replace the configurable thresholds as a whole set.
    fn set_thresholds(&mut self, thresholds: MoodThresholds);

    /// Return to the constructed state, keeping configured thresholds.
    fn reset(&mut self);
}

/// The standard scorer.
#[derive(Debug, Clone)]
pub struct MoodScorer {
    thresholds: MoodThresholds,
    breath_count: u32,
    is_calibrating: bool,

    recent: VecDeque<BreathRecord>,
    successive_diffs: VecDeque<f64>,
    last_cycle_s: Option<f64>,
    /// Session-relative cycle-duration baseline (EMA).
    session_baseline_s: Option<f64>,

    // Metrics derived from the windows.
    ratio: f64,
    rmssd_cv: f64,
    consistency_cv: f64,
    mean_cycle_s: f64,

    stress: i32,
    focus: u32,
    meditation: u32,
}

impl Default for MoodScorer {
    fn default() -> Self {
        Self::new(MoodThresholds::default())
    }
}

impl MoodScorer {
    pub fn new(thresholds: MoodThresholds) -> Self {
        Self {
            thresholds,
            breath_count: 0,
            is_calibrating: true,
            recent: VecDeque::with_capacity(RECENT_WINDOW),
            successive_diffs: VecDeque::with_capacity(DIFF_WINDOW),
            last_cycle_s: None,
            session_baseline_s: None,
            ratio: 1.0,
            rmssd_cv: 0.25,
            consistency_cv: MEDITATION_STABILITY_CV,
            mean_cycle_s: 4.0,
            stress: 0,
            focus: 5,
            meditation: 0,
        }
    }

    pub fn breath_count(&self) -> u32 {
        self.breath_count
    }

    pub fn calibrating(&self) -> bool {
        self.is_calibrating
    }

    fn update_window_metrics(&mut self) {
        if self.recent.is_empty() {
            return;
        }
        let n = self.recent.len() as f64;

        self.ratio = self
            .recent
            .iter()
            .map(|r| r.exhale_s / r.inhale_s.max(RATIO_INHALE_FLOOR_S))
            .sum::<f64>()
            / n;

        self.mean_cycle_s = self.recent.iter().map(|r| r.cycle_s()).sum::<f64>() / n;

        if self.recent.len() >= 2 {
            let variance = self
                .recent
                .iter()
                .map(|r| {
                    let d = r.cycle_s() - self.mean_cycle_s;
                    d * d
                })
                .sum::<f64>()
                / n;
            self.consistency_cv = variance.sqrt() / self.mean_cycle_s.max(0.1);
        }

        if self.successive_diffs.len() >= 2 {
            let mean_sq = self.successive_diffs.iter().map(|d| d * d).sum::<f64>()
                / self.successive_diffs.len() as f64;
            self.rmssd_cv = mean_sq.sqrt() / self.mean_cycle_s.max(0.1);
        }
    }

    /// Stress: -5 (serene) to +5 (anxious).
    ///
    /// Weighted blend, 50/25/25:
    /// - exhale/inhale ratio, long exhales scoring calm
    /// - pace against the session baseline, faster scoring stressed
    /// - successive-difference CV, erratic timing scoring stressed
    fn compute_stress(&mut self, baseline_s: f64) {
        let ratio_range = (self.thresholds.calm_ratio - STRESS_RATIO_ANXIOUS).max(0.1);
        let ratio_norm = (self.ratio - STRESS_RATIO_ANXIOUS) / ratio_range;
        let ratio_score = (5.0 - ratio_norm * 10.0).clamp(-5.0, 5.0);

        let pace_dev = (baseline_s - self.mean_cycle_s) / baseline_s.max(0.1);
        let pace_score = (pace_dev * 10.0).clamp(-5.0, 5.0);

        let rmssd_range =
            (STRESS_RMSSD_CV_ANXIOUS - self.thresholds.calm_variability_cv).max(0.01);
        let rmssd_norm = (self.rmssd_cv - self.thresholds.calm_variability_cv) / rmssd_range;
        let rmssd_score = (-5.0 + rmssd_norm * 10.0).clamp(-5.0, 5.0);

        let raw = 0.50 * ratio_score + 0.25 * pace_score + 0.25 * rmssd_score;
        self.stress = raw.clamp(-5.0, 5.0).round() as i32;
    }

    /// Focus: 0 (distracted) to 10 (deeply focused).
    ///
    /// Four-band piecewise linear map of the consistency CV around the
    /// configured threshold `t`: below t/2 scores 9-10, below t scores
    /// 6-7.5, below 2t scores 3-6, beyond that decays from 3 toward 0.
    fn compute_focus(&mut self) {
        let t = self.thresholds.focus_consistency_cv.max(1e-3);
        let cv = self.consistency_cv;

        let focus = if cv < t * 0.5 {
            9.0 + ((t * 0.5 - cv) / (t * 0.5)).min(1.0)
        } else if cv < t {
            6.0 + (1.0 - cv / t) * 3.0
        } else if cv < t * 2.0 {
            3.0 + (1.0 - (cv - t) / t) * 3.0
        } else {
            (3.0 - (cv - t * 2.0) * 10.0).max(0.0)
        };

        self.focus = focus.clamp(0.0, 10.0).round() as u32;
    }

    /// Meditation: 0 (active) to 10 (deep). Stays 0 below 3 recorded
    /// breaths.
    ///
    /// 50% cycle length mapped toward resonance breathing, 50% rhythm
    /// stability against a fixed CV threshold.
    fn compute_meditation(&mut self) {
        if self.recent.len() < 3 {
            self.meditation = 0;
            return;
        }

        let cycle = self.mean_cycle_s;
        let cycle_score = if cycle < MEDITATION_CYCLE_MIN_S {
            (cycle / MEDITATION_CYCLE_MIN_S) * 4.0
        } else if cycle < MEDITATION_CYCLE_OPTIMAL_S {
            let progress = (cycle - MEDITATION_CYCLE_MIN_S)
                / (MEDITATION_CYCLE_OPTIMAL_S - MEDITATION_CYCLE_MIN_S);
            4.0 + progress * 6.0
        } else {
            10.0
        };

        let t = MEDITATION_STABILITY_CV;
        let cv = self.consistency_cv;
        let stability_score = if cv < t {
            10.0
        } else if cv < t * 2.0 {
            10.0 - ((cv - t) / t) * 5.0
        } else {
            (5.0 - (cv - t * 2.0) * 10.0).max(0.0)
        };

        let raw = 0.5 * cycle_score + 0.5 * stability_score;
        self.meditation = raw.clamp(0.0, 10.0).round() as u32;
    }
}

impl ScoringStage for MoodScorer {
    fn observe(&mut self, record: &BreathRecord) {
        let total = record.cycle_s();
        self.breath_count += 1;

        self.recent.push_back(*record);
        while self.recent.len() > RECENT_WINDOW {
            self.recent.pop_front();
        }

        if let Some(last) = self.last_cycle_s {
            self.successive_diffs.push_back((total - last).abs());
            while self.successive_diffs.len() > DIFF_WINDOW {
                self.successive_diffs.pop_front();
            }
        }
        self.last_cycle_s = Some(total);

        self.update_window_metrics();

        // Pace is judged against the baseline as it stood before this
        // breath; the baseline then absorbs the new cycle.
        let baseline = self.session_baseline_s.unwrap_or(total);
        self.compute_stress(baseline);
        self.compute_focus();
        self.compute_meditation();

        self.session_baseline_s = Some(match self.session_baseline_s {
            None => total,
            Some(b) => b + BASELINE_ALPHA * (total - b),
        });

        if self.breath_count >= self.thresholds.calibration_breaths {
            self.is_calibrating = false;
        }
    }

    fn scores(&self) -> Option<MoodScores> {
        if self.is_calibrating {
            return None;
        }
        Some(MoodScores {
            stress: self.stress,
            focus: self.focus,
            meditation: self.meditation,
        })
    }

    fn set_thresholds(&mut self, thresholds: MoodThresholds) {
        self.thresholds = thresholds;
    }

    fn reset(&mut self) {
        *self = Self::new(self.thresholds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breath(exhale_s: f64, inhale_s: f64) -> BreathRecord {
        BreathRecord { exhale_s, inhale_s }
    }

    fn feed(scorer: &mut MoodScorer, records: &[BreathRecord]) {
        for r in records {
            scorer.observe(r);
        }
    }

    #[test]
    fn test_scores_gated_until_calibration() {
        let mut scorer = MoodScorer::default();

        for i in 1..=6u32 {
            assert!(scorer.scores().is_none(), "scores leaked at breath {}", i - 1);
            scorer.observe(&breath(3.0, 2.0));
            assert_eq!(scorer.breath_count(), i);
        }
        assert!(scorer.scores().is_some());

        // Once open, the gate stays open.
        scorer.observe(&breath(3.0, 2.0));
        assert!(scorer.scores().is_some());
    }

    #[test]
    fn test_calm_slow_breathing_scores_serene() {
        let mut scorer = MoodScorer::default();
        feed(&mut scorer, &vec![breath(6.0, 4.0); 8]);

        let scores = scorer.scores().unwrap();
        // Ratio 1.5 (calm), zero variability, steady pace: strongly calm.
        assert!(scores.stress <= -3, "stress {}", scores.stress);
        assert_eq!(scores.focus, 10);
        assert_eq!(scores.meditation, 10);
    }

    #[test]
    fn test_fast_erratic_breathing_scores_anxious() {
        let mut scorer = MoodScorer::default();
        let pattern = [breath(0.5, 1.0), breath(1.0, 1.2)];
        for i in 0..10 {
            scorer.observe(&pattern[i % 2]);
        }

        let scores = scorer.scores().unwrap();
        assert!(scores.stress >= 2, "stress {}", scores.stress);
        assert!(scores.focus <= 6, "focus {}", scores.focus);
        assert!(scores.meditation <= 6, "meditation {}", scores.meditation);
    }

    #[test]
    fn test_speeding_up_raises_stress() {
        let mut scorer = MoodScorer::default();
        // Establish a slow session baseline, then shift fast but steady:
        // the ratio stays calm, so the pace term drives the change.
        feed(&mut scorer, &vec![breath(6.0, 4.0); 10]);
        let slow = scorer.scores().unwrap().stress;

        feed(&mut scorer, &vec![breath(1.8, 1.2); 5]);
        let fast = scorer.scores().unwrap().stress;
        assert!(fast > slow, "fast {fast} <= slow {slow}");
    }

    #[test]
    fn test_meditation_zero_below_three_breaths() {
        let mut scorer = MoodScorer::new(MoodThresholds {
            calibration_breaths: 2,
            ..MoodThresholds::default()
        });
        feed(&mut scorer, &[breath(6.0, 4.0), breath(6.0, 4.0)]);

        let scores = scorer.scores().unwrap();
        assert_eq!(scores.meditation, 0);

        scorer.observe(&breath(6.0, 4.0));
        assert!(scorer.scores().unwrap().meditation > 0);
    }

    #[test]
    fn test_rolling_window_evicts_oldest() {
        let mut scorer = MoodScorer::default();
        feed(&mut scorer, &vec![breath(2.0, 2.0); 5]);
        // Five more at ratio 3; the window now holds only those.
        feed(&mut scorer, &vec![breath(6.0, 2.0); 5]);
        assert!((scorer.ratio - 3.0).abs() < 1e-9, "ratio {}", scorer.ratio);
    }

    #[test]
    fn test_inhale_floored_for_ratio() {
        let mut scorer = MoodScorer::default();
        // Inhale far below the floor: the ratio divides by 0.1, not 0.05.
        feed(&mut scorer, &vec![breath(1.0, 0.05); 5]);
        assert!((scorer.ratio - 10.0).abs() < 1e-9, "ratio {}", scorer.ratio);
    }

    #[test]
    fn test_set_thresholds_changes_gate_and_survives_reset() {
        let mut scorer = MoodScorer::default();
        scorer.set_thresholds(MoodThresholds {
            calibration_breaths: 3,
            ..MoodThresholds::default()
        });

        feed(&mut scorer, &vec![breath(3.0, 2.0); 3]);
        assert!(scorer.scores().is_some());

        scorer.reset();
        assert!(scorer.calibrating());
        assert_eq!(scorer.breath_count(), 0);

        feed(&mut scorer, &vec![breath(3.0, 2.0); 3]);
        assert!(scorer.scores().is_some(), "threshold lost across reset");
    }
}
