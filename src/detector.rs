//! Detector orchestration
//!
//! [`BreathDetector`] wires the pipeline together and owns all of its
//! state: source → conditioner → normalizer → phase machine → recorder,
//! metrics, and the optional scoring stage. One detector instance serves
//! one sensor for the lifetime of a wearing session.
//!
//! The detector self-paces: each `tick` runs every whole sample period
//! owed since the previous call, so the caller's loop cadence only needs
//! to be roughly the nominal rate. Filter math always advances in exact
//! uniform steps.

use crate::config::{
    preset, DepthThresholds, MoodThresholds, SensitivityPreset, DEFAULT_PRESET_INDEX, DT,
};
use crate::metrics::MetricsEngine;
use crate::mood::{MoodScorer, ScoringStage};
use crate::phase::{PhaseEvent, PhaseMachine};
use crate::recorder::{validate_breath, UnwornTracker};
use crate::sensor::SampleSource;
use crate::signal::{FlowConditioner, FlowNormalizer};
use crate::types::{BreathPhase, BreathSnapshot, DepthBand};

/// Breath phase detector over an injected sample source.
///
/// Time is caller-supplied monotonic seconds; the detector never reads a
/// clock itself. Collaborators read state through [`BreathDetector::snapshot`]
/// and mutate it only through the parameter setters, each of which
/// replaces its whole parameter set.
pub struct BreathDetector<S: SampleSource> {
    source: S,
    conditioner: FlowConditioner,
    normalizer: FlowNormalizer,
    machine: PhaseMachine,
    unworn: UnwornTracker,
    metrics: MetricsEngine,
    scorer: Option<Box<dyn ScoringStage>>,
    depth_thresholds: DepthThresholds,
    active_preset: SensitivityPreset,
    preset_index: usize,
    norm: f64,
    next_step: f64,
}

impl<S: SampleSource> BreathDetector<S> {
    /// Detector exposing raw per-breath metrics only.
    pub fn new(source: S, now: f64) -> Self {
        let active = preset(DEFAULT_PRESET_INDEX);
        Self {
            source,
            conditioner: FlowConditioner::new(active.alpha_flow, active.deriv_gain),
            normalizer: FlowNormalizer::new(),
            machine: PhaseMachine::new(active.th_start, now),
            unworn: UnwornTracker::new(),
            metrics: MetricsEngine::new(),
            scorer: None,
            depth_thresholds: DepthThresholds::default(),
            active_preset: active,
            preset_index: DEFAULT_PRESET_INDEX,
            norm: 0.0,
            next_step: now,
        }
    }

    /// Detector with the standard mood scoring stage attached.
    pub fn with_scoring(source: S, now: f64) -> Self {
        Self::with_stage(source, now, Box::new(MoodScorer::default()))
    }

    /// Detector with a custom scoring stage. The detection pipeline is
    /// identical regardless of the stage.
    pub fn with_stage(source: S, now: f64, stage: Box<dyn ScoringStage>) -> Self {
        let mut detector = Self::new(source, now);
        detector.scorer = Some(stage);
        detector
    }

    /// Current phase.
    pub fn phase(&self) -> BreathPhase {
        self.machine.phase()
    }

    /// Current normalized flow.
    pub fn norm(&self) -> f64 {
        self.norm
    }

    /// Active sensitivity preset.
    pub fn active_preset(&self) -> SensitivityPreset {
        self.active_preset
    }

    /// Active preset index.
    pub fn preset_index(&self) -> usize {
        self.preset_index
    }

    /// Mutable access to the injected source.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Advance by all whole sample periods elapsed up to `now`. Returns
    /// whether any phase transition occurred during this call.
    ///
    /// Catch-up steps all carry the call's `now` for phase timing; only
    /// the filter math is stepped per sample period.
    pub fn tick(&mut self, now: f64) -> bool {
        let mut transition = false;

        while now >= self.next_step {
            self.next_step += DT;

            let raw = self.source.read();
            let flow = self.conditioner.update(raw);
            let (norm, dnorm) = self.normalizer.update(flow);
            self.norm = norm;

            if self.machine.phase() == BreathPhase::Exhale {
                self.metrics.record_sample(flow);
            }

            match self.machine.step(norm, dnorm, now) {
                Some(PhaseEvent::EnteredIdle { completed_exhale }) => {
                    if let Some(exhale_s) = completed_exhale {
                        self.unworn.record_exhale(exhale_s);
                    }
                    transition = true;
                }
                Some(PhaseEvent::StartedInhale { completed_exhale }) => {
                    if let Some(exhale_s) = completed_exhale {
                        self.unworn.record_exhale(exhale_s);
                        self.finalize_cycle(exhale_s);
                    }
                    transition = true;
                }
                Some(PhaseEvent::StartedExhale { .. }) => {
                    self.metrics.start_exhale();
                    transition = true;
                }
                None => {}
            }
        }

        transition
    }

    /// A breath cycle completed (anchored at exhale end). Implausible
    /// cycles are dropped here and touch no duration-dependent state.
    fn finalize_cycle(&mut self, exhale_s: f64) {
        let inhale_s = self.machine.last_inhale_s();
        if let Some(record) = validate_breath(exhale_s, inhale_s) {
            self.metrics.observe(&record);
            if let Some(scorer) = self.scorer.as_mut() {
                scorer.observe(&record);
            }
        }
    }

    /// Read-only state snapshot.
    pub fn snapshot(&self) -> BreathSnapshot {
        BreathSnapshot {
            phase: self.machine.phase(),
            norm: self.norm,
            depth_band: DepthBand::from_duration(
                self.machine.last_exhale_s(),
                &self.depth_thresholds,
            ),
            metrics: self.metrics.latest(),
            breath_count: self.metrics.breath_count(),
            unworn: self.unworn.unworn(),
            calibrating: self.metrics.calibrating(),
            scores: self.scorer.as_ref().and_then(|s| s.scores()),
        }
    }

    /// Swap the sensitivity preset. Out-of-range indices clamp to the
    /// nearest valid preset. Filter state resets; accumulated EMA history
    /// from the old preset would otherwise bleed into the new scaling.
    pub fn apply_sensitivity(&mut self, preset_index: usize) {
        let index = preset_index.min(9);
        let active = preset(index);
        self.conditioner.set_tuning(active.alpha_flow, active.deriv_gain);
        self.machine.set_th_start(active.th_start);
        self.active_preset = active;
        self.preset_index = index;
    }

    /// Replace the exhale-duration depth band boundaries.
    pub fn apply_depth_thresholds(&mut self, very_short: f64, short: f64, medium: f64, long: f64) {
        self.depth_thresholds = DepthThresholds {
            very_short_max: very_short,
            short_max: short,
            medium_max: medium,
            long_max: long,
        };
    }

    /// Replace the scoring thresholds and calibration length.
    pub fn set_mood_thresholds(&mut self, thresholds: MoodThresholds) {
        self.metrics.set_calibration_breaths(thresholds.calibration_breaths);
        if let Some(scorer) = self.scorer.as_mut() {
            scorer.set_thresholds(thresholds);
        }
    }

    /// Session reset: all running state back to constructed defaults.
    /// Configured preset and thresholds are retained.
    pub fn reset(&mut self, now: f64) {
        self.conditioner.reset();
        self.normalizer.reset();
        self.machine.reset(now);
        self.unworn.reset();
        self.metrics.reset();
        if let Some(scorer) = self.scorer.as_mut() {
            scorer.reset();
        }
        self.norm = 0.0;
        self.next_step = now;
    }
}
