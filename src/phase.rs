//! Hysteretic breath phase state machine
//!
//! Consumes the normalized flow and its slope once per sample step and
//! decides idle/inhale/exhale transitions. Three guards keep the machine
//! from chattering on a noisy crossing:
//! - a minimum dwell time before a phase may be replaced,
//! - a refractory lock after every non-idle transition (idle-exit checks
//!   stay live during the lock),
//! - an idle hold: magnitude and slope must stay inside the idle band
//!   continuously for 1.5x the nominal hold before idle is entered, and a
//!   single out-of-band sample nulls the hold timer.
//!
//! Completed phase durations are handed back through [`PhaseEvent`] so the
//! owner can route them to the recorder, metrics, and scoring stages.

use crate::config::{IDLE_HOLD_S, IDLE_MAG_FRAC, IDLE_SLOPE_FRAC, MIN_PHASE_S};
use crate::types::BreathPhase;

/// Transition produced by a sample step, with the duration of the phase
/// it closed where one was being timed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseEvent {
    /// Settled into idle. Carries the exhale duration when idle was
    /// entered directly from an exhale.
    EnteredIdle { completed_exhale: Option<f64> },
    /// Inhale began. Carries the exhale duration when this crossing ended
    /// an exhale, which is the anchor point for a completed breath cycle.
    StartedInhale { completed_exhale: Option<f64> },
    /// Exhale began. Carries the inhale duration when this crossing ended
    /// an inhale.
    StartedExhale { completed_inhale: Option<f64> },
}

/// The state machine proper. Time is caller-supplied monotonic seconds.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: BreathPhase,
    phase_start: f64,
    refractory_until: f64,
    idle_hold_start: Option<f64>,
    exhale_start: Option<f64>,
    inhale_start: Option<f64>,
    last_exhale_s: f64,
    last_inhale_s: f64,
    th_start: f64,
}

impl PhaseMachine {
    pub fn new(th_start: f64, now: f64) -> Self {
        Self {
            phase: BreathPhase::Idle,
            phase_start: now,
            refractory_until: now,
            idle_hold_start: None,
            exhale_start: None,
            inhale_start: None,
            last_exhale_s: 2.0,
            last_inhale_s: 2.0,
            th_start,
        }
    }

    pub fn phase(&self) -> BreathPhase {
        self.phase
    }

    /// Duration of the most recently completed exhale.
    pub fn last_exhale_s(&self) -> f64 {
        self.last_exhale_s
    }

    /// Duration of the most recently completed inhale.
    pub fn last_inhale_s(&self) -> f64 {
        self.last_inhale_s
    }

    /// Swap the start threshold (sensitivity preset change). Phase and
    /// timing state are left alone; only future crossings see the new
    /// threshold.
    pub fn set_th_start(&mut self, th_start: f64) {
        self.th_start = th_start;
    }

    /// Return to the constructed idle state.
    pub fn reset(&mut self, now: f64) {
        *self = Self::new(self.th_start, now);
    }

    /// Advance one sample step.
    pub fn step(&mut self, norm: f64, dnorm: f64, now: f64) -> Option<PhaseEvent> {
        let phase_age = now - self.phase_start;

        // Idle entry, checked before the refractory lock so a dying signal
        // can always settle out of a phase.
        if self.phase != BreathPhase::Idle {
            if norm.abs() <= IDLE_MAG_FRAC && dnorm.abs() <= IDLE_SLOPE_FRAC {
                let hold_start = *self.idle_hold_start.get_or_insert(now);
                if now - hold_start >= IDLE_HOLD_S * 1.5 && phase_age >= MIN_PHASE_S {
                    let completed_exhale = self.close_exhale_if_open(now);
                    self.phase = BreathPhase::Idle;
                    self.phase_start = now;
                    return Some(PhaseEvent::EnteredIdle { completed_exhale });
                }
            } else {
                self.idle_hold_start = None;
            }
        }

        if now < self.refractory_until {
            return None;
        }

        if self.phase != BreathPhase::Inhale && norm > self.th_start {
            if phase_age >= MIN_PHASE_S || self.phase == BreathPhase::Idle {
                let completed_exhale = self.close_exhale_if_open(now);
                self.phase = BreathPhase::Inhale;
                self.phase_start = now;
                self.inhale_start = Some(now);
                self.idle_hold_start = None;
                self.refractory_until = now + MIN_PHASE_S * 0.5;
                return Some(PhaseEvent::StartedInhale { completed_exhale });
            }
        } else if self.phase != BreathPhase::Exhale && norm < -self.th_start {
            if phase_age >= MIN_PHASE_S || self.phase == BreathPhase::Idle {
                let completed_inhale = self.close_inhale_if_open(now);
                self.phase = BreathPhase::Exhale;
                self.phase_start = now;
                self.exhale_start = Some(now);
                self.idle_hold_start = None;
                self.refractory_until = now + MIN_PHASE_S * 0.5;
                return Some(PhaseEvent::StartedExhale { completed_inhale });
            }
        }

        None
    }

    fn close_exhale_if_open(&mut self, now: f64) -> Option<f64> {
        if self.phase == BreathPhase::Exhale {
            if let Some(start) = self.exhale_start.take() {
                let duration = now - start;
                self.last_exhale_s = duration;
                return Some(duration);
            }
        }
        None
    }

    fn close_inhale_if_open(&mut self, now: f64) -> Option<f64> {
        if self.phase == BreathPhase::Inhale {
            if let Some(start) = self.inhale_start.take() {
                let duration = now - start;
                self.last_inhale_s = duration;
                return Some(duration);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DT;

    /// Step the machine with a constant (norm, dnorm) for a stretch of
    /// sample periods, returning the first event and its time.
    fn drive(
        machine: &mut PhaseMachine,
        norm: f64,
        dnorm: f64,
        start: f64,
        steps: usize,
    ) -> Option<(PhaseEvent, f64)> {
        for i in 0..steps {
            let now = start + (i as f64) * DT;
            if let Some(event) = machine.step(norm, dnorm, now) {
                return Some((event, now));
            }
        }
        None
    }

    #[test]
    fn test_idle_to_inhale_on_threshold_crossing() {
        let mut machine = PhaseMachine::new(0.35, 0.0);

        // Below threshold: nothing.
        assert!(drive(&mut machine, 0.3, 0.0, 0.0, 100).is_none());
        // Above threshold: immediate inhale (idle bypasses dwell).
        let (event, _) = drive(&mut machine, 0.5, 0.0, 1.0, 5).unwrap();
        assert_eq!(event, PhaseEvent::StartedInhale { completed_exhale: None });
        assert_eq!(machine.phase(), BreathPhase::Inhale);
    }

    #[test]
    fn test_refractory_suppresses_counter_transition() {
        let mut machine = PhaseMachine::new(0.35, 0.0);
        machine.step(0.5, 0.0, 0.0);
        assert_eq!(machine.phase(), BreathPhase::Inhale);

        // Within the refractory window the opposite crossing is ignored.
        assert!(machine.step(-0.5, 0.0, MIN_PHASE_S * 0.25).is_none());
        assert_eq!(machine.phase(), BreathPhase::Inhale);

        // Past refractory but under the dwell: still held.
        assert!(machine.step(-0.5, 0.0, MIN_PHASE_S * 0.75).is_none());

        // Past the dwell the exhale goes through and reports the inhale.
        let event = machine.step(-0.5, 0.0, MIN_PHASE_S + DT).unwrap();
        match event {
            PhaseEvent::StartedExhale { completed_inhale: Some(d) } => {
                assert!((d - (MIN_PHASE_S + DT)).abs() < 1e-9);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_non_idle_transitions_respect_refractory_spacing() {
        let mut machine = PhaseMachine::new(0.35, 0.0);
        let mut last_transition: Option<f64> = None;

        // Fast alternating signal; record every non-idle transition time.
        let mut norm = 0.5;
        for i in 0..5000 {
            let now = (i as f64) * DT;
            norm = -norm;
            if let Some(event) = machine.step(norm, 0.0, now) {
                if !matches!(event, PhaseEvent::EnteredIdle { .. }) {
                    if let Some(prev) = last_transition {
                        assert!(
                            now - prev >= MIN_PHASE_S * 0.5 - 1e-9,
                            "transitions {prev} and {now} violate refractory"
                        );
                    }
                    last_transition = Some(now);
                }
            }
        }
        assert!(last_transition.is_some());
    }

    #[test]
    fn test_idle_entry_requires_sustained_hold() {
        let mut machine = PhaseMachine::new(0.35, 0.0);
        machine.step(-0.5, 0.0, 0.0);
        assert_eq!(machine.phase(), BreathPhase::Exhale);

        // Quiet signal, but not for long enough: no idle.
        let hold = IDLE_HOLD_S * 1.5;
        let steps_short = ((hold - 0.2) / DT) as usize;
        assert!(drive(&mut machine, 0.05, 0.0, 1.0, steps_short).is_none());

        // One violating sample resets the hold timer.
        machine.step(0.3, 0.0, 1.0 + hold - 0.1);

        // Quiet again: idle arrives one full hold later, not sooner.
        let (event, at) =
            drive(&mut machine, 0.05, 0.0, 1.0 + hold, ((hold + 1.0) / DT) as usize).unwrap();
        assert!(matches!(event, PhaseEvent::EnteredIdle { .. }));
        assert!(at - (1.0 + hold) >= hold - DT, "idle at {at} came early");
    }

    #[test]
    fn test_idle_from_exhale_reports_duration() {
        let mut machine = PhaseMachine::new(0.35, 0.0);
        machine.step(-0.5, 0.0, 0.0);

        let (event, at) =
            drive(&mut machine, 0.0, 0.0, 2.0, ((IDLE_HOLD_S * 1.5 + 1.0) / DT) as usize)
                .unwrap();
        match event {
            PhaseEvent::EnteredIdle { completed_exhale: Some(d) } => {
                assert!((d - at).abs() < 1e-9, "exhale ran from t=0 to idle entry");
                assert!((machine.last_exhale_s() - d).abs() < 1e-12);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_inhale_from_exhale_reports_cycle_anchor() {
        let mut machine = PhaseMachine::new(0.35, 0.0);
        machine.step(0.5, 0.0, 0.0);
        machine.step(-0.5, 0.0, 1.0);
        assert_eq!(machine.phase(), BreathPhase::Exhale);

        let event = machine.step(0.5, 0.0, 3.5).unwrap();
        match event {
            PhaseEvent::StartedInhale { completed_exhale: Some(d) } => {
                assert!((d - 2.5).abs() < 1e-9);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!((machine.last_inhale_s() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ramp_to_hold_produces_exactly_one_transition() {
        let th = 0.35;
        let mut machine = PhaseMachine::new(th, 0.0);
        let target = 2.0 * th;
        let ramp_steps = (0.5 / DT) as usize;

        let mut transitions = Vec::new();
        let mut prev_norm = 0.0;
        for i in 0..1000 {
            let now = (i as f64) * DT;
            let norm = if i < ramp_steps {
                target * (i as f64) / (ramp_steps as f64)
            } else {
                target
            };
            let dnorm = (norm - prev_norm) / DT;
            prev_norm = norm;
            if let Some(event) = machine.step(norm, dnorm, now) {
                transitions.push((event, now));
            }
        }

        assert_eq!(transitions.len(), 1, "got {transitions:?}");
        let (event, at) = transitions[0];
        assert_eq!(event, PhaseEvent::StartedInhale { completed_exhale: None });
        // Fires at the threshold crossing partway up the ramp, not at t=0.
        assert!(at > 0.2 && at < 0.5, "transition at {at}");
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut machine = PhaseMachine::new(0.35, 0.0);
        machine.step(0.5, 0.0, 0.0);
        assert_eq!(machine.phase(), BreathPhase::Inhale);

        machine.reset(10.0);
        assert_eq!(machine.phase(), BreathPhase::Idle);
        // Fresh machine takes a crossing immediately.
        assert!(machine.step(0.5, 0.0, 10.0 + DT).is_some());
    }
}
