//! Flow signal conditioning and adaptive normalization
//!
//! Two incremental stages run once per sample step:
//! - [`FlowConditioner`] turns the raw temperature reading into a denoised
//!   "flow" value proportional to the rate of thermal change, with a
//!   derivative boost that compensates for thermistor lag.
//! - [`FlowNormalizer`] rescales flow by separately tracked positive and
//!   negative peak magnitudes, so both breath directions auto-calibrate to
//!   the wearer without a reference breath.
//!
//! All updates are O(1) with no allocation; state lives in plain floats.

use crate::config::{
    ALPHA_FAST, ALPHA_SLOW, DT, EMA_MAG, LEAK_DECAY, SCALE_FLOOR, SCALE_SEED,
};

/// Fast/slow EMA pair plus derivative-boosted low-pass.
///
/// Sign convention: cool inhaled air pulls the fast EMA under the slow
/// baseline, so flow is positive during inhale.
#[derive(Debug, Clone)]
pub struct FlowConditioner {
    alpha_flow: f64,
    deriv_gain: f64,
    fast_ema: f64,
    slow_ema: f64,
    prev_flow: f64,
    flow_lowpass: f64,
}

impl FlowConditioner {
    pub fn new(alpha_flow: f64, deriv_gain: f64) -> Self {
        Self {
            alpha_flow,
            deriv_gain,
            fast_ema: 0.0,
            slow_ema: 0.0,
            prev_flow: 0.0,
            flow_lowpass: 0.0,
        }
    }

    /// Replace the tunable coefficients and reset filter state.
    ///
    /// Accumulated EMA history is calibrated to the old coefficients;
    /// mixing it with new ones would yield an inconsistently scaled
    /// signal, so the swap always starts the filters over.
    pub fn set_tuning(&mut self, alpha_flow: f64, deriv_gain: f64) {
        self.alpha_flow = alpha_flow;
        self.deriv_gain = deriv_gain;
        self.reset();
    }

    /// Zero all filter state.
    pub fn reset(&mut self) {
        self.fast_ema = 0.0;
        self.slow_ema = 0.0;
        self.prev_flow = 0.0;
        self.flow_lowpass = 0.0;
    }

    /// Advance one sample step and return the conditioned flow value.
    pub fn update(&mut self, raw_c: f64) -> f64 {
        self.fast_ema = (1.0 - ALPHA_FAST) * self.fast_ema + ALPHA_FAST * raw_c;
        self.slow_ema = (1.0 - ALPHA_SLOW) * self.slow_ema + ALPHA_SLOW * raw_c;

        // Inhale cools the sensor: fast under slow means positive flow.
        let flow = -(self.fast_ema - self.slow_ema);

        let dflow = (flow - self.prev_flow) / DT;
        self.prev_flow = flow;

        self.flow_lowpass = (1.0 - self.alpha_flow) * self.flow_lowpass
            + self.alpha_flow * (flow + self.deriv_gain * dflow);

        self.flow_lowpass
    }
}

/// Dual-sided leaky peak-hold gain with a floored scale.
///
/// Each sign keeps its own peak tracker (decayed multiplicatively every
/// step, pulled up instantly by a larger sample) and an EMA of that peak
/// as the active scale. The floor keeps division finite on a near-silent
/// signal; output is not hard-clipped beyond that.
#[derive(Debug, Clone)]
pub struct FlowNormalizer {
    peak_exhale: f64,
    peak_inhale: f64,
    scale_exhale: f64,
    scale_inhale: f64,
    prev_norm: f64,
}

impl Default for FlowNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowNormalizer {
    pub fn new() -> Self {
        Self {
            peak_exhale: SCALE_SEED,
            peak_inhale: SCALE_SEED,
            scale_exhale: SCALE_SEED,
            scale_inhale: SCALE_SEED,
            prev_norm: 0.0,
        }
    }

    /// Restore the seeded construction state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Scale applied to positive flow.
    pub fn scale_exhale(&self) -> f64 {
        self.scale_exhale
    }

    /// Scale applied to negative flow.
    pub fn scale_inhale(&self) -> f64 {
        self.scale_inhale
    }

    /// Advance one sample step; returns `(norm, dnorm)`.
    pub fn update(&mut self, flow: f64) -> (f64, f64) {
        if flow > 0.0 {
            self.peak_exhale = (self.peak_exhale * LEAK_DECAY).max(flow);
            self.scale_exhale = ((1.0 - EMA_MAG) * self.scale_exhale
                + EMA_MAG * self.peak_exhale)
                .max(SCALE_FLOOR);
        } else if flow < 0.0 {
            let magnitude = -flow;
            self.peak_inhale = (self.peak_inhale * LEAK_DECAY).max(magnitude);
            self.scale_inhale = ((1.0 - EMA_MAG) * self.scale_inhale
                + EMA_MAG * self.peak_inhale)
                .max(SCALE_FLOOR);
        }

        let denom = if flow >= 0.0 {
            self.scale_exhale
        } else {
            self.scale_inhale
        }
        .max(1e-6);

        let norm = flow / denom;
        let dnorm = (norm - self.prev_norm) / DT;
        self.prev_norm = norm;

        (norm, dnorm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditioner_sign_convention() {
        let mut conditioner = FlowConditioner::new(0.22, 0.18);

        // Settle at ambient (the slow EMA needs ~30 s), then drop the
        // reading (inhaled air cooling the sensor). Flow must go positive.
        for _ in 0..3000 {
            conditioner.update(30.0);
        }
        let mut flow = 0.0;
        for _ in 0..20 {
            flow = conditioner.update(28.0);
        }
        assert!(flow > 0.0, "cooling should read as positive flow, got {flow}");
    }

    #[test]
    fn test_conditioner_settles_to_zero_on_constant_input() {
        let mut conditioner = FlowConditioner::new(0.22, 0.18);

        let mut flow = 1.0;
        for _ in 0..5000 {
            flow = conditioner.update(31.5);
        }
        assert!(flow.abs() < 1e-3, "steady input should settle, got {flow}");
    }

    #[test]
    fn test_set_tuning_resets_state_idempotently() {
        let mut a = FlowConditioner::new(0.22, 0.18);
        let mut b = FlowConditioner::new(0.22, 0.18);

        for i in 0..100 {
            a.update(30.0 + (i as f64) * 0.01);
        }

        // Same preset applied to both must leave identical state no
        // matter what history each had.
        a.set_tuning(0.18, 0.12);
        b.set_tuning(0.18, 0.12);
        assert_eq!(a.update(30.0).to_bits(), b.update(30.0).to_bits());
    }

    #[test]
    fn test_scales_never_drop_below_floor() {
        let mut normalizer = FlowNormalizer::new();

        // A long run of tiny alternating flow decays the peaks hard.
        for i in 0..20_000 {
            let flow = if i % 2 == 0 { 1e-9 } else { -1e-9 };
            normalizer.update(flow);
            assert!(normalizer.scale_exhale() >= SCALE_FLOOR);
            assert!(normalizer.scale_inhale() >= SCALE_FLOOR);
        }
    }

    #[test]
    fn test_peak_hold_tracks_new_peak_instantly() {
        let mut normalizer = FlowNormalizer::new();

        let (norm_small, _) = normalizer.update(0.05);
        assert!(norm_small.abs() < 2.0);

        // A sample far above the held peak pulls the peak (not the scale)
        // up immediately; the EMA scale follows over subsequent steps.
        let (first, _) = normalizer.update(1.0);
        let mut last = first;
        for _ in 0..50 {
            let (n, _) = normalizer.update(1.0);
            last = n;
        }
        assert!(last < first, "scale should adapt up, shrinking norm");
        assert!(last > 0.9 && last < 1.3, "steady signal normalizes near 1, got {last}");
    }

    #[test]
    fn test_sides_adapt_independently() {
        let mut normalizer = FlowNormalizer::new();

        // Strong positive half, weak negative half.
        for _ in 0..200 {
            normalizer.update(1.0);
            normalizer.update(-0.1);
        }
        assert!(normalizer.scale_exhale() > 5.0 * normalizer.scale_inhale());
    }

    #[test]
    fn test_dnorm_is_finite_difference() {
        let mut normalizer = FlowNormalizer::new();

        let (n1, _) = normalizer.update(0.05);
        let (n2, d2) = normalizer.update(0.08);
        assert!((d2 - (n2 - n1) / DT).abs() < 1e-9);
    }
}
