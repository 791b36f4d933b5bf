//! Sample sources and thermistor conversion
//!
//! The detector never touches hardware. It pulls one reading per internal
//! step from an injected [`SampleSource`], which lets firmware hand it a
//! real ADC-backed source and lets tests hand it a synthetic one.

use std::cell::Cell;
use std::rc::Rc;

/// One synchronous, non-blocking reading per internal sample step.
///
/// Implementations must not block; the detector calls `read` from its
/// catch-up loop and assumes the call returns immediately.
pub trait SampleSource {
    /// Current sensor reading in degrees Celsius.
    fn read(&mut self) -> f64;
}

/// Closures work directly as sources, which keeps synthetic signals in
/// tests and examples to a one-liner.
impl<F: FnMut() -> f64> SampleSource for F {
    fn read(&mut self) -> f64 {
        self()
    }
}

/// Sample-and-hold cell for push-style embedders.
///
/// The embedder keeps one handle and pushes readings as its ADC produces
/// them; the detector owns the other handle and reads whatever value is
/// held when a sample step falls due. Used by the FFI surface and trace
/// replay.
#[derive(Debug, Clone)]
pub struct SharedSample {
    value: Rc<Cell<f64>>,
}

impl SharedSample {
    pub fn new(initial: f64) -> Self {
        Self {
            value: Rc::new(Cell::new(initial)),
        }
    }

    /// Replace the held reading.
    pub fn set(&self, value: f64) {
        self.value.set(value);
    }

    /// Current held reading.
    pub fn get(&self) -> f64 {
        self.value.get()
    }
}

impl SampleSource for SharedSample {
    fn read(&mut self) -> f64 {
        self.value.get()
    }
}

/// NTC thermistor divider circuit, for embedders converting raw ADC
/// counts to Celsius before pushing them into the detector.
///
/// Uses the Beta equation against a reference resistor divider. Counts
/// are clamped to the open interval of the ADC range so the divider and
/// logarithm stay finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermistorCircuit {
    /// Full-scale ADC reading.
    pub adc_max: f64,
    /// Supply voltage across the divider.
    pub supply_v: f64,
    /// Reference resistor in ohms.
    pub r_ref: f64,
    /// Thermistor resistance at the reference temperature, in ohms.
    pub r0: f64,
    /// Beta coefficient of the thermistor.
    pub beta: f64,
    /// Reference temperature in Celsius.
    pub t0_c: f64,
}

impl Default for ThermistorCircuit {
    fn default() -> Self {
        Self {
            adc_max: 65535.0,
            supply_v: 3.3,
            r_ref: 10_000.0,
            r0: 10_000.0,
            beta: 3435.0,
            t0_c: 25.0,
        }
    }
}

impl ThermistorCircuit {
    /// Convert a raw ADC reading to degrees Celsius.
    pub fn temperature_c(&self, raw_counts: f64) -> f64 {
        let counts = raw_counts.clamp(1.0, self.adc_max - 1.0);
        let v = (counts / self.adc_max) * self.supply_v;
        let r_ntc = (self.r_ref * v) / (self.supply_v - v).max(1e-6);
        let inv_t = 1.0 / (self.t0_c + 273.15) + (1.0 / self.beta) * (r_ntc / self.r0).ln();
        1.0 / inv_t - 273.15
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_sample_push_and_read() {
        let handle = SharedSample::new(20.0);
        let mut source = handle.clone();

        assert!((source.read() - 20.0).abs() < 1e-12);
        handle.set(25.5);
        assert!((source.read() - 25.5).abs() < 1e-12);
    }

    #[test]
    fn test_closure_is_a_source() {
        let mut t = 0.0;
        let mut source = move || {
            t += 1.0;
            t
        };
        assert!((SampleSource::read(&mut source) - 1.0).abs() < 1e-12);
        assert!((SampleSource::read(&mut source) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_thermistor_reference_point() {
        let circuit = ThermistorCircuit::default();

        // Equal divider legs put the node at mid-scale and the thermistor
        // at r0, which is the reference temperature by definition.
        let mid = circuit.adc_max / 2.0;
        let t = circuit.temperature_c(mid);
        assert!((t - circuit.t0_c).abs() < 0.05, "got {t}");
    }

    #[test]
    fn test_thermistor_monotonic_decreasing_in_counts() {
        let circuit = ThermistorCircuit::default();

        // Higher counts = higher NTC resistance = colder.
        let mut prev = circuit.temperature_c(1000.0);
        for counts in [10_000.0, 30_000.0, 50_000.0, 64_000.0] {
            let t = circuit.temperature_c(counts);
            assert!(t < prev, "{counts} counts gave {t} >= {prev}");
            prev = t;
        }
    }

    #[test]
    fn test_thermistor_clamps_out_of_range_counts() {
        let circuit = ThermistorCircuit::default();

        let low = circuit.temperature_c(-5.0);
        let high = circuit.temperature_c(1e9);
        assert!(low.is_finite());
        assert!(high.is_finite());
        assert_eq!(low, circuit.temperature_c(1.0));
        assert_eq!(high, circuit.temperature_c(circuit.adc_max - 1.0));
    }
}
