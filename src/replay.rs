//! Trace replay
//!
//! Runs a recorded (or synthesized) sensor trace through a detector and
//! summarizes the session. Traces are NDJSON, one sample per line:
//!
//! ```text
//! {"t": 0.00, "raw": 31.02}
//! {"t": 0.01, "raw": 31.01}
//! ```
//!
//! `t` is monotonic seconds, `raw` the sensor reading in Celsius. Replay
//! drives the detector exactly like an embedder would: hold the latest
//! reading, then tick with the sample's timestamp.

use crate::detector::BreathDetector;
use crate::sensor::SharedSample;
use crate::types::BreathSnapshot;
use crate::{PRODUCER_NAME, VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors at the trace boundary. The detector itself has no failure path;
/// everything here is about the input.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("trace line {line}: {source}")]
    MalformedLine {
        line: usize,
        source: serde_json::Error,
    },

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("trace contains no samples")]
    EmptyTrace,

    #[error("trace line {line}: timestamp went backwards")]
    NonMonotonicTime { line: usize },
}

/// One trace sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    /// Monotonic time in seconds.
    pub t: f64,
    /// Sensor reading in Celsius.
    pub raw: f64,
}

/// Producer block stamped onto every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
}

impl ReportProducer {
    fn current() -> Self {
        Self {
            name: PRODUCER_NAME.to_string(),
            version: VERSION.to_string(),
            instance_id: Uuid::new_v4(),
        }
    }
}

/// Summary of a replayed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub producer: ReportProducer,
    pub computed_at_utc: DateTime<Utc>,
    /// Samples consumed from the trace.
    pub samples: usize,
    /// Trace time span in seconds.
    pub duration_s: f64,
    /// Tick calls that reported a phase transition.
    pub transitions: u32,
    /// Detector state after the last sample.
    pub final_state: BreathSnapshot,
}

/// Parse an NDJSON trace. Blank lines are skipped; the first malformed
/// line aborts with its line number.
pub fn parse_ndjson(input: &str) -> Result<Vec<TraceSample>, ReplayError> {
    let mut samples = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let sample: TraceSample = serde_json::from_str(trimmed)
            .map_err(|source| ReplayError::MalformedLine {
                line: idx + 1,
                source,
            })?;
        samples.push(sample);
    }
    Ok(samples)
}

/// Run a trace through a fresh detector and summarize the session.
pub fn run_trace(
    samples: &[TraceSample],
    preset_index: usize,
    with_scores: bool,
) -> Result<SessionReport, ReplayError> {
    let first = samples.first().ok_or(ReplayError::EmptyTrace)?;

    let held = SharedSample::new(first.raw);
    let pushed = held.clone();
    let mut detector = if with_scores {
        BreathDetector::with_scoring(held, first.t)
    } else {
        BreathDetector::new(held, first.t)
    };
    detector.apply_sensitivity(preset_index);

    let mut transitions = 0u32;
    let mut last_t = first.t;
    for (idx, sample) in samples.iter().enumerate() {
        if sample.t < last_t {
            return Err(ReplayError::NonMonotonicTime { line: idx + 1 });
        }
        last_t = sample.t;

        pushed.set(sample.raw);
        if detector.tick(sample.t) {
            transitions += 1;
        }
    }

    Ok(SessionReport {
        producer: ReportProducer::current(),
        computed_at_utc: Utc::now(),
        samples: samples.len(),
        duration_s: last_t - first.t,
        transitions,
        final_state: detector.snapshot(),
    })
}
