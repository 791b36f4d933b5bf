//! Respire Core - On-device breath detection and per-breath quality metrics
//!
//! Respire turns a single noisy temperature-proxy sensor into breath phases
//! and quality metrics through a deterministic per-sample pipeline:
//! conditioning → adaptive normalization → phase detection → validation
//! → metrics, with an optional mood scoring stage on top.
//!
//! ## Modules
//!
//! - **Detector**: the stateful per-session pipeline, ticked from the
//!   embedder's loop and read through fixed-shape snapshots
//! - **Replay**: run recorded sensor traces offline and summarize them
//!
//! The detector owns no hardware and no clock; samples and monotonic time
//! are injected, which keeps the whole pipeline deterministic under test.

pub mod config;
pub mod detector;
pub mod metrics;
pub mod mood;
pub mod phase;
pub mod recorder;
pub mod replay;
pub mod sensor;
pub mod signal;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{DepthThresholds, MoodThresholds, SensitivityPreset, SENSITIVITY_PRESETS};
pub use detector::BreathDetector;
pub use mood::{MoodScorer, ScoringStage};
pub use replay::{run_trace, ReplayError, SessionReport, TraceSample};
pub use sensor::{SampleSource, SharedSample, ThermistorCircuit};
pub use types::{BreathMetrics, BreathPhase, BreathSnapshot, DepthBand, MoodScores};

/// Library version embedded in session reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for session reports
pub const PRODUCER_NAME: &str = "respire-core";
