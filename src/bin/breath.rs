//! Breath CLI - Command-line interface for respire-core
//!
//! Commands:
//! - run: Stream NDJSON sensor samples from stdin, emit snapshots
//! - analyze: Replay a trace file and print a session report
//! - presets: Print the sensitivity preset table

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use respire_core::detector::BreathDetector;
use respire_core::replay::{parse_ndjson, run_trace, ReplayError, TraceSample};
use respire_core::sensor::SharedSample;
use respire_core::{PRODUCER_NAME, SENSITIVITY_PRESETS, VERSION};

/// Respire - breath phase detection from thermal sensor traces
#[derive(Parser)]
#[command(name = "breath")]
#[command(author = "Respire Labs")]
#[command(version = VERSION)]
#[command(about = "Detect breath phases and quality metrics from sensor samples", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream NDJSON samples from stdin, emit NDJSON snapshots
    Run {
        /// Sensitivity preset (0 = least, 9 = most sensitive)
        #[arg(long, default_value = "5")]
        preset: usize,

        /// Attach the mood scoring stage
        #[arg(long)]
        scores: bool,

        /// Emit a snapshot for every sample instead of transitions only
        #[arg(long)]
        every_sample: bool,

        /// Flush output after each snapshot
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Replay a trace file and print a session report
    Analyze {
        /// Input trace path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Sensitivity preset (0 = least, 9 = most sensitive)
        #[arg(long, default_value = "5")]
        preset: usize,

        /// Attach the mood scoring stage
        #[arg(long)]
        scores: bool,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Print the sensitivity preset table
    Presets,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), BreathCliError> {
    match cli.command {
        Commands::Run {
            preset,
            scores,
            every_sample,
            flush,
        } => cmd_run(preset, scores, every_sample, flush),

        Commands::Analyze {
            input,
            preset,
            scores,
            pretty,
        } => cmd_analyze(&input, preset, scores, pretty),

        Commands::Presets => cmd_presets(),
    }
}

fn cmd_run(
    preset: usize,
    scores: bool,
    every_sample: bool,
    flush: bool,
) -> Result<(), BreathCliError> {
    if atty::is(atty::Stream::Stdin) {
        eprintln!("breath run: reading NDJSON samples from stdin (pipe a trace, or Ctrl-D to end)");
    }

    let held = SharedSample::new(0.0);
    let pushed = held.clone();
    let mut detector: Option<BreathDetector<SharedSample>> = None;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let sample: TraceSample = serde_json::from_str(trimmed)
            .map_err(|e| BreathCliError::ParseError(format!("Failed to parse sample: {}", e)))?;

        // First sample fixes the session's time origin.
        let detector = detector.get_or_insert_with(|| {
            pushed.set(sample.raw);
            let mut d = if scores {
                BreathDetector::with_scoring(held.clone(), sample.t)
            } else {
                BreathDetector::new(held.clone(), sample.t)
            };
            d.apply_sensitivity(preset);
            d
        });

        pushed.set(sample.raw);
        let transition = detector.tick(sample.t);

        if transition || every_sample {
            let snapshot = detector.snapshot();
            writeln!(stdout, "{}", serde_json::to_string(&snapshot)?)?;
            if flush {
                stdout.flush()?;
            }
        }
    }

    if detector.is_none() {
        return Err(BreathCliError::NoSamples);
    }

    Ok(())
}

fn cmd_analyze(
    input: &PathBuf,
    preset: usize,
    scores: bool,
    pretty: bool,
) -> Result<(), BreathCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let samples = parse_ndjson(&input_data)?;
    let report = run_trace(&samples, preset, scores)?;

    if pretty {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", serde_json::to_string(&report)?);
    }

    Ok(())
}

fn cmd_presets() -> Result<(), BreathCliError> {
    println!("{} {} sensitivity presets", PRODUCER_NAME, VERSION);
    println!();
    println!("idx  alpha_flow  deriv_gain  th_start  th_end");
    for (i, p) in SENSITIVITY_PRESETS.iter().enumerate() {
        println!(
            "{:>3}  {:>10.2}  {:>10.2}  {:>8.2}  {:>6.2}",
            i, p.alpha_flow, p.deriv_gain, p.th_start, p.th_end
        );
    }
    println!();
    println!("0 = least sensitive, 9 = most sensitive (default 5)");
    Ok(())
}

// Error types

#[derive(Debug)]
enum BreathCliError {
    Io(io::Error),
    Replay(ReplayError),
    Json(serde_json::Error),
    NoSamples,
    ParseError(String),
}

impl From<io::Error> for BreathCliError {
    fn from(e: io::Error) -> Self {
        BreathCliError::Io(e)
    }
}

impl From<ReplayError> for BreathCliError {
    fn from(e: ReplayError) -> Self {
        BreathCliError::Replay(e)
    }
}

impl From<serde_json::Error> for BreathCliError {
    fn from(e: serde_json::Error) -> Self {
        BreathCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<BreathCliError> for CliError {
    fn from(e: BreathCliError) -> Self {
        match e {
            BreathCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            BreathCliError::Replay(e) => CliError {
                code: "REPLAY_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Traces are NDJSON lines of {\"t\": seconds, \"raw\": celsius}".to_string()),
            },
            BreathCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            BreathCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure the trace is not empty".to_string()),
            },
            BreathCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}
