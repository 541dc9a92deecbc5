//! CLI entry point for psu-waveform
//!
//! Provides command-line access to:
//! - Previewing a waveform profile without touching hardware
//! - Executing a run plan against the simulated supply
//! - Listing the available waveform kinds
//!
//! # Usage
//!
//! ```bash
//! psu-waveform preview --waveform sine --target 5 --cycles 1 --points 5 --duration 4
//! psu-waveform run --plan config/plan.example.toml
//! psu-waveform kinds
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use psu_waveform::config::{RunPlan, Settings};
use psu_waveform::hardware::mock::MockPowerSupply;
use psu_waveform::hardware::SerializedSupply;
use psu_waveform::logging;
use psu_waveform::{generate, RunOutcome, WaveformEngine, WaveformKind, WaveformSpec};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "psu-waveform")]
#[command(about = "Waveform synthesis and paced execution for bench power supplies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the (time, voltage) profile of a waveform
    Preview {
        /// Waveform kind, e.g. sine, "ramp up", ecg
        #[arg(long, default_value = "sine")]
        waveform: String,

        /// Peak voltage
        #[arg(long, default_value_t = 3.0)]
        target: f64,

        /// Number of cycles
        #[arg(long, default_value_t = 3)]
        cycles: u32,

        /// Points per cycle
        #[arg(long, default_value_t = 50)]
        points: u32,

        /// Seconds per cycle
        #[arg(long, default_value_t = 8.0)]
        duration: f64,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Execute a run plan against the simulated supply
    Run {
        /// Settings file (defaults to config/psu_waveform.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Run plan file
        #[arg(long)]
        plan: PathBuf,

        /// Simulated per-command bus latency in milliseconds
        #[arg(long, default_value_t = 2)]
        latency_ms: u64,
    },

    /// List waveform kinds
    Kinds,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Preview {
            waveform,
            target,
            cycles,
            points,
            duration,
            json,
        } => preview(&waveform, target, cycles, points, duration, json),
        Commands::Run {
            config,
            plan,
            latency_ms,
        } => run_plan(config, plan, latency_ms).await,
        Commands::Kinds => {
            for kind in WaveformKind::ALL {
                println!("{kind}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn preview(
    waveform: &str,
    target: f64,
    cycles: u32,
    points: u32,
    duration: f64,
    json: bool,
) -> Result<ExitCode> {
    let kind: WaveformKind = waveform.parse()?;
    let spec = WaveformSpec::new(kind, target, cycles, points, duration);
    let profile = generate(&spec);

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{kind}: {:.3} V peak, {} x {} points, {:.3} s/cycle",
        spec.target_voltage(),
        spec.cycles(),
        spec.points_per_cycle(),
        spec.cycle_duration()
    );
    println!("{:>6}  {:>10}  {:>10}", "index", "time [s]", "voltage [V]");
    for (index, point) in profile.points().iter().enumerate() {
        println!("{index:>6}  {:>10.6}  {:>10.6}", point.time, point.voltage);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_plan(config: Option<PathBuf>, plan: PathBuf, latency_ms: u64) -> Result<ExitCode> {
    let settings = match &config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("Failed to load settings")?;
    settings.validate()?;
    logging::init_from_settings(&settings)?;

    let plan = RunPlan::load_from(&plan)
        .with_context(|| format!("Failed to load run plan {}", plan.display()))?;
    let request = plan.to_request(&settings)?;

    let supply = SerializedSupply::new(
        MockPowerSupply::new().with_latency(Duration::from_millis(latency_ms)),
    );
    let engine = WaveformEngine::from_settings(Arc::new(supply), &settings);
    let run_id = engine.start(request)?;
    info!(%run_id, "Run started; press Ctrl-C to stop");

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut last_status = String::new();
    while engine.is_running() {
        tokio::select! {
            _ = ticker.tick() => {
                let status = engine.status_message();
                if status != last_status {
                    println!("{status}");
                    last_status = status;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping...");
                engine.stop();
            }
        }
    }

    let outcome = tokio::task::block_in_place(|| engine.wait());
    println!("{}", engine.status_message());
    println!("{} records", engine.records().len());

    Ok(match outcome {
        Some(RunOutcome::Failed(_)) | None => ExitCode::FAILURE,
        Some(_) => ExitCode::SUCCESS,
    })
}
