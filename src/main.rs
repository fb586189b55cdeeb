//! Orthotune CLI — thin wrapper over the engine entry points.
//!
//! # Usage
//!
//! ```bash
//! # Run a new experiment
//! orthotune --config experiment.toml
//!
//! # Resume an interrupted experiment
//! orthotune --resume ./orthotune-out/orthotune-state.json
//!
//! # Re-run only the analysis over an existing checkpoint
//! orthotune --report-only ./orthotune-out/orthotune-state.json
//! ```
//!
//! The report payload is written as JSON next to the checkpoint; report
//! rendering (HTML, Markdown) is a downstream concern.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use orthotune::{analyze_only, resume, start, EngineConfig, ExperimentOutcome};

#[derive(Parser, Debug)]
#[command(name = "orthotune")]
#[command(about = "Taguchi-method parameter optimization for black-box programs")]
#[command(version)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["config", "resume", "report_only"]),
))]
struct CliArgs {
    /// Start a new experiment from a TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Resume an interrupted experiment from its checkpoint
    #[arg(long, value_name = "STATE")]
    resume: Option<PathBuf>,

    /// Re-run the analysis over an existing checkpoint, no execution
    #[arg(long, value_name = "STATE")]
    report_only: Option<PathBuf>,

    /// Verbose engine logging (RUST_LOG overrides this)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    let cancel = CancellationToken::new();
    let outcome = dispatch(&args, &cancel).map_err(|e| {
        error!("{e}");
        e
    })?;

    let report_path = outcome
        .state_path
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join("orthotune-report.json");
    let json = serde_json::to_string_pretty(&outcome.report)
        .context("failed to serialize report payload")?;
    std::fs::write(&report_path, json)
        .with_context(|| format!("failed to write report to {}", report_path.display()))?;

    info!(path = %report_path.display(), "report payload written");
    for metric in &outcome.report.metrics {
        info!(
            metric = %metric.metric,
            optimal = ?metric.optimal,
            predicted = metric.prediction.raw_predicted,
            "optimal configuration"
        );
    }
    Ok(())
}

fn dispatch(args: &CliArgs, cancel: &CancellationToken) -> Result<ExperimentOutcome> {
    if let Some(path) = &args.config {
        let config = EngineConfig::load_from_file(path)?;
        return Ok(start(config, cancel)?);
    }
    if let Some(path) = &args.resume {
        return Ok(resume(path, cancel)?);
    }
    if let Some(path) = &args.report_only {
        return Ok(analyze_only(path)?);
    }
    unreachable!("clap enforces exactly one mode");
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "orthotune=debug" } else { "orthotune=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
