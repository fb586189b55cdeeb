//! Experiment controller: Design → Execute → Analyze.
//!
//! The controller owns the result store for the duration of a run, drives
//! one trial at a time in ascending run order, checkpoints after every
//! trial, and hands the statistics engine a read-only view at the end. A
//! cancellation token is honored between trials and repetitions; state is
//! always checkpointed before an early return, so `resume` can pick up at
//! the first incomplete run.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointState, Checkpointer};
use crate::config::EngineConfig;
use crate::driver::{TrialDriver, TrialError};
use crate::error::{EngineError, EngineWarning};
use crate::factors::Factor;
use crate::lockfile::ProcessLock;
use crate::oa::{catalog, DesignAssignment, OrthogonalArray};
use crate::report::{self, ReportPayload};
use crate::stats;
use crate::store::ResultStore;

/// What a completed engine invocation hands back.
#[derive(Debug)]
pub struct ExperimentOutcome {
    pub report: ReportPayload,
    /// Path of the checkpoint the experiment can be re-analyzed from.
    pub state_path: PathBuf,
}

/// Start a fresh experiment from a validated configuration.
pub fn start(
    config: EngineConfig,
    cancel: &CancellationToken,
) -> Result<ExperimentOutcome, EngineError> {
    config.validate()?;
    let control = config.build_control_factors()?;
    let noise = config.build_noise_factors()?;
    let interactions = config.interaction_pairs();

    let array = catalog::select_array(&control, &interactions)?;
    let assignment = DesignAssignment::build(array, &control, &interactions)?;
    info!(
        array = array.designation(),
        runs = array.runs(),
        factors = control.len(),
        interactions = interactions.len(),
        "experiment designed"
    );

    let output_dir = config.experiment.output_directory.clone();
    let lock = ProcessLock::acquire(&output_dir)?;
    let checkpointer = Checkpointer::new(&output_dir);

    let store = ResultStore::new(config.experiment.repetitions);
    let mut state = CheckpointState::new(config, assignment, store);
    checkpointer.save(&mut state)?;

    run_and_analyze(state, array, control, noise, checkpointer, lock, cancel)
}

/// Resume an interrupted experiment from its checkpoint.
pub fn resume(
    state_path: &Path,
    cancel: &CancellationToken,
) -> Result<ExperimentOutcome, EngineError> {
    let state = Checkpointer::load(state_path)?;
    let array = catalog::find_array(&state.array)?;
    let control = state.config.build_control_factors()?;
    let noise = state.config.build_noise_factors()?;

    let completed = (1..=array.runs())
        .filter(|&r| state.store.is_complete(r))
        .count();
    info!(
        array = array.designation(),
        completed,
        total = array.runs(),
        "resuming experiment"
    );

    let lock = ProcessLock::acquire(&state.config.experiment.output_directory)?;
    let checkpointer = Checkpointer::at(state_path.to_path_buf());
    run_and_analyze(state, array, control, noise, checkpointer, lock, cancel)
}

/// Re-run the analysis over an existing checkpoint without touching the
/// target. Incomplete runs are analyzed as-is, with warnings.
pub fn analyze_only(state_path: &Path) -> Result<ExperimentOutcome, EngineError> {
    let state = Checkpointer::load(state_path)?;
    let array = catalog::find_array(&state.array)?;
    let control = state.config.build_control_factors()?;
    analyze(&state, array, &control, &[], state_path.to_path_buf())
}

/// Execution loop plus analysis, shared by `start` and `resume`.
fn run_and_analyze(
    mut state: CheckpointState,
    array: &'static OrthogonalArray,
    control: Vec<Factor>,
    noise: Vec<Factor>,
    checkpointer: Checkpointer,
    lock: ProcessLock,
    cancel: &CancellationToken,
) -> Result<ExperimentOutcome, EngineError> {
    let mut execution_warnings: Vec<EngineWarning> = Vec::new();
    let repetitions = state.config.experiment.repetitions;

    for run in 1..=array.runs() {
        if state.store.is_complete(run) {
            continue;
        }
        if cancel.is_cancelled() {
            checkpointer.save(&mut state)?;
            return Err(EngineError::Cancelled {
                completed_runs: run - 1,
            });
        }

        let row = state.assignment.trial_row(array, &control, run)?;
        let start_repetition = state.store.next_repetition(run);
        info!(run, start_repetition, repetitions, "executing trial");

        let driver = TrialDriver::new(&state.config, &control, &noise);
        let outcome = driver.run_trial(&row, start_repetition, repetitions, cancel)?;
        for reading in outcome.readings {
            state.store.record(run, reading);
        }
        execution_warnings.extend(outcome.warnings);
        checkpointer.save(&mut state)?;

        if outcome.cancelled {
            return Err(EngineError::Cancelled {
                completed_runs: run - 1,
            });
        }
        if outcome.failed {
            if state.config.execution.abort_on_trial_failure {
                let repetition = state.store.recorded(run);
                return Err(EngineError::Trial(TrialError::Failed {
                    run,
                    repetition,
                    attempts: state.config.execution.trial_retries + 1,
                }));
            }
            warn!(run, "trial recorded missing repetitions, continuing");
        }
    }

    drop(lock);
    let state_path = checkpointer.path().to_path_buf();
    analyze(&state, array, &control, &execution_warnings, state_path)
}

/// Per-metric analysis over the (now read-only) result store.
fn analyze(
    state: &CheckpointState,
    array: &OrthogonalArray,
    control: &[Factor],
    execution_warnings: &[EngineWarning],
    state_path: PathBuf,
) -> Result<ExperimentOutcome, EngineError> {
    let analyses: Vec<stats::MetricAnalysis> = state
        .config
        .metrics
        .iter()
        .map(|spec| {
            stats::analyze_metric(
                spec,
                &state.config.analysis,
                &state.store,
                array,
                &state.assignment,
                control,
            )
        })
        .collect();

    for analysis in &analyses {
        info!(
            metric = %analysis.metric,
            sn_type = analysis.sn_type,
            warnings = analysis.warnings.len(),
            "metric analyzed"
        );
    }

    let report = report::assemble(
        &state.config,
        array,
        &state.assignment,
        control,
        analyses,
        execution_warnings,
    );
    Ok(ExperimentOutcome { report, state_path })
}
