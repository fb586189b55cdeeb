//! Trial driver: one designed row in, repetition readings out.
//!
//! For each repetition the driver cycles the noise factors, assembles the
//! invocation, launches the target and parses the sentinel response.
//! Timeouts and parse failures are retried a fixed number of times; an
//! exhausted repetition is recorded as missing so the experiment can
//! continue without it. The driver is synchronous: it blocks on subprocess
//! completion and nothing else.

pub mod exec;
pub mod invocation;
pub mod response;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, FixedArg};
use crate::error::EngineWarning;
use crate::factors::{Factor, Level};
use crate::oa::TrialRow;
use crate::store::MetricReading;

pub use exec::{CapturedOutput, ExecError};
pub use invocation::{assemble, Invocation};
pub use response::{parse_response, ResponseError, RESULT_SENTINEL};

/// Trial-level errors. Timeouts and parse failures are retried before
/// surfacing; `Spawn` is immediate (the target binary itself is broken).
#[derive(Debug, thiserror::Error)]
pub enum TrialError {
    #[error("run {run} repetition {repetition}: target exceeded the {timeout_secs}s timeout")]
    Timeout {
        run: usize,
        repetition: usize,
        timeout_secs: u64,
    },
    #[error("run {run} repetition {repetition}: {reason}")]
    ResponseParse {
        run: usize,
        repetition: usize,
        reason: String,
    },
    #[error(transparent)]
    Spawn(ExecError),
    #[error("run {run} failed: repetition {repetition} exhausted {attempts} attempts")]
    Failed {
        run: usize,
        repetition: usize,
        attempts: u32,
    },
}

/// What one `run_trial` call produced.
#[derive(Debug, Default)]
pub struct TrialOutcome {
    /// One slot per executed repetition, in order; `None` is a failure
    /// after retry exhaustion.
    pub readings: Vec<Option<MetricReading>>,
    pub warnings: Vec<EngineWarning>,
    /// True when any repetition exhausted its retries.
    pub failed: bool,
    /// True when cancellation stopped the trial early; `readings` holds
    /// only the repetitions completed before the stop.
    pub cancelled: bool,
}

/// Drives the external target for one trial at a time.
pub struct TrialDriver<'a> {
    target: &'a Path,
    fixed_args: &'a [FixedArg],
    fixed_env: &'a BTreeMap<String, String>,
    control_factors: &'a [Factor],
    noise_factors: &'a [Factor],
    timeout: Duration,
    retries: u32,
    show_target_output: bool,
}

impl<'a> TrialDriver<'a> {
    pub fn new(
        config: &'a EngineConfig,
        control_factors: &'a [Factor],
        noise_factors: &'a [Factor],
    ) -> Self {
        Self {
            target: &config.experiment.target_executable,
            fixed_args: &config.fixed_args,
            fixed_env: &config.fixed_env,
            control_factors,
            noise_factors,
            timeout: Duration::from_secs(config.execution.trial_timeout_secs),
            retries: config.execution.trial_retries,
            show_target_output: config.execution.show_target_output,
        }
    }

    /// Execute repetitions `start_repetition..=repetitions` of one row.
    ///
    /// Repetition indices are absolute so a resumed run keeps its noise
    /// cycle aligned. The cancellation token is checked between
    /// repetitions; a cancelled trial returns its partial readings.
    pub fn run_trial(
        &self,
        row: &TrialRow,
        start_repetition: usize,
        repetitions: usize,
        cancel: &CancellationToken,
    ) -> Result<TrialOutcome, TrialError> {
        let mut outcome = TrialOutcome::default();

        let control: Vec<(&Factor, &Level)> = self
            .control_factors
            .iter()
            .filter_map(|f| row.levels.get(&f.name).map(|l| (f, l)))
            .collect();

        for repetition in start_repetition..=repetitions {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }

            let noise: Vec<(&Factor, &Level)> = self
                .noise_factors
                .iter()
                .map(|f| (f, f.level_for_repetition(repetition)))
                .collect();

            let (invocation, mut assembly_warnings) = assemble(
                self.target,
                self.fixed_args,
                self.fixed_env,
                &control,
                &noise,
            );
            // The same collision repeats every repetition; report it once
            // per trial.
            if repetition == start_repetition {
                outcome.warnings.append(&mut assembly_warnings);
            }

            match self.attempt_with_retries(&invocation, row.run, repetition)? {
                Ok((reading, mut parse_warnings)) => {
                    outcome.warnings.append(&mut parse_warnings);
                    outcome.readings.push(Some(reading));
                }
                Err(reason) => {
                    outcome.warnings.push(EngineWarning::RepetitionFailed {
                        run: row.run,
                        repetition,
                        reason,
                    });
                    outcome.readings.push(None);
                    outcome.failed = true;
                }
            }
        }

        Ok(outcome)
    }

    /// Run one repetition, retrying timeouts and parse failures.
    ///
    /// The outer `Result` is fatal (spawn failure); the inner one reports
    /// retry exhaustion with the last failure's description.
    fn attempt_with_retries(
        &self,
        invocation: &Invocation,
        run: usize,
        repetition: usize,
    ) -> Result<Result<(MetricReading, Vec<EngineWarning>), String>, TrialError> {
        let attempts = self.retries + 1;
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            debug!(run, repetition, attempt, target = %invocation.program.display(), "launching target");
            let output = match exec::execute(invocation, self.timeout) {
                Ok(output) => output,
                Err(ExecError::TimedOut(_)) => {
                    let e = TrialError::Timeout {
                        run,
                        repetition,
                        timeout_secs: self.timeout.as_secs(),
                    };
                    warn!(run, repetition, attempt, "{e}");
                    last_failure = e.to_string();
                    continue;
                }
                Err(e @ ExecError::Spawn { .. }) => return Err(TrialError::Spawn(e)),
                Err(e @ ExecError::Capture(_)) => return Err(TrialError::Spawn(e)),
            };

            if self.show_target_output {
                info!(run, repetition, "target stdout:\n{}", output.stdout.trim_end());
                if !output.stderr.is_empty() {
                    info!(run, repetition, "target stderr:\n{}", output.stderr.trim_end());
                }
            }

            match parse_response(&output.stdout, run, repetition) {
                Ok(parsed) => return Ok(Ok(parsed)),
                Err(e) => {
                    let e = TrialError::ResponseParse {
                        run,
                        repetition,
                        reason: e.to_string(),
                    };
                    warn!(run, repetition, attempt, exit_code = ?output.exit_code, "{e}");
                    last_failure = e.to_string();
                }
            }
        }

        warn!(
            run,
            repetition, attempts, "repetition failed after all attempts"
        );
        Ok(Err(last_failure))
    }
}
