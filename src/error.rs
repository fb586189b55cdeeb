//! Crate-wide error umbrella and analysis warnings.
//!
//! Each subsystem defines its own `thiserror` enum next to its code
//! (`ConfigError`, `DesignError`, `TrialError`, ...); `EngineError` unifies
//! them at the controller boundary so callers match on one type.
//! Warnings are not errors: they travel in the report payload and never
//! abort analysis for other metrics.

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::driver::TrialError;
use crate::factors::FactorError;
use crate::lockfile::LockError;
use crate::oa::DesignError;

/// Fatal engine error. Configuration and design errors surface before any
/// trial is executed; trial errors surface only after the retry budget is
/// exhausted and the run is configured to abort.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Factor(#[from] FactorError),

    #[error(transparent)]
    Design(#[from] DesignError),

    #[error(transparent)]
    Trial(#[from] TrialError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("experiment cancelled — state checkpointed at run {completed_runs}")]
    Cancelled { completed_runs: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Warnings
// ============================================================================

/// A non-fatal condition observed during execution or analysis.
///
/// Warnings are collected per metric (statistics) or per experiment
/// (driver) and rendered into the report payload as strings.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineWarning {
    /// A metric value in the target's response was not a finite real;
    /// the value was dropped and the repetition retained.
    NonFiniteMetric {
        run: usize,
        repetition: usize,
        metric: String,
    },
    /// The S/N ratio is undefined for this run (e.g. a zero reading under
    /// larger-is-better); the run is dropped from this metric's analysis.
    SnUndefined {
        metric: String,
        run: usize,
        reason: String,
    },
    /// Nominal-is-best with a single repetition falls back to the
    /// squared-deviation formula.
    SingleRepetitionNominal { metric: String },
    /// The error term of the initial ANOVA is degenerate (zero DOF or
    /// zero sum of squares); pooling is forced.
    ZeroErrorDof { metric: String },
    /// A noise factor and a control factor bind the same CLI flag or
    /// environment variable; the noise value wins.
    NoiseOverridesControl { factor: String, binding: String },
    /// A repetition failed after exhausting its retry budget and was
    /// recorded as missing.
    RepetitionFailed {
        run: usize,
        repetition: usize,
        reason: String,
    },
    /// A run contributed no readings at all for this metric and was
    /// dropped from the analysis.
    MissingRunData { metric: String, run: usize },
    /// Raw-scale confidence bounds are a transform of the S/N-scale
    /// bounds and are approximate (or unavailable for nominal-is-best).
    ApproximateRawBounds { metric: String },
}

impl std::fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFiniteMetric {
                run,
                repetition,
                metric,
            } => write!(
                f,
                "run {run} repetition {repetition}: metric '{metric}' is not a finite number, value dropped"
            ),
            Self::SnUndefined { metric, run, reason } => write!(
                f,
                "metric '{metric}' run {run}: S/N ratio undefined ({reason}), run dropped from analysis"
            ),
            Self::SingleRepetitionNominal { metric } => write!(
                f,
                "metric '{metric}': nominal-is-best with one repetition, using squared-deviation fallback"
            ),
            Self::ZeroErrorDof { metric } => write!(
                f,
                "metric '{metric}': degenerate ANOVA error term, pooling forced"
            ),
            Self::NoiseOverridesControl { factor, binding } => write!(
                f,
                "noise factor '{factor}' overrides control binding '{binding}'"
            ),
            Self::RepetitionFailed {
                run,
                repetition,
                reason,
            } => write!(
                f,
                "run {run} repetition {repetition} failed after retries ({reason}), recorded as missing"
            ),
            Self::MissingRunData { metric, run } => write!(
                f,
                "metric '{metric}' run {run}: no readings recorded, run dropped from analysis"
            ),
            Self::ApproximateRawBounds { metric } => write!(
                f,
                "metric '{metric}': raw-scale confidence bounds are approximate"
            ),
        }
    }
}
