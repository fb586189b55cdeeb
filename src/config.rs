//! Engine configuration — every tunable of an experiment as a TOML value.
//!
//! The configuration layer upstream is responsible for discretizing ranges;
//! by the time a config reaches this struct every factor level is a
//! materialized string. `validate()` collects all violations at once so an
//! operator fixes a config file in one pass, not one error at a time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::factors::{Factor, FactorError, FactorRole};

/// Configuration errors. All fatal and surfaced before any trial runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration:\n{}", .0.join("\n"))]
    Validation(Vec<String>),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one experiment.
///
/// Load with `EngineConfig::load_from_file()`. The full struct is
/// serializable because it travels inside every checkpoint as the
/// configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Target program, repetitions, output location
    pub experiment: ExperimentConfig,

    /// Trial execution tuning (timeout, retries, failure policy)
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Statistical analysis tuning (pooling, significance, confidence)
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Metrics to analyze, with their optimization criteria
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,

    /// Fixed CLI arguments, in order, prepended to every invocation
    #[serde(default)]
    pub fixed_args: Vec<FixedArg>,

    /// Fixed environment variables set on every invocation
    #[serde(default)]
    pub fixed_env: BTreeMap<String, String>,

    /// Factors whose levels are optimized
    #[serde(default)]
    pub control_factors: Vec<FactorConfig>,

    /// Factors cycled across repetitions to measure robustness
    #[serde(default)]
    pub noise_factors: Vec<FactorConfig>,

    /// Control factor pairs whose interaction gets a reserved column
    #[serde(default)]
    pub interactions: Vec<InteractionConfig>,
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Path to the target executable under test.
    pub target_executable: PathBuf,

    /// Repetitions per designed run. Noise factors cycle across these.
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,

    /// Directory for the checkpoint, lockfile and report.
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,

    /// Diagnostic only: verbose engine logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_repetitions() -> usize {
    1
}
fn default_output_directory() -> PathBuf {
    PathBuf::from("./orthotune-out")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Wall-clock timeout per trial repetition, in seconds.
    #[serde(default = "default_trial_timeout_secs")]
    pub trial_timeout_secs: u64,

    /// Extra attempts after a failed repetition before it is recorded
    /// as missing.
    #[serde(default = "default_trial_retries")]
    pub trial_retries: u32,

    /// Abort the whole experiment on the first irrecoverable trial
    /// failure instead of continuing with a missing repetition.
    #[serde(default)]
    pub abort_on_trial_failure: bool,

    /// Diagnostic only: forward the target's output to the log.
    #[serde(default)]
    pub show_target_output: bool,
}

fn default_trial_timeout_secs() -> u64 {
    600
}
fn default_trial_retries() -> u32 {
    2
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            trial_timeout_secs: default_trial_timeout_secs(),
            trial_retries: default_trial_retries(),
            abort_on_trial_failure: false,
            show_target_output: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Sources with p above this are pooled into error.
    #[serde(default = "default_pooling_p_threshold")]
    pub pooling_p_threshold: f64,

    /// Sources contributing less than this percentage are pooled.
    #[serde(default = "default_pooling_contribution_percent")]
    pub pooling_contribution_percent: f64,

    /// Significance level for including a source in the prediction.
    #[serde(default = "default_significance_alpha")]
    pub significance_alpha: f64,

    /// Confidence level for the prediction interval.
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

fn default_pooling_p_threshold() -> f64 {
    0.25
}
fn default_pooling_contribution_percent() -> f64 {
    5.0
}
fn default_significance_alpha() -> f64 {
    0.05
}
fn default_confidence_level() -> f64 {
    0.95
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pooling_p_threshold: default_pooling_p_threshold(),
            pooling_contribution_percent: default_pooling_contribution_percent(),
            significance_alpha: default_significance_alpha(),
            confidence_level: default_confidence_level(),
        }
    }
}

// ============================================================================
// Metrics, args, factors
// ============================================================================

/// Optimization criterion for a metric, as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CriterionConfig {
    LargerBetter,
    SmallerBetter,
    Nominal,
}

/// A metric the target emits, with its optimization criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricSpec {
    pub name: String,
    pub criterion: CriterionConfig,
    /// Target value; required when criterion is `nominal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
}

/// One fixed CLI argument. A missing `value` means a bare flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixedArg {
    pub flag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Factor declaration: at least one binding, pre-materialized levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactorConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_arg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
    pub levels: Vec<String>,
}

/// An unordered pair of control factor names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InteractionConfig {
    pub between: [String; 2],
}

// ============================================================================
// Loading & validation
// ============================================================================

impl EngineConfig {
    /// Load and validate a config from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        if config.experiment.repetitions == 1
            && config.metrics.iter().any(|m| m.criterion == CriterionConfig::Nominal)
        {
            warn!("nominal-is-best with a single repetition uses the squared-deviation fallback");
        }
        Ok(config)
    }

    /// Serialize back to TOML (used to seed example configs).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every rule at once; returns all violations together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.experiment.repetitions == 0 {
            errors.push("experiment.repetitions must be at least 1".to_string());
        }
        if self.execution.trial_timeout_secs == 0 {
            errors.push("execution.trial_timeout_secs must be positive".to_string());
        }
        if self.metrics.is_empty() {
            errors.push("at least one [[metrics]] entry is required".to_string());
        }
        if self.control_factors.is_empty() {
            errors.push("at least one [[control_factors]] entry is required".to_string());
        }

        let mut metric_names = std::collections::HashSet::new();
        for m in &self.metrics {
            if !metric_names.insert(m.name.as_str()) {
                errors.push(format!("duplicate metric name '{}'", m.name));
            }
            if m.criterion == CriterionConfig::Nominal && m.target.is_none() {
                errors.push(format!(
                    "metric '{}': criterion 'nominal' requires a target value",
                    m.name
                ));
            }
        }

        let mut factor_names = std::collections::HashSet::new();
        for f in self.control_factors.iter().chain(&self.noise_factors) {
            if !factor_names.insert(f.name.as_str()) {
                errors.push(format!("duplicate factor name '{}'", f.name));
            }
            if f.cli_arg.is_none() && f.env_var.is_none() {
                errors.push(format!(
                    "factor '{}': at least one of cli_arg or env_var must be set",
                    f.name
                ));
            }
        }
        for f in &self.control_factors {
            if f.levels.len() < 2 {
                errors.push(format!(
                    "control factor '{}' needs at least 2 levels, has {}",
                    f.name,
                    f.levels.len()
                ));
            }
        }
        for f in &self.noise_factors {
            if f.levels.is_empty() {
                errors.push(format!("noise factor '{}' has no levels", f.name));
            }
        }

        for i in &self.interactions {
            let [a, b] = &i.between;
            if a == b {
                errors.push(format!("interaction pairs '{a}' with itself"));
                continue;
            }
            let fa = self.control_factors.iter().find(|f| &f.name == a);
            let fb = self.control_factors.iter().find(|f| &f.name == b);
            match (fa, fb) {
                (Some(fa), Some(fb)) => {
                    if fa.levels.len() != fb.levels.len() {
                        errors.push(format!(
                            "interaction '{a}' x '{b}': both factors must have the same level count"
                        ));
                    }
                }
                _ => errors.push(format!(
                    "interaction '{a}' x '{b}' references a factor that is not a control factor"
                )),
            }
        }

        let a = &self.analysis;
        if !(0.0..1.0).contains(&a.significance_alpha) || a.significance_alpha <= 0.0 {
            errors.push("analysis.significance_alpha must be in (0, 1)".to_string());
        }
        if !(0.0..1.0).contains(&a.confidence_level) || a.confidence_level <= 0.0 {
            errors.push("analysis.confidence_level must be in (0, 1)".to_string());
        }
        if !(0.0..=1.0).contains(&a.pooling_p_threshold) {
            errors.push("analysis.pooling_p_threshold must be in [0, 1]".to_string());
        }
        if !(0.0..=100.0).contains(&a.pooling_contribution_percent) {
            errors.push("analysis.pooling_contribution_percent must be in [0, 100]".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Build the control factor domain objects, in config order.
    pub fn build_control_factors(&self) -> Result<Vec<Factor>, FactorError> {
        self.control_factors
            .iter()
            .map(|f| {
                Factor::new(
                    f.name.clone(),
                    FactorRole::Control,
                    f.cli_arg.clone(),
                    f.env_var.clone(),
                    f.levels.clone(),
                )
            })
            .collect()
    }

    /// Build the noise factor domain objects, in config order.
    pub fn build_noise_factors(&self) -> Result<Vec<Factor>, FactorError> {
        self.noise_factors
            .iter()
            .map(|f| {
                Factor::new(
                    f.name.clone(),
                    FactorRole::Noise,
                    f.cli_arg.clone(),
                    f.env_var.clone(),
                    f.levels.clone(),
                )
            })
            .collect()
    }

    /// Interaction requests as name pairs, in config order.
    pub fn interaction_pairs(&self) -> Vec<(String, String)> {
        self.interactions
            .iter()
            .map(|i| (i.between[0].clone(), i.between[1].clone()))
            .collect()
    }
}
