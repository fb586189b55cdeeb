//! Signal-to-noise transforms.
//!
//! The criterion is a tagged variant; a single transform maps a run's
//! repetition readings to an S/N ratio η where larger is always better,
//! regardless of the optimization direction. The inverse (where one
//! exists) maps η back to the raw scale for approximate display bounds.

use serde::{Deserialize, Serialize};

use crate::config::{CriterionConfig, MetricSpec};
use crate::error::EngineWarning;

/// Optimization criterion with its S/N transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SnCriterion {
    LargerBetter,
    SmallerBetter,
    Nominal { target: f64 },
}

/// Outcome of transforming one run's readings.
#[derive(Debug, Clone, PartialEq)]
pub enum SnOutcome {
    Value(f64),
    /// η is undefined for these readings; the run is dropped from this
    /// metric's analysis.
    Undefined { reason: String },
}

impl SnCriterion {
    pub fn from_spec(spec: &MetricSpec) -> Self {
        match spec.criterion {
            CriterionConfig::LargerBetter => Self::LargerBetter,
            CriterionConfig::SmallerBetter => Self::SmallerBetter,
            // Config validation guarantees a target for nominal metrics.
            CriterionConfig::Nominal => Self::Nominal {
                target: spec.target.unwrap_or_default(),
            },
        }
    }

    /// Stable name for reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::LargerBetter => "larger-better",
            Self::SmallerBetter => "smaller-better",
            Self::Nominal { .. } => "nominal",
        }
    }

    /// S/N ratio η for one run's finite readings.
    ///
    /// - larger-better:  η = −10·log₁₀((1/R)·Σ 1/yᵢ²), undefined at yᵢ = 0
    /// - smaller-better: η = −10·log₁₀((1/R)·Σ yᵢ²)
    /// - nominal:        η = 10·log₁₀(ȳ²/s²); with R = 1 it falls back to
    ///   −10·log₁₀((ȳ−t)²) and emits a warning
    pub fn sn_ratio(
        &self,
        values: &[f64],
        metric: &str,
        warnings: &mut Vec<EngineWarning>,
    ) -> SnOutcome {
        let n = values.len() as f64;
        match self {
            Self::LargerBetter => {
                if values.iter().any(|&y| y == 0.0) {
                    return SnOutcome::Undefined {
                        reason: "zero reading under larger-is-better".to_string(),
                    };
                }
                let mean_inv_sq = values.iter().map(|y| 1.0 / (y * y)).sum::<f64>() / n;
                SnOutcome::Value(-10.0 * mean_inv_sq.log10())
            }
            Self::SmallerBetter => {
                let mean_sq = values.iter().map(|y| y * y).sum::<f64>() / n;
                if mean_sq == 0.0 {
                    // All readings exactly zero: perfect, but log10(0) is
                    // not representable.
                    return SnOutcome::Undefined {
                        reason: "all readings zero under smaller-is-better".to_string(),
                    };
                }
                SnOutcome::Value(-10.0 * mean_sq.log10())
            }
            Self::Nominal { target } => {
                let mean = values.iter().sum::<f64>() / n;
                if values.len() == 1 {
                    warnings.push(EngineWarning::SingleRepetitionNominal {
                        metric: metric.to_string(),
                    });
                    let deviation_sq = (mean - target) * (mean - target);
                    if deviation_sq == 0.0 {
                        return SnOutcome::Undefined {
                            reason: "single reading exactly on target".to_string(),
                        };
                    }
                    return SnOutcome::Value(-10.0 * deviation_sq.log10());
                }
                let variance = values
                    .iter()
                    .map(|y| (y - mean) * (y - mean))
                    .sum::<f64>()
                    / (n - 1.0);
                if variance == 0.0 || mean == 0.0 {
                    return SnOutcome::Undefined {
                        reason: "zero variance or zero mean under nominal".to_string(),
                    };
                }
                SnOutcome::Value(10.0 * (mean * mean / variance).log10())
            }
        }
    }

    /// Inverse of the S/N transform, for mapping η-scale bounds back to
    /// the raw scale. Nominal has no inverse.
    pub fn inverse(&self, eta: f64) -> Option<f64> {
        match self {
            Self::LargerBetter => Some(10f64.powf(eta / 20.0)),
            Self::SmallerBetter => Some(10f64.powf(-eta / 20.0)),
            Self::Nominal { .. } => None,
        }
    }
}
