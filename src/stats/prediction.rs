//! Optimal level selection and prediction at the optimum.
//!
//! S/N ratios are defined so that larger is always better, so the optimal
//! level of each control factor is simply the level with the highest S/N
//! mean. The η-scale prediction sums the significant sources' deviations
//! from the grand mean; the raw-scale prediction uses the additive model
//! over raw level means for every control factor, since that is the value
//! an operator should expect when running the recommended configuration.

use std::collections::BTreeMap;

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::error::EngineWarning;
use crate::stats::anova::AnovaTable;
use crate::stats::effects::{
    grand_raw, grand_sn, FactorEffects, InteractionEffects, RunResponse,
};
use crate::stats::sn::SnCriterion;

/// The recommended level of one factor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimalLevel {
    pub level: usize,
    pub value: String,
}

/// Predicted performance at the optimal configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Predicted S/N ratio from the significant sources.
    pub sn_predicted: f64,
    pub sn_lower: Option<f64>,
    pub sn_upper: Option<f64>,
    /// Predicted raw value from the additive model over all factors,
    /// clamped into the observed range of run means.
    pub raw_predicted: f64,
    pub raw_lower: Option<f64>,
    pub raw_upper: Option<f64>,
    /// True when the raw prediction fell outside the observed run means
    /// and was clamped for display.
    pub clamped: bool,
    /// Sources whose effects entered the η prediction.
    pub included_sources: Vec<String>,
    /// Taguchi's effective replication count, when a CI was computed.
    pub n_effective: Option<f64>,
    pub confidence_level: f64,
}

/// Pick each factor's level with the maximum S/N mean (ties take the
/// lowest index).
pub fn optimal_levels(effects: &[FactorEffects]) -> BTreeMap<String, OptimalLevel> {
    effects
        .iter()
        .filter_map(|factor| {
            let best = factor
                .levels
                .iter()
                .filter(|l| l.sn_mean.is_finite())
                .reduce(|best, l| if l.sn_mean > best.sn_mean { l } else { best })?;
            Some((
                factor.factor.clone(),
                OptimalLevel {
                    level: best.level,
                    value: best.value.clone(),
                },
            ))
        })
        .collect()
}

/// Predict performance at the optimum with a confidence interval.
///
/// η prediction: grand mean plus the deviations of every significant
/// factor's optimal level, plus the cell-mean adjustment of every
/// significant interaction. Significance is judged on the pooled table
/// when one exists; a source whose p-value cannot be computed (degenerate
/// error term) counts as significant rather than silently vanishing from
/// the model.
#[allow(clippy::too_many_arguments)]
pub fn predict(
    criterion: SnCriterion,
    metric: &str,
    responses: &[RunResponse],
    effects: &[FactorEffects],
    interactions: &[InteractionEffects],
    effective_table: &AnovaTable,
    optimal: &BTreeMap<String, OptimalLevel>,
    repetitions: usize,
    alpha: f64,
    confidence_level: f64,
    warnings: &mut Vec<EngineWarning>,
) -> Prediction {
    let grand = grand_sn(responses);
    let n = responses.len() as f64;

    let significant: Vec<&str> = effective_table
        .active_sources()
        .filter(|s| s.p_value.map_or(true, |p| p < alpha))
        .map(|s| s.name.as_str())
        .collect();

    // Factor terms.
    let mut sn_predicted = grand;
    let mut included = Vec::new();
    let mut significant_dof = 0usize;
    for factor in effects {
        if !significant.contains(&factor.factor.as_str()) {
            continue;
        }
        let Some(opt) = optimal.get(&factor.factor) else {
            continue;
        };
        if let Some(level) = factor.levels.iter().find(|l| l.level == opt.level) {
            sn_predicted += level.sn_mean - grand;
            included.push(factor.factor.clone());
            significant_dof += factor.levels.len().saturating_sub(1);
        }
    }

    // Interaction terms: cell mean minus both main-effect means plus the
    // grand mean, at the optimal level pair.
    for interaction in interactions {
        let name = format!("{}*{}", interaction.first, interaction.second);
        if !significant.contains(&name.as_str()) {
            continue;
        }
        let (Some(opt_a), Some(opt_b)) = (
            optimal.get(&interaction.first),
            optimal.get(&interaction.second),
        ) else {
            continue;
        };
        let cell = interaction.cells.iter().find(|c| {
            c.first_level == opt_a.level && c.second_level == opt_b.level
        });
        let mean_a = level_mean(effects, &interaction.first, opt_a.level);
        let mean_b = level_mean(effects, &interaction.second, opt_b.level);
        if let (Some(cell), Some(mean_a), Some(mean_b)) = (cell, mean_a, mean_b) {
            if cell.sn_mean.is_finite() {
                sn_predicted += cell.sn_mean - mean_a - mean_b + grand;
                included.push(name.clone());
                significant_dof += effective_table
                    .sources
                    .iter()
                    .find(|s| s.name == name)
                    .map_or(0, |s| s.dof);
            }
        }
    }

    // Confidence interval on the η scale, when the error term supports
    // one: half-width = sqrt(F(1, d_err; 1−α) · MS_err · (1/n_eff + 1/r)).
    let mut sn_lower = None;
    let mut sn_upper = None;
    let mut n_effective = None;
    if let Some(error_ms) = effective_table.error_ms {
        if effective_table.error_dof > 0 && error_ms > f64::EPSILON && n > 0.0 {
            let n_eff = n / (1.0 + significant_dof as f64);
            let critical_f = FisherSnedecor::new(1.0, effective_table.error_dof as f64)
                .ok()
                .map(|dist| dist.inverse_cdf(confidence_level));
            if let Some(critical_f) = critical_f {
                let half = (critical_f * error_ms * (1.0 / n_eff + 1.0 / repetitions as f64))
                    .sqrt();
                sn_lower = Some(sn_predicted - half);
                sn_upper = Some(sn_predicted + half);
                n_effective = Some(n_eff);
            }
        }
    }

    // Raw-scale prediction: additive model over raw level means, every
    // control factor at its optimal level.
    let raw_grand = grand_raw(responses);
    let mut raw_predicted = raw_grand;
    for factor in effects {
        let Some(opt) = optimal.get(&factor.factor) else {
            continue;
        };
        if let Some(level) = factor.levels.iter().find(|l| l.level == opt.level) {
            if level.raw_mean.is_finite() {
                raw_predicted += level.raw_mean - raw_grand;
            }
        }
    }

    // Clamp into the observed range of run means for display.
    let mut clamped = false;
    let raw_means: Vec<f64> = responses.iter().map(|r| r.raw_mean).collect();
    if let (Some(min), Some(max)) = (
        raw_means.iter().cloned().reduce(f64::min),
        raw_means.iter().cloned().reduce(f64::max),
    ) {
        if raw_predicted < min || raw_predicted > max {
            raw_predicted = raw_predicted.clamp(min, max);
            clamped = true;
        }
    }

    // Raw bounds are the inverse transform of the η bounds, where the
    // criterion has an inverse. Always approximate.
    let (raw_lower, raw_upper) = match (sn_lower, sn_upper) {
        (Some(lo), Some(hi)) => {
            let a = criterion.inverse(lo);
            let b = criterion.inverse(hi);
            match (a, b) {
                (Some(a), Some(b)) => {
                    warnings.push(EngineWarning::ApproximateRawBounds {
                        metric: metric.to_string(),
                    });
                    (Some(a.min(b)), Some(a.max(b)))
                }
                _ => (None, None),
            }
        }
        _ => (None, None),
    };

    Prediction {
        sn_predicted,
        sn_lower,
        sn_upper,
        raw_predicted,
        raw_lower,
        raw_upper,
        clamped,
        included_sources: included,
        n_effective,
        confidence_level,
    }
}

fn level_mean(effects: &[FactorEffects], factor: &str, level: usize) -> Option<f64> {
    effects
        .iter()
        .find(|e| e.factor == factor)?
        .levels
        .iter()
        .find(|l| l.level == level)
        .map(|l| l.sn_mean)
        .filter(|m| m.is_finite())
}
