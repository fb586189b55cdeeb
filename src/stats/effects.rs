//! Per-run responses and effect tables.
//!
//! Every step is a pure function over immutable inputs: run readings
//! become S/N responses, responses become level means (main effects) and
//! cell means (interaction effects). Runs whose η is undefined are dropped
//! here, with a warning, and stay dropped for the rest of this metric's
//! pipeline.

use serde::Serialize;

use crate::error::EngineWarning;
use crate::factors::Factor;
use crate::oa::{DesignAssignment, OrthogonalArray};
use crate::stats::sn::{SnCriterion, SnOutcome};
use crate::store::ResultStore;

/// One run's transformed response.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub run: usize,
    pub sn: f64,
    pub raw_mean: f64,
    pub samples: usize,
}

/// S/N and raw means at one level of a factor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelEffect {
    pub level: usize,
    pub value: String,
    pub sn_mean: f64,
    pub raw_mean: f64,
    /// Signed deviation of the level's S/N mean from the grand mean.
    pub sn_effect: f64,
    pub runs: usize,
}

/// Main effect table of one control factor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorEffects {
    pub factor: String,
    pub levels: Vec<LevelEffect>,
    /// max − min of the level S/N means; the factor's effect magnitude.
    pub sn_range: f64,
    /// 1 = largest range.
    pub rank: usize,
}

/// S/N cell mean at one level pair of an interaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionCell {
    pub first_level: usize,
    pub second_level: usize,
    pub sn_mean: f64,
    pub runs: usize,
}

/// Interaction effect table for one reserved factor pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEffects {
    pub first: String,
    pub second: String,
    pub cells: Vec<InteractionCell>,
}

/// Transform each run's readings into an S/N response, dropping runs the
/// transform cannot handle.
pub fn run_responses(
    metric: &str,
    criterion: SnCriterion,
    store: &ResultStore,
    total_runs: usize,
    warnings: &mut Vec<EngineWarning>,
) -> Vec<RunResponse> {
    let mut responses = Vec::new();
    for run in 1..=total_runs {
        let values = store.finite_values(run, metric);
        if values.is_empty() {
            warnings.push(EngineWarning::MissingRunData {
                metric: metric.to_string(),
                run,
            });
            continue;
        }
        match criterion.sn_ratio(&values, metric, warnings) {
            SnOutcome::Value(sn) => responses.push(RunResponse {
                run,
                sn,
                raw_mean: values.iter().sum::<f64>() / values.len() as f64,
                samples: values.len(),
            }),
            SnOutcome::Undefined { reason } => {
                warnings.push(EngineWarning::SnUndefined {
                    metric: metric.to_string(),
                    run,
                    reason,
                });
            }
        }
    }
    responses
}

/// Grand mean of the S/N responses.
pub fn grand_sn(responses: &[RunResponse]) -> f64 {
    if responses.is_empty() {
        return 0.0;
    }
    responses.iter().map(|r| r.sn).sum::<f64>() / responses.len() as f64
}

/// Grand mean of the raw run means.
pub fn grand_raw(responses: &[RunResponse]) -> f64 {
    if responses.is_empty() {
        return 0.0;
    }
    responses.iter().map(|r| r.raw_mean).sum::<f64>() / responses.len() as f64
}

/// Level-average main effects for every assigned control factor, ranked by
/// S/N range.
pub fn main_effects(
    array: &OrthogonalArray,
    assignment: &DesignAssignment,
    factors: &[Factor],
    responses: &[RunResponse],
) -> Vec<FactorEffects> {
    let grand = grand_sn(responses);
    let mut effects: Vec<FactorEffects> = factors
        .iter()
        .filter_map(|factor| {
            let column = assignment.factor_column(&factor.name)?;
            let levels = factor
                .levels_of()
                .iter()
                .map(|level| {
                    let group: Vec<&RunResponse> = responses
                        .iter()
                        .filter(|r| array.level_at(r.run, column) == level.index)
                        .collect();
                    let n = group.len();
                    let (sn_mean, raw_mean) = if n == 0 {
                        (f64::NAN, f64::NAN)
                    } else {
                        (
                            group.iter().map(|r| r.sn).sum::<f64>() / n as f64,
                            group.iter().map(|r| r.raw_mean).sum::<f64>() / n as f64,
                        )
                    };
                    LevelEffect {
                        level: level.index,
                        value: level.value.clone(),
                        sn_mean,
                        raw_mean,
                        sn_effect: sn_mean - grand,
                        runs: n,
                    }
                })
                .collect::<Vec<_>>();

            let finite: Vec<f64> = levels
                .iter()
                .map(|l| l.sn_mean)
                .filter(|v| v.is_finite())
                .collect();
            let sn_range = match (
                finite.iter().cloned().reduce(f64::max),
                finite.iter().cloned().reduce(f64::min),
            ) {
                (Some(max), Some(min)) => max - min,
                _ => 0.0,
            };
            Some(FactorEffects {
                factor: factor.name.clone(),
                levels,
                sn_range,
                rank: 0,
            })
        })
        .collect();

    // Rank by descending range; ties keep factor order.
    let mut order: Vec<usize> = (0..effects.len()).collect();
    order.sort_by(|&a, &b| {
        effects[b]
            .sn_range
            .partial_cmp(&effects[a].sn_range)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (rank, index) in order.into_iter().enumerate() {
        effects[index].rank = rank + 1;
    }
    effects
}

/// Cell means for every reserved interaction.
pub fn interaction_effects(
    array: &OrthogonalArray,
    assignment: &DesignAssignment,
    factors: &[Factor],
    responses: &[RunResponse],
) -> Vec<InteractionEffects> {
    assignment
        .interactions()
        .iter()
        .filter_map(|interaction| {
            let col_a = assignment.factor_column(&interaction.first)?;
            let col_b = assignment.factor_column(&interaction.second)?;
            let levels_a = factors
                .iter()
                .find(|f| f.name == interaction.first)?
                .level_count();
            let levels_b = factors
                .iter()
                .find(|f| f.name == interaction.second)?
                .level_count();

            let mut cells = Vec::with_capacity(levels_a * levels_b);
            for a in 1..=levels_a {
                for b in 1..=levels_b {
                    let group: Vec<f64> = responses
                        .iter()
                        .filter(|r| {
                            array.level_at(r.run, col_a) == a && array.level_at(r.run, col_b) == b
                        })
                        .map(|r| r.sn)
                        .collect();
                    let sn_mean = if group.is_empty() {
                        f64::NAN
                    } else {
                        group.iter().sum::<f64>() / group.len() as f64
                    };
                    cells.push(InteractionCell {
                        first_level: a,
                        second_level: b,
                        sn_mean,
                        runs: group.len(),
                    });
                }
            }
            Some(InteractionEffects {
                first: interaction.first.clone(),
                second: interaction.second.clone(),
                cells,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::FactorRole;
    use crate::oa::catalog::find_array;
    use crate::store::MetricReading;

    fn factor(name: &str) -> Factor {
        Factor::new(
            name,
            FactorRole::Control,
            Some(format!("--{name}")),
            None,
            vec!["1".to_string(), "2".to_string()],
        )
        .unwrap()
    }

    fn store_with(values: &[f64]) -> ResultStore {
        let mut store = ResultStore::new(1);
        for (i, &v) in values.iter().enumerate() {
            let mut reading = MetricReading::new();
            reading.insert("y".to_string(), v);
            store.record(i + 1, Some(reading));
        }
        store
    }

    #[test]
    fn responses_skip_undefined_runs() {
        let store = store_with(&[2.0, 0.0, 4.0, 8.0]);
        let mut warnings = Vec::new();
        let responses =
            run_responses("y", SnCriterion::LargerBetter, &store, 4, &mut warnings);
        let runs: Vec<usize> = responses.iter().map(|r| r.run).collect();
        assert_eq!(runs, vec![1, 3, 4]);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, EngineWarning::SnUndefined { run: 2, .. })));
    }

    #[test]
    fn responses_flag_runs_without_data() {
        let mut store = ResultStore::new(1);
        store.record(1, None);
        let mut reading = MetricReading::new();
        reading.insert("y".to_string(), 3.0);
        store.record(2, Some(reading));

        let mut warnings = Vec::new();
        let responses =
            run_responses("y", SnCriterion::SmallerBetter, &store, 2, &mut warnings);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].run, 2);
        assert!(warnings
            .iter()
            .any(|w| matches!(w, EngineWarning::MissingRunData { run: 1, .. })));
    }

    #[test]
    fn main_effects_average_the_right_runs() {
        // L4 column 1 splits runs {1,2} vs {3,4}; use η-friendly values.
        let array = find_array("L4(2^3)").unwrap();
        let factors = vec![factor("a"), factor("b")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let store = store_with(&[10.0, 10.0, 100.0, 100.0]);
        let mut warnings = Vec::new();
        let responses =
            run_responses("y", SnCriterion::LargerBetter, &store, 4, &mut warnings);
        let effects = main_effects(array, &assignment, &factors, &responses);

        let a = effects.iter().find(|e| e.factor == "a").unwrap();
        // η(10) = 20, η(100) = 40; level 1 runs {1,2}, level 2 runs {3,4}.
        assert!((a.levels[0].sn_mean - 20.0).abs() < 1e-9);
        assert!((a.levels[1].sn_mean - 40.0).abs() < 1e-9);
        assert!((a.levels[0].raw_mean - 10.0).abs() < 1e-9);
        assert!((a.levels[1].raw_mean - 100.0).abs() < 1e-9);
        assert_eq!(a.levels[0].runs, 2);
        assert!((a.sn_range - 20.0).abs() < 1e-9);

        // Column 2 splits runs {1,3} vs {2,4}: both groups average η = 30.
        let b = effects.iter().find(|e| e.factor == "b").unwrap();
        assert!((b.levels[0].sn_mean - 30.0).abs() < 1e-9);
        assert!(b.sn_range.abs() < 1e-9);

        // a dominates, so it is ranked first.
        assert_eq!(a.rank, 1);
        assert_eq!(b.rank, 2);
    }

    #[test]
    fn signed_effects_sum_to_zero_in_balanced_designs() {
        let array = find_array("L4(2^3)").unwrap();
        let factors = vec![factor("a"), factor("b")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let store = store_with(&[11.0, 21.0, 12.0, 22.0]);
        let mut warnings = Vec::new();
        let responses =
            run_responses("y", SnCriterion::LargerBetter, &store, 4, &mut warnings);
        let effects = main_effects(array, &assignment, &factors, &responses);
        for e in &effects {
            let sum: f64 = e.levels.iter().map(|l| l.sn_effect).sum();
            assert!(sum.abs() < 1e-9, "{}: {sum}", e.factor);
        }
    }

    #[test]
    fn interaction_cells_cover_every_level_pair() {
        let array = find_array("L8(2^7)").unwrap();
        let factors = vec![factor("a"), factor("b")];
        let pair = vec![("a".to_string(), "b".to_string())];
        let assignment = DesignAssignment::build(array, &factors, &pair).unwrap();
        let store = store_with(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let mut warnings = Vec::new();
        let responses =
            run_responses("y", SnCriterion::SmallerBetter, &store, 8, &mut warnings);
        let effects = interaction_effects(array, &assignment, &factors, &responses);

        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].cells.len(), 4);
        // L8 is balanced: every (a, b) cell holds exactly 2 runs.
        assert!(effects[0].cells.iter().all(|c| c.runs == 2));
    }
}
