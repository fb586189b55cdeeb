//! Statistics engine: the per-metric analysis pipeline.
//!
//! Pipeline per metric, all pure functions over a read-only view of the
//! result store:
//! 1. S/N ratio per run (dropping runs the transform cannot handle)
//! 2. Main effects per factor, interaction cell means
//! 3. Initial ANOVA, then pooling of weak sources
//! 4. Optimal level selection and prediction with confidence interval
//!
//! Warnings collected along the way travel in the result; they never
//! abort the analysis of other metrics.

pub mod anova;
pub mod effects;
pub mod prediction;
pub mod sn;

use serde::Serialize;

use crate::config::{AnalysisConfig, MetricSpec};
use crate::error::EngineWarning;
use crate::factors::Factor;
use crate::oa::{DesignAssignment, OrthogonalArray};
use crate::store::ResultStore;

pub use anova::{AnovaSource, AnovaTable};
pub use effects::{
    FactorEffects, InteractionCell, InteractionEffects, LevelEffect, RunResponse,
};
pub use prediction::{OptimalLevel, Prediction};
pub use sn::{SnCriterion, SnOutcome};

/// Complete analysis of one metric, shaped for report writers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricAnalysis {
    pub metric: String,
    pub sn_type: &'static str,
    pub optimal: std::collections::BTreeMap<String, OptimalLevel>,
    pub prediction: Prediction,
    pub anova: AnovaTable,
    pub pooled_anova: Option<AnovaTable>,
    pub main_effects: Vec<FactorEffects>,
    pub interaction_effects: Vec<InteractionEffects>,
    pub warnings: Vec<String>,
    /// Per-run responses backing the shared runs table; not serialized
    /// here because the report assembles them across metrics.
    #[serde(skip)]
    pub run_responses: Vec<RunResponse>,
}

/// Run the full pipeline for one metric.
pub fn analyze_metric(
    spec: &MetricSpec,
    analysis: &AnalysisConfig,
    store: &ResultStore,
    array: &OrthogonalArray,
    assignment: &DesignAssignment,
    factors: &[Factor],
) -> MetricAnalysis {
    let criterion = SnCriterion::from_spec(spec);
    let mut warnings: Vec<EngineWarning> = Vec::new();

    let responses =
        effects::run_responses(&spec.name, criterion, store, array.runs(), &mut warnings);
    let main = effects::main_effects(array, assignment, factors, &responses);
    let cells = effects::interaction_effects(array, assignment, factors, &responses);

    let initial = anova::initial_table(array, assignment, factors, &responses);
    if initial.degenerate_error() {
        warnings.push(EngineWarning::ZeroErrorDof {
            metric: spec.name.clone(),
        });
    }
    let pooled = anova::pooled_table(
        &initial,
        analysis.pooling_p_threshold,
        analysis.pooling_contribution_percent,
    );

    let optimal = prediction::optimal_levels(&main);
    let effective = pooled.as_ref().unwrap_or(&initial);
    let predicted = prediction::predict(
        criterion,
        &spec.name,
        &responses,
        &main,
        &cells,
        effective,
        &optimal,
        store.repetitions(),
        analysis.significance_alpha,
        analysis.confidence_level,
        &mut warnings,
    );

    MetricAnalysis {
        metric: spec.name.clone(),
        sn_type: criterion.label(),
        optimal,
        prediction: predicted,
        anova: initial,
        pooled_anova: pooled,
        main_effects: main,
        interaction_effects: cells,
        warnings: warnings.iter().map(ToString::to_string).collect(),
        run_responses: responses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CriterionConfig;
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

    fn spec(criterion: CriterionConfig) -> MetricSpec {
        MetricSpec {
            name: "y".to_string(),
            criterion,
            target: None,
        }
    }

    fn l4_store(values: &[f64; 4], repetitions: usize) -> ResultStore {
        let mut store = ResultStore::new(repetitions);
        for (i, &v) in values.iter().enumerate() {
            for _ in 0..repetitions {
                let mut reading = MetricReading::new();
                reading.insert("y".to_string(), v);
                store.record(i + 1, Some(reading));
            }
        }
        store
    }

    #[test]
    fn additive_l4_recovers_the_generator() {
        // Y = A + 10·B, the classic smoke case: optimum at (2, 2), raw
        // prediction exactly 22, degenerate-error warning present.
        let array = find_array("L4(2^3)").unwrap();
        let factors = vec![factor("a"), factor("b")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let store = l4_store(&[11.0, 21.0, 12.0, 22.0], 1);

        let analysis = analyze_metric(
            &spec(CriterionConfig::LargerBetter),
            &AnalysisConfig::default(),
            &store,
            array,
            &assignment,
            &factors,
        );

        assert_eq!(analysis.optimal["a"].level, 2);
        assert_eq!(analysis.optimal["b"].level, 2);
        assert!((analysis.prediction.raw_predicted - 22.0).abs() < 1e-9);
        assert_eq!(analysis.sn_type, "larger-better");
        assert_eq!(analysis.anova.total_dof, 3);
        assert_eq!(analysis.run_responses.len(), 4);
    }

    #[test]
    fn analysis_is_idempotent() {
        let array = find_array("L4(2^3)").unwrap();
        let factors = vec![factor("a"), factor("b")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let store = l4_store(&[11.0, 21.0, 12.0, 22.0], 1);
        let m = spec(CriterionConfig::LargerBetter);
        let cfg = AnalysisConfig::default();

        let first = analyze_metric(&m, &cfg, &store, array, &assignment, &factors);
        let second = analyze_metric(&m, &cfg, &store, array, &assignment, &factors);
        let a = serde_json::to_string(&first).unwrap();
        let b = serde_json::to_string(&second).unwrap();
        assert_eq!(a, b, "same store must yield an identical payload");
    }

    #[test]
    fn degenerate_error_term_warns_and_forces_pooling_attempt() {
        // A deterministic additive response on a saturated L4 leaves
        // nothing for the error term.
        let array = find_array("L4(2^3)").unwrap();
        let factors = vec![factor("a"), factor("b"), factor("c")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let store = l4_store(&[2.0, 4.0, 8.0, 16.0], 1);

        let analysis = analyze_metric(
            &spec(CriterionConfig::LargerBetter),
            &AnalysisConfig::default(),
            &store,
            array,
            &assignment,
            &factors,
        );
        assert_eq!(analysis.anova.error_dof, 0);
        assert!(analysis
            .warnings
            .iter()
            .any(|w| w.contains("degenerate ANOVA error term")));
    }

    #[test]
    fn zero_reading_drops_only_that_run() {
        let array = find_array("L4(2^3)").unwrap();
        let factors = vec![factor("a"), factor("b")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let store = l4_store(&[11.0, 0.0, 12.0, 22.0], 1);

        let analysis = analyze_metric(
            &spec(CriterionConfig::LargerBetter),
            &AnalysisConfig::default(),
            &store,
            array,
            &assignment,
            &factors,
        );
        assert_eq!(analysis.run_responses.len(), 3);
        assert!(analysis
            .warnings
            .iter()
            .any(|w| w.contains("S/N ratio undefined")));
        // The remaining runs still produce a full analysis.
        assert!(analysis.prediction.raw_predicted.is_finite());
    }

    #[test]
    fn dominant_interaction_shows_up_in_contribution() {
        // The response rewards A and B agreeing, which no main effect can
        // explain: the reserved interaction column must dominate the ANOVA.
        let array = find_array("L8(2^7)").unwrap();
        let factors = vec![factor("a"), factor("b")];
        let pair = vec![("a".to_string(), "b".to_string())];
        let assignment = DesignAssignment::build(array, &factors, &pair).unwrap();

        let mut store = ResultStore::new(4);
        for run in 1..=8 {
            let a = array.level_at(run, 1);
            let b = array.level_at(run, 2);
            let base = if a == b { 100.0 } else { 10.0 };
            for rep in 0..4 {
                // ±0.1 deterministic perturbation across repetitions.
                let noise = if rep % 2 == 0 { 0.1 } else { -0.1 };
                let mut reading = MetricReading::new();
                reading.insert("y".to_string(), base * (1.0 + noise));
                store.record(run, Some(reading));
            }
        }

        let analysis = analyze_metric(
            &spec(CriterionConfig::LargerBetter),
            &AnalysisConfig::default(),
            &store,
            array,
            &assignment,
            &factors,
        );
        let interaction = analysis
            .anova
            .sources
            .iter()
            .find(|s| s.name == "a*b")
            .unwrap();
        assert!(
            interaction.contribution_percent > 60.0,
            "interaction contributes {:.1}%",
            interaction.contribution_percent
        );
        assert_eq!(analysis.interaction_effects.len(), 1);
    }

    #[test]
    fn nominal_single_repetition_warns() {
        let array = find_array("L4(2^3)").unwrap();
        let factors = vec![factor("a"), factor("b")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let store = l4_store(&[4.2, 5.3, 4.8, 5.6], 1);

        let m = MetricSpec {
            name: "y".to_string(),
            criterion: CriterionConfig::Nominal,
            target: Some(5.0),
        };
        let analysis = analyze_metric(
            &m,
            &AnalysisConfig::default(),
            &store,
            array,
            &assignment,
            &factors,
        );
        assert_eq!(analysis.sn_type, "nominal");
        assert!(analysis
            .warnings
            .iter()
            .any(|w| w.contains("one repetition")));
        // Nominal has no inverse transform, so no raw bounds.
        assert!(analysis.prediction.raw_lower.is_none());
    }
}
