//! ANOVA on the S/N response: sum-of-squares decomposition, F statistics
//! and pooling.
//!
//! Sources are the assigned factors and reserved interactions; whatever
//! variation their columns do not explain is the error term. An
//! interaction's sum of squares is carried by its reserved column(s), so
//! the decomposition stays exact and the degrees of freedom always add up.
//! Pooling re-attributes weak sources to error and recomputes the table;
//! it never changes total SS, only its attribution.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::factors::Factor;
use crate::oa::{DesignAssignment, OrthogonalArray};
use crate::stats::effects::RunResponse;

/// One row of an ANOVA table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnovaSource {
    pub name: String,
    pub dof: usize,
    pub ss: f64,
    pub ms: f64,
    pub f_ratio: Option<f64>,
    pub p_value: Option<f64>,
    pub contribution_percent: f64,
    pub pooled: bool,
}

/// A complete ANOVA table (initial or pooled).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnovaTable {
    pub sources: Vec<AnovaSource>,
    pub error_ss: f64,
    pub error_dof: usize,
    pub error_ms: Option<f64>,
    pub total_ss: f64,
    pub total_dof: usize,
    /// Names of the sources pooled into error (empty for the initial
    /// table).
    pub pooled_sources: Vec<String>,
}

impl AnovaTable {
    /// True when the error term cannot support F tests.
    pub fn degenerate_error(&self) -> bool {
        self.error_dof == 0 || self.error_ms.map_or(true, |ms| ms <= f64::EPSILON)
    }

    /// Non-pooled sources, the candidates for prediction terms.
    pub fn active_sources(&self) -> impl Iterator<Item = &AnovaSource> {
        self.sources.iter().filter(|s| !s.pooled)
    }
}

/// Weighted between-group sum of squares of one column.
fn column_group_ss(
    array: &OrthogonalArray,
    column: usize,
    responses: &[RunResponse],
    grand: f64,
) -> f64 {
    let mut ss = 0.0;
    for level in 1..=array.column_levels(column) {
        let group: Vec<f64> = responses
            .iter()
            .filter(|r| array.level_at(r.run, column) == level)
            .map(|r| r.sn)
            .collect();
        if group.is_empty() {
            continue;
        }
        let mean = group.iter().sum::<f64>() / group.len() as f64;
        ss += group.len() as f64 * (mean - grand) * (mean - grand);
    }
    ss
}

/// Build the initial ANOVA table over the included responses.
pub fn initial_table(
    array: &OrthogonalArray,
    assignment: &DesignAssignment,
    factors: &[Factor],
    responses: &[RunResponse],
) -> AnovaTable {
    let n = responses.len();
    let grand = crate::stats::effects::grand_sn(responses);
    let total_ss: f64 = responses
        .iter()
        .map(|r| (r.sn - grand) * (r.sn - grand))
        .sum();
    let total_dof = n.saturating_sub(1);

    let mut sources = Vec::new();
    for factor in factors {
        if let Some(column) = assignment.factor_column(&factor.name) {
            sources.push(AnovaSource {
                name: factor.name.clone(),
                dof: factor.dof(),
                ss: column_group_ss(array, column, responses, grand),
                ms: 0.0,
                f_ratio: None,
                p_value: None,
                contribution_percent: 0.0,
                pooled: false,
            });
        }
    }
    for interaction in assignment.interactions() {
        let dof: usize = interaction
            .columns
            .iter()
            .map(|&c| array.column_dof(c))
            .sum();
        let ss: f64 = interaction
            .columns
            .iter()
            .map(|&c| column_group_ss(array, c, responses, grand))
            .sum();
        sources.push(AnovaSource {
            name: format!("{}*{}", interaction.first, interaction.second),
            dof,
            ss,
            ms: 0.0,
            f_ratio: None,
            p_value: None,
            contribution_percent: 0.0,
            pooled: false,
        });
    }

    let source_ss: f64 = sources.iter().map(|s| s.ss).sum();
    let source_dof: usize = sources.iter().map(|s| s.dof).sum();
    let error_ss = (total_ss - source_ss).max(0.0);
    let error_dof = total_dof.saturating_sub(source_dof);
    let error_ms = (error_dof > 0).then(|| error_ss / error_dof as f64);

    let mut table = AnovaTable {
        sources,
        error_ss,
        error_dof,
        error_ms,
        total_ss,
        total_dof,
        pooled_sources: Vec::new(),
    };
    finalize(&mut table);
    table
}

/// Pool weak sources into error and rebuild the statistics.
///
/// A source is pooled when its p-value exceeds `p_threshold` or its
/// contribution falls below `contribution_percent`. Returns `None` when
/// nothing qualifies, or when every source qualifies (the initial table
/// then stands alone).
pub fn pooled_table(
    initial: &AnovaTable,
    p_threshold: f64,
    contribution_percent: f64,
) -> Option<AnovaTable> {
    let poolable: Vec<String> = initial
        .sources
        .iter()
        .filter(|s| {
            s.p_value.map_or(false, |p| p > p_threshold)
                || s.contribution_percent < contribution_percent
        })
        .map(|s| s.name.clone())
        .collect();

    if poolable.is_empty() || poolable.len() == initial.sources.len() {
        return None;
    }

    let mut table = initial.clone();
    table.pooled_sources = poolable;
    for source in &mut table.sources {
        if table.pooled_sources.contains(&source.name) {
            source.pooled = true;
            table.error_ss += source.ss;
            table.error_dof += source.dof;
        }
    }
    table.error_ms = (table.error_dof > 0).then(|| table.error_ss / table.error_dof as f64);
    finalize(&mut table);
    table.sources.sort_by_key(|s| s.pooled);
    Some(table)
}

/// Fill MS, F, p and contribution for every non-pooled source.
fn finalize(table: &mut AnovaTable) {
    let error_ms = table.error_ms.unwrap_or(0.0);
    let error_dof = table.error_dof;
    let total_ss = table.total_ss;

    for source in &mut table.sources {
        if source.pooled {
            source.ms = source.ss / source.dof.max(1) as f64;
            source.f_ratio = None;
            source.p_value = None;
            source.contribution_percent = 0.0;
            continue;
        }
        source.ms = source.ss / source.dof.max(1) as f64;
        (source.f_ratio, source.p_value) = if error_dof > 0 && error_ms > f64::EPSILON {
            let f = source.ms / error_ms;
            let p = FisherSnedecor::new(source.dof as f64, error_dof as f64)
                .ok()
                .map(|dist| 1.0 - dist.cdf(f));
            (Some(f), p)
        } else {
            (None, None)
        };
        source.contribution_percent = if total_ss > 0.0 {
            (100.0 * (source.ss - source.dof as f64 * error_ms) / total_ss).max(0.0)
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::FactorRole;
    use crate::oa::catalog::find_array;
    use crate::stats::effects::run_responses;
    use crate::stats::sn::SnCriterion;
    use crate::store::{MetricReading, ResultStore};

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

    fn responses_for(values: &[f64]) -> Vec<RunResponse> {
        let mut store = ResultStore::new(1);
        for (i, &v) in values.iter().enumerate() {
            let mut reading = MetricReading::new();
            reading.insert("y".to_string(), v);
            store.record(i + 1, Some(reading));
        }
        let mut warnings = Vec::new();
        run_responses(
            "y",
            SnCriterion::LargerBetter,
            &store,
            values.len(),
            &mut warnings,
        )
    }

    #[test]
    fn dof_accounting_is_exact() {
        let array = find_array("L4(2^3)").unwrap();
        let factors = vec![factor("a"), factor("b")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let responses = responses_for(&[11.0, 21.0, 12.0, 22.0]);
        let table = initial_table(array, &assignment, &factors, &responses);

        assert_eq!(table.total_dof, 3);
        let source_dof: usize = table.sources.iter().map(|s| s.dof).sum();
        assert_eq!(source_dof + table.error_dof, table.total_dof);
    }

    #[test]
    fn sum_of_squares_decomposes_total() {
        let array = find_array("L8(2^7)").unwrap();
        let factors = vec![factor("a"), factor("b"), factor("c")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let responses = responses_for(&[3.0, 5.0, 7.0, 11.0, 13.0, 17.0, 19.0, 23.0]);
        let table = initial_table(array, &assignment, &factors, &responses);

        let source_ss: f64 = table.sources.iter().map(|s| s.ss).sum();
        assert!(
            (source_ss + table.error_ss - table.total_ss).abs() < 1e-9,
            "SS must decompose exactly"
        );
    }

    #[test]
    fn saturated_design_has_zero_error_dof() {
        let array = find_array("L4(2^3)").unwrap();
        let factors = vec![factor("a"), factor("b"), factor("c")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let responses = responses_for(&[2.0, 4.0, 8.0, 16.0]);
        let table = initial_table(array, &assignment, &factors, &responses);

        assert_eq!(table.error_dof, 0);
        assert!(table.error_ms.is_none());
        assert!(table.degenerate_error());
        assert!(table.sources.iter().all(|s| s.f_ratio.is_none()));
    }

    #[test]
    fn interaction_ss_uses_reserved_column() {
        let array = find_array("L8(2^7)").unwrap();
        let factors = vec![factor("a"), factor("b")];
        let pair = vec![("a".to_string(), "b".to_string())];
        let assignment = DesignAssignment::build(array, &factors, &pair).unwrap();
        let responses = responses_for(&[3.0, 5.0, 7.0, 11.0, 13.0, 17.0, 19.0, 23.0]);
        let table = initial_table(array, &assignment, &factors, &responses);

        let interaction = table.sources.iter().find(|s| s.name == "a*b").unwrap();
        assert_eq!(interaction.dof, 1);
        let source_ss: f64 = table.sources.iter().map(|s| s.ss).sum();
        assert!((source_ss + table.error_ss - table.total_ss).abs() < 1e-9);
        assert_eq!(table.error_dof, 8 - 1 - 3);
    }

    #[test]
    fn dominant_factor_gets_small_p() {
        // Column 1 separates 10s from 1000s; columns 2 and 3 see noise.
        let array = find_array("L8(2^7)").unwrap();
        let factors = vec![factor("a"), factor("b"), factor("c")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let responses = responses_for(&[10.0, 11.0, 10.5, 10.8, 1000.0, 1010.0, 995.0, 1005.0]);
        let table = initial_table(array, &assignment, &factors, &responses);

        let a = table.sources.iter().find(|s| s.name == "a").unwrap();
        let b = table.sources.iter().find(|s| s.name == "b").unwrap();
        assert!(a.p_value.unwrap() < 0.001, "a: {:?}", a.p_value);
        assert!(b.p_value.unwrap() > 0.05, "b: {:?}", b.p_value);
        assert!(a.contribution_percent > 95.0);
    }

    #[test]
    fn pooling_moves_weak_sources_into_error() {
        let array = find_array("L8(2^7)").unwrap();
        let factors = vec![factor("a"), factor("b"), factor("c")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let responses = responses_for(&[10.0, 11.0, 10.5, 10.8, 1000.0, 1010.0, 995.0, 1005.0]);
        let initial = initial_table(array, &assignment, &factors, &responses);
        let pooled = pooled_table(&initial, 0.25, 5.0).expect("weak sources should pool");

        assert!(pooled.pooled_sources.contains(&"b".to_string()));
        assert!(pooled.pooled_sources.contains(&"c".to_string()));
        assert!(!pooled.pooled_sources.contains(&"a".to_string()));

        // Error grew, totals unchanged, DOF identity still holds.
        assert!(pooled.error_dof >= initial.error_dof);
        assert!(pooled.error_ss >= initial.error_ss);
        assert!((pooled.total_ss - initial.total_ss).abs() < 1e-12);
        let active_dof: usize = pooled.active_sources().map(|s| s.dof).sum();
        assert_eq!(active_dof + pooled.error_dof, pooled.total_dof);

        // Non-pooled SS unchanged by pooling.
        let a_initial = initial.sources.iter().find(|s| s.name == "a").unwrap().ss;
        let a_pooled = pooled.sources.iter().find(|s| s.name == "a").unwrap().ss;
        assert!((a_initial - a_pooled).abs() < 1e-12);
    }

    #[test]
    fn pooling_everything_returns_none() {
        // Pure noise: every factor is weak, so pooling would empty the
        // table and the initial table stands alone.
        let array = find_array("L4(2^3)").unwrap();
        let factors = vec![factor("a"), factor("b")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let responses = responses_for(&[10.0, 10.1, 9.9, 10.05]);
        let initial = initial_table(array, &assignment, &factors, &responses);
        // Thresholds that pool everything.
        assert!(pooled_table(&initial, 0.0, 100.0).is_none());
    }

    #[test]
    fn strong_sources_only_returns_none() {
        let array = find_array("L8(2^7)").unwrap();
        let factors = vec![factor("a")];
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let responses = responses_for(&[10.0, 10.0, 10.0, 10.0, 1000.0, 1000.0, 1000.0, 1000.0]);
        let initial = initial_table(array, &assignment, &factors, &responses);
        assert!(pooled_table(&initial, 0.25, 5.0).is_none());
    }
}
