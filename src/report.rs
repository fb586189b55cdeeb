//! Report payload assembly.
//!
//! Shapes the per-metric analyses and the raw run data into one
//! language-neutral, serializable payload. Report writers (HTML, Markdown,
//! dashboards) live outside the engine and consume this as JSON.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::EngineWarning;
use crate::factors::Factor;
use crate::oa::{DesignAssignment, OrthogonalArray};
use crate::stats::MetricAnalysis;

/// Per-metric summary of one experimental run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetricSummary {
    /// Average raw value across the run's repetitions.
    pub mean: f64,
    /// The run's S/N ratio, absent when it was dropped from analysis.
    pub sn: Option<f64>,
    pub samples: usize,
}

/// One row of the shared experimental-runs table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run: usize,
    /// Control factor name → level value for this run.
    pub levels: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, RunMetricSummary>,
}

/// The complete payload handed to report writers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub engine_version: String,
    pub generated_at: String,
    pub array: String,
    pub repetitions: usize,
    pub metrics: Vec<MetricAnalysis>,
    pub runs: Vec<RunRecord>,
    /// Experiment-level warnings from the execution phase.
    pub warnings: Vec<String>,
}

/// Assemble the payload from the analysis results and the design.
pub fn assemble(
    config: &EngineConfig,
    array: &OrthogonalArray,
    assignment: &DesignAssignment,
    factors: &[Factor],
    metrics: Vec<MetricAnalysis>,
    execution_warnings: &[EngineWarning],
) -> ReportPayload {
    let runs = (1..=array.runs())
        .map(|run| {
            let levels = factors
                .iter()
                .filter_map(|factor| {
                    let column = assignment.factor_column(&factor.name)?;
                    let index = array.level_at(run, column);
                    let level = factor.level_at(index).ok()?;
                    Some((factor.name.clone(), level.value.clone()))
                })
                .collect();

            let metric_summaries = metrics
                .iter()
                .map(|analysis| {
                    let response = analysis.run_responses.iter().find(|r| r.run == run);
                    let summary = RunMetricSummary {
                        mean: response.map_or(f64::NAN, |r| r.raw_mean),
                        sn: response.map(|r| r.sn),
                        samples: response.map_or(0, |r| r.samples),
                    };
                    (analysis.metric.clone(), summary)
                })
                .collect();

            RunRecord {
                run,
                levels,
                metrics: metric_summaries,
            }
        })
        .collect();

    ReportPayload {
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        array: array.designation().to_string(),
        repetitions: config.experiment.repetitions,
        metrics,
        runs,
        warnings: execution_warnings.iter().map(ToString::to_string).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisConfig, CriterionConfig, MetricSpec};
    use crate::oa::catalog::find_array;
    use crate::stats::analyze_metric;
    use crate::store::{MetricReading, ResultStore};

    fn build_payload() -> ReportPayload {
        let toml_str = r#"
[experiment]
target_executable = "./bench.sh"
repetitions = 1

[[metrics]]
name = "y"
criterion = "larger-better"

[[control_factors]]
name = "a"
cli_arg = "-a"
levels = ["10", "20"]

[[control_factors]]
name = "b"
cli_arg = "-b"
levels = ["low", "high"]
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        let factors = config.build_control_factors().unwrap();
        let array = find_array("L4(2^3)").unwrap();
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();

        let mut store = ResultStore::new(1);
        for (run, v) in [(1, 11.0), (2, 21.0), (3, 12.0), (4, 22.0)] {
            let mut reading = MetricReading::new();
            reading.insert("y".to_string(), v);
            store.record(run, Some(reading));
        }

        let spec = MetricSpec {
            name: "y".to_string(),
            criterion: CriterionConfig::LargerBetter,
            target: None,
        };
        let analysis = analyze_metric(
            &spec,
            &AnalysisConfig::default(),
            &store,
            array,
            &assignment,
            &factors,
        );
        assemble(&config, array, &assignment, &factors, vec![analysis], &[])
    }

    #[test]
    fn runs_table_covers_every_designed_run() {
        let payload = build_payload();
        assert_eq!(payload.array, "L4(2^3)");
        assert_eq!(payload.runs.len(), 4);
        // Row 1 of L4 is all level 1.
        assert_eq!(payload.runs[0].levels["a"], "10");
        assert_eq!(payload.runs[0].levels["b"], "low");
        // Row 4 is [2, 2, 1].
        assert_eq!(payload.runs[3].levels["a"], "20");
        assert_eq!(payload.runs[3].levels["b"], "high");
    }

    #[test]
    fn run_records_carry_metric_summaries() {
        let payload = build_payload();
        let summary = &payload.runs[1].metrics["y"];
        assert!((summary.mean - 21.0).abs() < 1e-9);
        assert!(summary.sn.is_some());
        assert_eq!(summary.samples, 1);
    }

    #[test]
    fn payload_serializes_to_camel_case_json() {
        let payload = build_payload();
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("engineVersion").is_some());
        assert!(json.get("generatedAt").is_some());
        let metric = &json["metrics"][0];
        assert!(metric.get("snType").is_some());
        assert!(metric.get("mainEffects").is_some());
        assert!(metric.get("pooledAnova").is_some() || metric["pooledAnova"].is_null());
        // Internal run responses stay out of the serialized metric.
        assert!(metric.get("runResponses").is_none());
    }
}
