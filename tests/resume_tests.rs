//! Resume and checkpoint integrity tests.
//!
//! An interrupted experiment must pick up at the first incomplete
//! repetition — not the next run — and, with a deterministic target,
//! finish with exactly the analysis an uninterrupted run produces.

#![cfg(unix)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use orthotune::checkpoint::{CheckpointState, Checkpointer};
use orthotune::oa::catalog::find_array;
use orthotune::oa::DesignAssignment;
use orthotune::store::{MetricReading, ResultStore};
use orthotune::{resume, start, EngineConfig, EngineError};

// ============================================================================
// Helpers
// ============================================================================

/// Deterministic target: Y = A + 10·B + 100·C + NOISE.
const TARGET_BODY: &str = r#"
A=0; B=0; C=0
while [ $# -gt 0 ]; do
  case "$1" in
    -a) A=$2; shift 2;;
    -b) B=$2; shift 2;;
    -c) C=$2; shift 2;;
    *) shift;;
  esac
done
echo "v^v^v^RESULT^v^v^v"
echo "{\"result\": {\"Y\": $((A + 10 * B + 100 * C + NOISE))}}"
"#;

fn write_target(dir: &Path) -> PathBuf {
    let path = dir.join("target.sh");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    write!(file, "{TARGET_BODY}").unwrap();
    let mut perms = file.metadata().unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn config_for(target: &Path, out_dir: &Path) -> EngineConfig {
    let toml_str = format!(
        r#"
[experiment]
target_executable = "{}"
repetitions = 3
output_directory = "{}"

[[metrics]]
name = "Y"
criterion = "larger-better"

[[control_factors]]
name = "A"
cli_arg = "-a"
levels = ["1", "2"]

[[control_factors]]
name = "B"
cli_arg = "-b"
levels = ["1", "2"]

[[control_factors]]
name = "C"
cli_arg = "-c"
levels = ["1", "2"]

[[noise_factors]]
name = "N"
env_var = "NOISE"
levels = ["1", "2", "3"]
"#,
        target.display(),
        out_dir.display()
    );
    toml::from_str(&toml_str).unwrap()
}

/// What the deterministic target reports for a given run and repetition.
fn expected_reading(config: &EngineConfig, run: usize, repetition: usize) -> MetricReading {
    let array = find_array("L8(2^7)").unwrap();
    let factors = config.build_control_factors().unwrap();
    let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
    let row = assignment.trial_row(array, &factors, run).unwrap();

    let a: f64 = row.levels["A"].value.parse().unwrap();
    let b: f64 = row.levels["B"].value.parse().unwrap();
    let c: f64 = row.levels["C"].value.parse().unwrap();
    let noise = ((repetition - 1) % 3 + 1) as f64;

    let mut reading = MetricReading::new();
    reading.insert("Y".to_string(), a + 10.0 * b + 100.0 * c + noise);
    reading
}

/// Build the checkpoint an experiment interrupted after run 3
/// repetition 1 would have left behind.
fn interrupted_state(config: &EngineConfig) -> CheckpointState {
    let array = find_array("L8(2^7)").unwrap();
    let factors = config.build_control_factors().unwrap();
    let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();

    let mut store = ResultStore::new(3);
    for run in 1..=2 {
        for repetition in 1..=3 {
            store.record(run, Some(expected_reading(config, run, repetition)));
        }
    }
    store.record(3, Some(expected_reading(config, 3, 1)));

    CheckpointState::new(config.clone(), assignment, store)
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn resume_continues_at_the_incomplete_repetition() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path());
    let out_dir = dir.path().join("out");
    let config = config_for(&target, &out_dir);

    std::fs::create_dir_all(&out_dir).unwrap();
    let checkpointer = Checkpointer::new(&out_dir);
    let mut state = interrupted_state(&config);
    checkpointer.save(&mut state).unwrap();

    let outcome = resume(checkpointer.path(), &CancellationToken::new()).unwrap();

    // Run 3 kept its pre-interruption repetition and gained the missing
    // two; later runs were executed from scratch.
    let run_3 = &outcome.report.runs[2];
    assert_eq!(run_3.metrics["Y"].samples, 3);
    // Noise cycles 1, 2, 3 across absolute repetitions, so the raw mean
    // includes one reading per noise level.
    let expected_mean: f64 = (1..=3)
        .map(|rep| expected_reading(&config, 3, rep)["Y"])
        .sum::<f64>()
        / 3.0;
    assert!((run_3.metrics["Y"].mean - expected_mean).abs() < 1e-9);

    for run in &outcome.report.runs {
        assert_eq!(run.metrics["Y"].samples, 3, "run {}", run.run);
    }
}

#[test]
fn resumed_analysis_equals_uninterrupted_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path());

    // Uninterrupted reference run.
    let full_out = dir.path().join("full");
    let full = start(config_for(&target, &full_out), &CancellationToken::new()).unwrap();

    // Interrupted-then-resumed run in a separate directory.
    let resumed_out = dir.path().join("resumed");
    std::fs::create_dir_all(&resumed_out).unwrap();
    let config = config_for(&target, &resumed_out);
    let checkpointer = Checkpointer::new(&resumed_out);
    let mut state = interrupted_state(&config);
    checkpointer.save(&mut state).unwrap();
    let resumed = resume(checkpointer.path(), &CancellationToken::new()).unwrap();

    // The deterministic target makes both analyses identical.
    let full_metrics = serde_json::to_value(&full.report.metrics).unwrap();
    let resumed_metrics = serde_json::to_value(&resumed.report.metrics).unwrap();
    assert_eq!(full_metrics, resumed_metrics);

    let full_runs = serde_json::to_value(&full.report.runs).unwrap();
    let resumed_runs = serde_json::to_value(&resumed.report.runs).unwrap();
    assert_eq!(full_runs, resumed_runs);
}

#[test]
fn completed_experiment_resumes_into_analysis_only() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path());
    let out_dir = dir.path().join("out");
    let first = start(config_for(&target, &out_dir), &CancellationToken::new()).unwrap();

    // Resuming a finished experiment executes nothing and re-analyzes.
    let again = resume(&first.state_path, &CancellationToken::new()).unwrap();
    assert_eq!(
        serde_json::to_value(&first.report.metrics).unwrap(),
        serde_json::to_value(&again.report.metrics).unwrap()
    );
}

#[test]
fn corrupted_checkpoint_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path());
    let out_dir = dir.path().join("out");
    let outcome = start(config_for(&target, &out_dir), &CancellationToken::new()).unwrap();

    // Run 1 repetition 1 reads Y = 1 + 10 + 100 + 1 = 112; flip it.
    let text = std::fs::read_to_string(&outcome.state_path).unwrap();
    let tampered = text.replace("112.0", "999.0");
    assert_ne!(text, tampered, "expected a 112.0 reading in the checkpoint");
    std::fs::write(&outcome.state_path, tampered).unwrap();

    let result = resume(&outcome.state_path, &CancellationToken::new());
    assert!(matches!(result, Err(EngineError::Checkpoint(_))));
}
