//! Persistent experiment state with atomic writes and digest validation.
//!
//! After every completed trial the full experiment state is serialized to
//! one JSON document: configuration snapshot, array designation,
//! assignment, per-run readings, a monotone counter and an md5 digest of
//! the canonical body. Writes go to a temporary sibling, fsync, then
//! rename over the target, so a crash never leaves a torn file. All maps
//! in the state are `BTreeMap`s, which makes the serialized body canonical
//! and the digest reproducible.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::oa::DesignAssignment;
use crate::store::ResultStore;

/// Checkpoint persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint i/o at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint serialization: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("checkpoint digest mismatch: expected {expected}, found {found}")]
    Corrupt { expected: String, found: String },
}

/// The full persisted experiment state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub engine_version: String,
    pub created_at: String,
    pub array: String,
    pub config: EngineConfig,
    pub assignment: DesignAssignment,
    pub store: ResultStore,
    pub counter: u64,
    pub digest: String,
}

impl CheckpointState {
    pub fn new(config: EngineConfig, assignment: DesignAssignment, store: ResultStore) -> Self {
        Self {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            array: assignment.array_designation().to_string(),
            config,
            assignment,
            store,
            counter: 0,
            digest: String::new(),
        }
    }

    /// md5 hex of the canonical body: the state serialized with an empty
    /// digest field.
    fn body_digest(&self) -> Result<String, CheckpointError> {
        let mut body = self.clone();
        body.digest = String::new();
        let bytes = serde_json::to_vec(&body)?;
        Ok(format!("{:x}", md5::compute(bytes)))
    }
}

/// Writes and reloads checkpoint files for one experiment.
#[derive(Debug)]
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    pub const FILE_NAME: &'static str = "orthotune-state.json";

    pub fn new(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join(Self::FILE_NAME),
        }
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the state atomically, bumping the counter and refreshing
    /// the digest.
    pub fn save(&self, state: &mut CheckpointState) -> Result<(), CheckpointError> {
        state.counter += 1;
        state.digest = state.body_digest()?;

        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(state)?;
        let io_err = |source| CheckpointError::Io {
            path: tmp.clone(),
            source,
        };

        let mut file = std::fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        std::fs::rename(&tmp, &self.path).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(counter = state.counter, path = %self.path.display(), "checkpoint written");
        Ok(())
    }

    /// Load and digest-validate a checkpoint.
    pub fn load(path: &Path) -> Result<CheckpointState, CheckpointError> {
        let bytes = std::fs::read(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let state: CheckpointState = serde_json::from_slice(&bytes)?;

        let expected = state.body_digest()?;
        if expected != state.digest {
            return Err(CheckpointError::Corrupt {
                expected,
                found: state.digest,
            });
        }
        if state.engine_version != env!("CARGO_PKG_VERSION") {
            warn!(
                checkpoint_version = %state.engine_version,
                engine_version = env!("CARGO_PKG_VERSION"),
                "checkpoint written by a different engine version"
            );
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::Factor;
    use crate::oa::catalog::find_array;
    use crate::store::MetricReading;

    fn sample_state() -> CheckpointState {
        let toml_str = r#"
[experiment]
target_executable = "./bench.sh"
repetitions = 2

[[metrics]]
name = "y"
criterion = "smaller-better"

[[control_factors]]
name = "a"
cli_arg = "-a"
levels = ["1", "2"]

[[control_factors]]
name = "b"
cli_arg = "-b"
levels = ["1", "2"]
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        let factors: Vec<Factor> = config.build_control_factors().unwrap();
        let array = find_array("L4(2^3)").unwrap();
        let assignment = DesignAssignment::build(array, &factors, &[]).unwrap();
        let mut store = ResultStore::new(2);
        let mut reading = MetricReading::new();
        reading.insert("y".to_string(), 12.5);
        store.record(1, Some(reading));
        store.record(1, None);
        CheckpointState::new(config, assignment, store)
    }

    #[test]
    fn save_load_roundtrip_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path());
        let mut state = sample_state();
        checkpointer.save(&mut state).unwrap();

        let loaded = Checkpointer::load(checkpointer.path()).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.counter, 1);
        assert_eq!(loaded.store.finite_values(1, "y"), vec![12.5]);
    }

    #[test]
    fn counter_is_monotone_across_saves() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path());
        let mut state = sample_state();
        checkpointer.save(&mut state).unwrap();
        checkpointer.save(&mut state).unwrap();
        checkpointer.save(&mut state).unwrap();
        let loaded = Checkpointer::load(checkpointer.path()).unwrap();
        assert_eq!(loaded.counter, 3);
    }

    #[test]
    fn reserialized_body_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path());
        let mut state = sample_state();
        checkpointer.save(&mut state).unwrap();

        let loaded = Checkpointer::load(checkpointer.path()).unwrap();
        let first = serde_json::to_vec(&state).unwrap();
        let second = serde_json::to_vec(&loaded).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn tampered_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path());
        let mut state = sample_state();
        checkpointer.save(&mut state).unwrap();

        let text = std::fs::read_to_string(checkpointer.path()).unwrap();
        let tampered = text.replace("12.5", "99.9");
        assert_ne!(text, tampered, "tamper target must exist in the body");
        std::fs::write(checkpointer.path(), tampered).unwrap();

        let result = Checkpointer::load(checkpointer.path());
        assert!(matches!(result, Err(CheckpointError::Corrupt { .. })));
    }

    #[test]
    fn no_temporary_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path());
        let mut state = sample_state();
        checkpointer.save(&mut state).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "tmp files remain: {leftovers:?}");
    }
}
