//! Orthotune — Taguchi-method parameter optimization for black-box
//! programs.
//!
//! The engine designs an experiment over discrete-level control factors
//! using a standard orthogonal array, drives an external target once per
//! designed trial (cycling noise factors across repetitions), collects the
//! metrics the target emits behind a sentinel line, and produces a
//! statistical report per metric: S/N aggregation, ANOVA with pooling,
//! optimal level selection and a prediction with confidence interval.
//!
//! ## Architecture
//!
//! - **Factor model** (`factors`): control/noise factors with ordered
//!   string levels and CLI/env bindings
//! - **Orthogonal arrays** (`oa`): the L4–L27 catalog, DOF-based
//!   selection, greedy column assignment with interaction reservation
//! - **Trial driver** (`driver`): invocation assembly, subprocess
//!   execution with process-group timeout, sentinel response parsing
//! - **Persistence** (`store`, `checkpoint`, `lockfile`): run results,
//!   atomic digest-validated checkpoints, output directory locking
//! - **Statistics** (`stats`): S/N transforms, effects, ANOVA, pooling,
//!   prediction
//! - **Controller** (`controller`): Design → Execute → Analyze, with
//!   `start` / `resume` / `analyze_only` entry points

pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod factors;
pub mod lockfile;
pub mod oa;
pub mod report;
pub mod stats;
pub mod store;

// Re-export the engine surface
pub use config::{EngineConfig, MetricSpec};
pub use controller::{analyze_only, resume, start, ExperimentOutcome};
pub use error::{EngineError, EngineWarning};
pub use factors::{Factor, FactorRole, Level};
pub use oa::{DesignAssignment, OrthogonalArray};
pub use report::ReportPayload;
pub use stats::{MetricAnalysis, SnCriterion};
pub use store::{MetricReading, ResultStore};
