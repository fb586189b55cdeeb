//! Factor and level model.
//!
//! A factor is a named parameter of the target program with a discrete,
//! ordered set of levels. Control factors are optimized; noise factors are
//! cycled across repetitions to measure robustness. Levels are stored as
//! plain (index, value) pairs — factor identity travels alongside them
//! through the pipeline, so there are no back-references.

use serde::{Deserialize, Serialize};

/// Factor model errors. These surface before any trial is executed.
#[derive(Debug, thiserror::Error)]
pub enum FactorError {
    #[error("factor '{factor}': level index {index} out of range 1..={level_count}")]
    InvalidLevelIndex {
        factor: String,
        index: usize,
        level_count: usize,
    },
    #[error("factor '{factor}': at least one of cli_arg or env_var must be set")]
    InvalidBinding { factor: String },
    #[error("factor '{factor}': level set is empty")]
    EmptyLevels { factor: String },
}

/// Whether a factor is optimized or varied for robustness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorRole {
    Control,
    Noise,
}

/// One discrete setting of a factor.
///
/// `index` is 1-based and aligns with the orthogonal array's level
/// encoding; `value` is the exact string handed to the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub index: usize,
    pub value: String,
}

/// How a factor's value reaches the target program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bindings<'a> {
    pub cli: Option<&'a str>,
    pub env: Option<&'a str>,
}

/// A named parameter with an ordered level set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub role: FactorRole,
    pub cli_arg: Option<String>,
    pub env_var: Option<String>,
    levels: Vec<Level>,
}

impl Factor {
    /// Build a factor from pre-materialized level values.
    ///
    /// Rejects factors with no binding or no levels; the configuration
    /// layer additionally requires at least two levels for control factors.
    pub fn new(
        name: impl Into<String>,
        role: FactorRole,
        cli_arg: Option<String>,
        env_var: Option<String>,
        values: Vec<String>,
    ) -> Result<Self, FactorError> {
        let name = name.into();
        if cli_arg.is_none() && env_var.is_none() {
            return Err(FactorError::InvalidBinding { factor: name });
        }
        if values.is_empty() {
            return Err(FactorError::EmptyLevels { factor: name });
        }
        let levels = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Level { index: i + 1, value })
            .collect();
        Ok(Self {
            name,
            role,
            cli_arg,
            env_var,
            levels,
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Degrees of freedom contributed to the design: L − 1.
    pub fn dof(&self) -> usize {
        self.levels.len() - 1
    }

    /// Ordered (index, value) sequence.
    pub fn levels_of(&self) -> &[Level] {
        &self.levels
    }

    /// Level at a 1-based index.
    pub fn level_at(&self, index: usize) -> Result<&Level, FactorError> {
        if index == 0 || index > self.levels.len() {
            return Err(FactorError::InvalidLevelIndex {
                factor: self.name.clone(),
                index,
                level_count: self.levels.len(),
            });
        }
        Ok(&self.levels[index - 1])
    }

    /// Level for an absolute repetition number, cycling modularly.
    ///
    /// Noise factor at repetition r takes level ((r−1) mod L) + 1, so each
    /// noise factor cycles independently and a resumed run continues the
    /// cycle where it left off.
    pub fn level_for_repetition(&self, repetition: usize) -> &Level {
        debug_assert!(repetition >= 1);
        &self.levels[(repetition - 1) % self.levels.len()]
    }

    pub fn bindings(&self) -> Bindings<'_> {
        Bindings {
            cli: self.cli_arg.as_deref(),
            env: self.env_var.as_deref(),
        }
    }
}
