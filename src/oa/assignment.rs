//! Column assignment: factors to array columns, interactions to reserved
//! columns.
//!
//! Assignment is greedy and deterministic: factors sorted by descending
//! level count then name take the leftmost free column of matching level
//! count; requested interactions then reserve the column(s) from the
//! array's interaction table. The result is immutable and travels inside
//! every checkpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::factors::{Factor, FactorError, Level};

use super::{DesignError, OrthogonalArray};

/// A reserved interaction between two assigned factors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionAssignment {
    pub first: String,
    pub second: String,
    /// Columns carrying the interaction contrast (one for 2-level pairs,
    /// two for 3-level pairs).
    pub columns: Vec<usize>,
}

/// Immutable mapping of factors and interactions onto array columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignAssignment {
    array: String,
    factor_columns: BTreeMap<String, usize>,
    interactions: Vec<InteractionAssignment>,
}

/// One designed trial: the run index and each control factor's level.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRow {
    pub run: usize,
    pub levels: BTreeMap<String, Level>,
}

impl DesignAssignment {
    /// Greedily assign control factors and reserve interaction columns.
    pub fn build(
        array: &OrthogonalArray,
        factors: &[Factor],
        interactions: &[(String, String)],
    ) -> Result<Self, DesignError> {
        let mut order: Vec<&Factor> = factors.iter().collect();
        order.sort_by(|a, b| {
            b.level_count()
                .cmp(&a.level_count())
                .then_with(|| a.name.cmp(&b.name))
        });

        let mut factor_columns = BTreeMap::new();
        let mut used = std::collections::BTreeSet::new();

        for factor in order {
            let column = (1..=array.column_count())
                .find(|&c| array.column_levels(c) == factor.level_count() && !used.contains(&c))
                .ok_or(DesignError::NoSuitableArray {
                    factors: factors.len(),
                    interactions: interactions.len(),
                    dof_required: array.total_dof() + 1,
                })?;
            used.insert(column);
            factor_columns.insert(factor.name.clone(), column);
        }

        let mut reserved = Vec::new();
        for (a, b) in interactions {
            let ca = *factor_columns
                .get(a)
                .ok_or_else(|| DesignError::UnknownFactor { name: a.clone() })?;
            let cb = *factor_columns
                .get(b)
                .ok_or_else(|| DesignError::UnknownFactor { name: b.clone() })?;
            let columns =
                array
                    .interaction_columns(ca, cb)
                    .ok_or_else(|| DesignError::InteractionNotTabulated {
                        array: array.designation().to_string(),
                        first: ca,
                        second: cb,
                    })?;
            for &column in columns {
                if !used.insert(column) {
                    return Err(DesignError::InteractionColumnConflict {
                        first: a.clone(),
                        second: b.clone(),
                        column,
                    });
                }
            }
            reserved.push(InteractionAssignment {
                first: a.clone(),
                second: b.clone(),
                columns: columns.to_vec(),
            });
        }

        Ok(Self {
            array: array.designation().to_string(),
            factor_columns,
            interactions: reserved,
        })
    }

    pub fn array_designation(&self) -> &str {
        &self.array
    }

    pub fn factor_column(&self, name: &str) -> Option<usize> {
        self.factor_columns.get(name).copied()
    }

    pub fn factor_columns(&self) -> &BTreeMap<String, usize> {
        &self.factor_columns
    }

    pub fn interactions(&self) -> &[InteractionAssignment] {
        &self.interactions
    }

    /// Derive the trial row for a 1-based run index: each factor takes the
    /// level its assigned column prescribes for that row.
    pub fn trial_row(
        &self,
        array: &OrthogonalArray,
        factors: &[Factor],
        run: usize,
    ) -> Result<TrialRow, FactorError> {
        let mut levels = BTreeMap::new();
        for factor in factors {
            if let Some(column) = self.factor_column(&factor.name) {
                let index = array.level_at(run, column);
                levels.insert(factor.name.clone(), factor.level_at(index)?.clone());
            }
        }
        Ok(TrialRow { run, levels })
    }
}
