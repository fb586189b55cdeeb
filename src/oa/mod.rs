//! Orthogonal arrays: the standard catalog and design assignment.
//!
//! An orthogonal array is a run-by-column matrix of 1-based level indices
//! whose columns are pairwise balanced: every level pair appears equally
//! often across any two columns. Factors are assigned to columns, requested
//! interactions reserve the column(s) carrying their contrast, and each row
//! of the matrix becomes one designed trial.

pub mod assignment;
pub mod catalog;

pub use assignment::{DesignAssignment, InteractionAssignment, TrialRow};
pub use catalog::{find_array, select_array};

/// Design-time errors: array selection and column assignment.
#[derive(Debug, thiserror::Error)]
pub enum DesignError {
    #[error(
        "no catalog array supports {factors} factors with {interactions} interactions \
         ({dof_required} DOF required)"
    )]
    NoSuitableArray {
        factors: usize,
        interactions: usize,
        dof_required: usize,
    },
    #[error(
        "interaction '{first}' x '{second}': column {column} is already taken"
    )]
    InteractionColumnConflict {
        first: String,
        second: String,
        column: usize,
    },
    #[error("interaction references unknown control factor '{name}'")]
    UnknownFactor { name: String },
    #[error("array '{array}' has no interaction entry for columns {first} and {second}")]
    InteractionNotTabulated {
        array: String,
        first: usize,
        second: usize,
    },
    #[error("checkpoint names unknown array '{designation}'")]
    UnknownArray { designation: String },
}

/// A standard orthogonal array with its interaction table.
///
/// Matrices are constant data; levels are 1-based. The interaction table
/// maps an unordered column pair to the column(s) expressing their
/// interaction: one column for 2-level pairs, two columns for 3-level
/// pairs (which carry 2 DOF each, 4 total).
#[derive(Debug, Clone, Copy)]
pub struct OrthogonalArray {
    designation: &'static str,
    columns: &'static [usize],
    matrix: &'static [&'static [u8]],
    interactions: &'static [((usize, usize), &'static [usize])],
}

impl OrthogonalArray {
    pub fn designation(&self) -> &'static str {
        self.designation
    }

    /// Number of runs (rows).
    pub fn runs(&self) -> usize {
        self.matrix.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Level count of a 1-based column.
    pub fn column_levels(&self, column: usize) -> usize {
        self.columns[column - 1]
    }

    /// Degrees of freedom of a 1-based column: levels − 1.
    pub fn column_dof(&self, column: usize) -> usize {
        self.columns[column - 1] - 1
    }

    /// Total degrees of freedom available: runs − 1.
    pub fn total_dof(&self) -> usize {
        self.runs() - 1
    }

    /// Level index at (1-based run, 1-based column).
    pub fn level_at(&self, run: usize, column: usize) -> usize {
        self.matrix[run - 1][column - 1] as usize
    }

    /// Number of columns holding exactly `levels` levels.
    pub fn columns_with_levels(&self, levels: usize) -> usize {
        self.columns.iter().filter(|&&l| l == levels).count()
    }

    /// Columns carrying the interaction of two assigned columns, if the
    /// array tabulates it. Order-insensitive.
    pub fn interaction_columns(&self, a: usize, b: usize) -> Option<&'static [usize]> {
        let key = (a.min(b), a.max(b));
        self.interactions
            .iter()
            .find(|(pair, _)| *pair == key)
            .map(|(_, cols)| *cols)
    }

    /// Whether this array tabulates interactions at all. Arrays like L12
    /// and L18 distribute interactions across all columns and cannot
    /// reserve them.
    pub fn has_interaction_table(&self) -> bool {
        !self.interactions.is_empty()
    }

    /// Verify pairwise column balance: for any two columns, every level
    /// pair appears the same number of times.
    pub fn is_orthogonal(&self) -> bool {
        let n = self.runs();
        for c1 in 1..=self.column_count() {
            for c2 in (c1 + 1)..=self.column_count() {
                let cells = self.column_levels(c1) * self.column_levels(c2);
                if n % cells != 0 {
                    return false;
                }
                let expected = n / cells;
                let mut counts = std::collections::BTreeMap::new();
                for run in 1..=n {
                    *counts
                        .entry((self.level_at(run, c1), self.level_at(run, c2)))
                        .or_insert(0usize) += 1;
                }
                if counts.len() != cells || counts.values().any(|&c| c != expected) {
                    return false;
                }
            }
        }
        true
    }
}
