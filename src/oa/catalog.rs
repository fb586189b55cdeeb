//! Standard orthogonal array catalog.
//!
//! Fixed matrices for the L4–L27 families with their interaction tables.
//! The 2-level arrays (L4, L8, L16) and 3-level arrays (L9, L27) come from
//! the usual linear constructions over GF(2)/GF(3), so interaction lookups
//! are exact; L12 and L18 distribute interactions across all columns and
//! carry empty tables. Selection returns the smallest array whose degrees
//! of freedom and per-level column supply cover the request.

use crate::factors::Factor;

use super::{DesignError, OrthogonalArray};

// ============================================================================
// Array data
// ============================================================================

// ---- L4(2^3)
const L4_MATRIX: &[&[u8]] = &[
    &[1, 1, 1],
    &[1, 2, 2],
    &[2, 1, 2],
    &[2, 2, 1],
];
const L4_COLUMNS: &[usize] = &[2, 2, 2];
const L4_INTERACTIONS: &[((usize, usize), &[usize])] =
    &[((1, 2), &[3]), ((1, 3), &[2]), ((2, 3), &[1])];

// ---- L8(2^7)
const L8_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1, 1, 1, 1],
    &[1, 1, 1, 2, 2, 2, 2],
    &[1, 2, 2, 1, 1, 2, 2],
    &[1, 2, 2, 2, 2, 1, 1],
    &[2, 1, 2, 1, 2, 1, 2],
    &[2, 1, 2, 2, 1, 2, 1],
    &[2, 2, 1, 1, 2, 2, 1],
    &[2, 2, 1, 2, 1, 1, 2],
];
const L8_COLUMNS: &[usize] = &[2, 2, 2, 2, 2, 2, 2];
const L8_INTERACTIONS: &[((usize, usize), &[usize])] = &[
    ((1, 2), &[3]),
    ((1, 3), &[2]),
    ((1, 4), &[5]),
    ((1, 5), &[4]),
    ((1, 6), &[7]),
    ((1, 7), &[6]),
    ((2, 3), &[1]),
    ((2, 4), &[6]),
    ((2, 5), &[7]),
    ((2, 6), &[4]),
    ((2, 7), &[5]),
    ((3, 4), &[7]),
    ((3, 5), &[6]),
    ((3, 6), &[5]),
    ((3, 7), &[4]),
    ((4, 5), &[1]),
    ((4, 6), &[2]),
    ((4, 7), &[3]),
    ((5, 6), &[3]),
    ((5, 7), &[2]),
    ((6, 7), &[1]),
];

// ---- L9(3^4)
const L9_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1],
    &[1, 2, 2, 2],
    &[1, 3, 3, 3],
    &[2, 1, 2, 3],
    &[2, 2, 3, 1],
    &[2, 3, 1, 2],
    &[3, 1, 3, 2],
    &[3, 2, 1, 3],
    &[3, 3, 2, 1],
];
const L9_COLUMNS: &[usize] = &[3, 3, 3, 3];
const L9_INTERACTIONS: &[((usize, usize), &[usize])] = &[
    ((1, 2), &[3, 4]),
    ((1, 3), &[2, 4]),
    ((1, 4), &[2, 3]),
    ((2, 3), &[1, 4]),
    ((2, 4), &[1, 3]),
    ((3, 4), &[1, 2]),
];

// ---- L12(2^11), Plackett-Burman: no interaction table
const L12_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
    &[1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2],
    &[1, 1, 2, 2, 2, 1, 1, 1, 2, 2, 2],
    &[1, 2, 1, 2, 2, 1, 2, 2, 1, 1, 2],
    &[1, 2, 2, 1, 2, 2, 1, 2, 1, 2, 1],
    &[1, 2, 2, 2, 1, 2, 2, 1, 2, 1, 1],
    &[2, 1, 2, 2, 1, 1, 2, 2, 1, 2, 1],
    &[2, 1, 2, 1, 2, 2, 2, 1, 1, 1, 2],
    &[2, 1, 1, 2, 2, 2, 1, 2, 2, 1, 1],
    &[2, 2, 2, 1, 1, 1, 1, 2, 2, 1, 2],
    &[2, 2, 1, 2, 1, 2, 1, 1, 1, 2, 2],
    &[2, 2, 1, 1, 2, 1, 2, 1, 2, 2, 1],
];
const L12_COLUMNS: &[usize] = &[2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2];
const L12_INTERACTIONS: &[((usize, usize), &[usize])] = &[];

// ---- L16(2^15)
const L16_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
    &[1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2],
    &[1, 1, 1, 2, 2, 2, 2, 1, 1, 1, 1, 2, 2, 2, 2],
    &[1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1],
    &[1, 2, 2, 1, 1, 2, 2, 1, 1, 2, 2, 1, 1, 2, 2],
    &[1, 2, 2, 1, 1, 2, 2, 2, 2, 1, 1, 2, 2, 1, 1],
    &[1, 2, 2, 2, 2, 1, 1, 1, 1, 2, 2, 2, 2, 1, 1],
    &[1, 2, 2, 2, 2, 1, 1, 2, 2, 1, 1, 1, 1, 2, 2],
    &[2, 1, 2, 1, 2, 1, 2, 1, 2, 1, 2, 1, 2, 1, 2],
    &[2, 1, 2, 1, 2, 1, 2, 2, 1, 2, 1, 2, 1, 2, 1],
    &[2, 1, 2, 2, 1, 2, 1, 1, 2, 1, 2, 2, 1, 2, 1],
    &[2, 1, 2, 2, 1, 2, 1, 2, 1, 2, 1, 1, 2, 1, 2],
    &[2, 2, 1, 1, 2, 2, 1, 1, 2, 2, 1, 1, 2, 2, 1],
    &[2, 2, 1, 1, 2, 2, 1, 2, 1, 1, 2, 2, 1, 1, 2],
    &[2, 2, 1, 2, 1, 1, 2, 1, 2, 2, 1, 2, 1, 1, 2],
    &[2, 2, 1, 2, 1, 1, 2, 2, 1, 1, 2, 1, 2, 2, 1],
];
const L16_COLUMNS: &[usize] = &[2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2];
const L16_INTERACTIONS: &[((usize, usize), &[usize])] = &[
    ((1, 2), &[3]),
    ((1, 3), &[2]),
    ((1, 4), &[5]),
    ((1, 5), &[4]),
    ((1, 6), &[7]),
    ((1, 7), &[6]),
    ((1, 8), &[9]),
    ((1, 9), &[8]),
    ((1, 10), &[11]),
    ((1, 11), &[10]),
    ((1, 12), &[13]),
    ((1, 13), &[12]),
    ((1, 14), &[15]),
    ((1, 15), &[14]),
    ((2, 3), &[1]),
    ((2, 4), &[6]),
    ((2, 5), &[7]),
    ((2, 6), &[4]),
    ((2, 7), &[5]),
    ((2, 8), &[10]),
    ((2, 9), &[11]),
    ((2, 10), &[8]),
    ((2, 11), &[9]),
    ((2, 12), &[14]),
    ((2, 13), &[15]),
    ((2, 14), &[12]),
    ((2, 15), &[13]),
    ((3, 4), &[7]),
    ((3, 5), &[6]),
    ((3, 6), &[5]),
    ((3, 7), &[4]),
    ((3, 8), &[11]),
    ((3, 9), &[10]),
    ((3, 10), &[9]),
    ((3, 11), &[8]),
    ((3, 12), &[15]),
    ((3, 13), &[14]),
    ((3, 14), &[13]),
    ((3, 15), &[12]),
    ((4, 5), &[1]),
    ((4, 6), &[2]),
    ((4, 7), &[3]),
    ((4, 8), &[12]),
    ((4, 9), &[13]),
    ((4, 10), &[14]),
    ((4, 11), &[15]),
    ((4, 12), &[8]),
    ((4, 13), &[9]),
    ((4, 14), &[10]),
    ((4, 15), &[11]),
    ((5, 6), &[3]),
    ((5, 7), &[2]),
    ((5, 8), &[13]),
    ((5, 9), &[12]),
    ((5, 10), &[15]),
    ((5, 11), &[14]),
    ((5, 12), &[9]),
    ((5, 13), &[8]),
    ((5, 14), &[11]),
    ((5, 15), &[10]),
    ((6, 7), &[1]),
    ((6, 8), &[14]),
    ((6, 9), &[15]),
    ((6, 10), &[12]),
    ((6, 11), &[13]),
    ((6, 12), &[10]),
    ((6, 13), &[11]),
    ((6, 14), &[8]),
    ((6, 15), &[9]),
    ((7, 8), &[15]),
    ((7, 9), &[14]),
    ((7, 10), &[13]),
    ((7, 11), &[12]),
    ((7, 12), &[11]),
    ((7, 13), &[10]),
    ((7, 14), &[9]),
    ((7, 15), &[8]),
    ((8, 9), &[1]),
    ((8, 10), &[2]),
    ((8, 11), &[3]),
    ((8, 12), &[4]),
    ((8, 13), &[5]),
    ((8, 14), &[6]),
    ((8, 15), &[7]),
    ((9, 10), &[3]),
    ((9, 11), &[2]),
    ((9, 12), &[5]),
    ((9, 13), &[4]),
    ((9, 14), &[7]),
    ((9, 15), &[6]),
    ((10, 11), &[1]),
    ((10, 12), &[6]),
    ((10, 13), &[7]),
    ((10, 14), &[4]),
    ((10, 15), &[5]),
    ((11, 12), &[7]),
    ((11, 13), &[6]),
    ((11, 14), &[5]),
    ((11, 15), &[4]),
    ((12, 13), &[1]),
    ((12, 14), &[2]),
    ((12, 15), &[3]),
    ((13, 14), &[3]),
    ((13, 15), &[2]),
    ((14, 15), &[1]),
];

// ---- L18(2^1 x 3^7): mixed levels, no interaction table
const L18_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1, 1, 1, 1, 1],
    &[1, 1, 2, 2, 2, 2, 2, 2],
    &[1, 1, 3, 3, 3, 3, 3, 3],
    &[1, 2, 1, 1, 2, 2, 3, 3],
    &[1, 2, 2, 2, 3, 3, 1, 1],
    &[1, 2, 3, 3, 1, 1, 2, 2],
    &[1, 3, 1, 2, 1, 3, 2, 3],
    &[1, 3, 2, 3, 2, 1, 3, 1],
    &[1, 3, 3, 1, 3, 2, 1, 2],
    &[2, 1, 1, 3, 3, 2, 2, 1],
    &[2, 1, 2, 1, 1, 3, 3, 2],
    &[2, 1, 3, 2, 2, 1, 1, 3],
    &[2, 2, 1, 2, 3, 1, 3, 2],
    &[2, 2, 2, 3, 1, 2, 1, 3],
    &[2, 2, 3, 1, 2, 3, 2, 1],
    &[2, 3, 1, 3, 2, 3, 1, 2],
    &[2, 3, 2, 1, 3, 1, 2, 3],
    &[2, 3, 3, 2, 1, 2, 3, 1],
];
const L18_COLUMNS: &[usize] = &[2, 3, 3, 3, 3, 3, 3, 3];
const L18_INTERACTIONS: &[((usize, usize), &[usize])] = &[];

// ---- L27(3^13)
const L27_MATRIX: &[&[u8]] = &[
    &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
    &[1, 1, 1, 1, 2, 2, 3, 2, 3, 2, 3, 2, 3],
    &[1, 1, 1, 1, 3, 3, 2, 3, 2, 3, 2, 3, 2],
    &[1, 2, 2, 3, 1, 1, 1, 2, 2, 2, 3, 3, 2],
    &[1, 2, 2, 3, 2, 2, 3, 3, 1, 3, 2, 1, 1],
    &[1, 2, 2, 3, 3, 3, 2, 1, 3, 1, 1, 2, 3],
    &[1, 3, 3, 2, 1, 1, 1, 3, 3, 3, 2, 2, 3],
    &[1, 3, 3, 2, 2, 2, 3, 1, 2, 1, 1, 3, 2],
    &[1, 3, 3, 2, 3, 3, 2, 2, 1, 2, 3, 1, 1],
    &[2, 1, 2, 2, 1, 2, 2, 1, 1, 2, 2, 2, 2],
    &[2, 1, 2, 2, 2, 3, 1, 2, 3, 3, 1, 3, 1],
    &[2, 1, 2, 2, 3, 1, 3, 3, 2, 1, 3, 1, 3],
    &[2, 2, 3, 1, 1, 2, 2, 2, 2, 3, 1, 1, 3],
    &[2, 2, 3, 1, 2, 3, 1, 3, 1, 1, 3, 2, 2],
    &[2, 2, 3, 1, 3, 1, 3, 1, 3, 2, 2, 3, 1],
    &[2, 3, 1, 3, 1, 2, 2, 3, 3, 1, 3, 3, 1],
    &[2, 3, 1, 3, 2, 3, 1, 1, 2, 2, 2, 1, 3],
    &[2, 3, 1, 3, 3, 1, 3, 2, 1, 3, 1, 2, 2],
    &[3, 1, 3, 3, 1, 3, 3, 1, 1, 3, 3, 3, 3],
    &[3, 1, 3, 3, 2, 1, 2, 2, 3, 1, 2, 1, 2],
    &[3, 1, 3, 3, 3, 2, 1, 3, 2, 2, 1, 2, 1],
    &[3, 2, 1, 2, 1, 3, 3, 2, 2, 1, 2, 2, 1],
    &[3, 2, 1, 2, 2, 1, 2, 3, 1, 2, 1, 3, 3],
    &[3, 2, 1, 2, 3, 2, 1, 1, 3, 3, 3, 1, 2],
    &[3, 3, 2, 1, 1, 3, 3, 3, 3, 2, 1, 1, 2],
    &[3, 3, 2, 1, 2, 1, 2, 1, 2, 3, 3, 2, 1],
    &[3, 3, 2, 1, 3, 2, 1, 2, 1, 1, 2, 3, 3],
];
const L27_COLUMNS: &[usize] = &[3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3];
const L27_INTERACTIONS: &[((usize, usize), &[usize])] = &[
    ((1, 2), &[3, 4]),
    ((1, 3), &[2, 4]),
    ((1, 4), &[2, 3]),
    ((1, 5), &[6, 7]),
    ((1, 6), &[5, 7]),
    ((1, 7), &[5, 6]),
    ((1, 8), &[10, 11]),
    ((1, 9), &[12, 13]),
    ((1, 10), &[8, 11]),
    ((1, 11), &[8, 10]),
    ((1, 12), &[9, 13]),
    ((1, 13), &[9, 12]),
    ((2, 3), &[1, 4]),
    ((2, 4), &[1, 3]),
    ((2, 5), &[8, 9]),
    ((2, 6), &[10, 12]),
    ((2, 7), &[11, 13]),
    ((2, 8), &[5, 9]),
    ((2, 9), &[5, 8]),
    ((2, 10), &[6, 12]),
    ((2, 11), &[7, 13]),
    ((2, 12), &[6, 10]),
    ((2, 13), &[7, 11]),
    ((3, 4), &[1, 2]),
    ((3, 5), &[10, 13]),
    ((3, 6), &[9, 11]),
    ((3, 7), &[8, 12]),
    ((3, 8), &[7, 12]),
    ((3, 9), &[6, 11]),
    ((3, 10), &[5, 13]),
    ((3, 11), &[6, 9]),
    ((3, 12), &[7, 8]),
    ((3, 13), &[5, 10]),
    ((4, 5), &[11, 12]),
    ((4, 6), &[8, 13]),
    ((4, 7), &[9, 10]),
    ((4, 8), &[6, 13]),
    ((4, 9), &[7, 10]),
    ((4, 10), &[7, 9]),
    ((4, 11), &[5, 12]),
    ((4, 12), &[5, 11]),
    ((4, 13), &[6, 8]),
    ((5, 6), &[1, 7]),
    ((5, 7), &[1, 6]),
    ((5, 8), &[2, 9]),
    ((5, 9), &[2, 8]),
    ((5, 10), &[3, 13]),
    ((5, 11), &[4, 12]),
    ((5, 12), &[4, 11]),
    ((5, 13), &[3, 10]),
    ((6, 7), &[1, 5]),
    ((6, 8), &[4, 13]),
    ((6, 9), &[3, 11]),
    ((6, 10), &[2, 12]),
    ((6, 11), &[3, 9]),
    ((6, 12), &[2, 10]),
    ((6, 13), &[4, 8]),
    ((7, 8), &[3, 12]),
    ((7, 9), &[4, 10]),
    ((7, 10), &[4, 9]),
    ((7, 11), &[2, 13]),
    ((7, 12), &[3, 8]),
    ((7, 13), &[2, 11]),
    ((8, 9), &[2, 5]),
    ((8, 10), &[1, 11]),
    ((8, 11), &[1, 10]),
    ((8, 12), &[3, 7]),
    ((8, 13), &[4, 6]),
    ((9, 10), &[4, 7]),
    ((9, 11), &[3, 6]),
    ((9, 12), &[1, 13]),
    ((9, 13), &[1, 12]),
    ((10, 11), &[1, 8]),
    ((10, 12), &[2, 6]),
    ((10, 13), &[3, 5]),
    ((11, 12), &[4, 5]),
    ((11, 13), &[2, 7]),
    ((12, 13), &[1, 9]),
];

// ============================================================================
// Catalog
// ============================================================================

/// All shipped arrays, smallest first. Designations sort lexicographically
/// for the documented tie-break.
pub const CATALOG: &[OrthogonalArray] = &[
    OrthogonalArray {
        designation: "L4(2^3)",
        columns: L4_COLUMNS,
        matrix: L4_MATRIX,
        interactions: L4_INTERACTIONS,
    },
    OrthogonalArray {
        designation: "L8(2^7)",
        columns: L8_COLUMNS,
        matrix: L8_MATRIX,
        interactions: L8_INTERACTIONS,
    },
    OrthogonalArray {
        designation: "L9(3^4)",
        columns: L9_COLUMNS,
        matrix: L9_MATRIX,
        interactions: L9_INTERACTIONS,
    },
    OrthogonalArray {
        designation: "L12(2^11)",
        columns: L12_COLUMNS,
        matrix: L12_MATRIX,
        interactions: L12_INTERACTIONS,
    },
    OrthogonalArray {
        designation: "L16(2^15)",
        columns: L16_COLUMNS,
        matrix: L16_MATRIX,
        interactions: L16_INTERACTIONS,
    },
    OrthogonalArray {
        designation: "L18(2^1 3^7)",
        columns: L18_COLUMNS,
        matrix: L18_MATRIX,
        interactions: L18_INTERACTIONS,
    },
    OrthogonalArray {
        designation: "L27(3^13)",
        columns: L27_COLUMNS,
        matrix: L27_MATRIX,
        interactions: L27_INTERACTIONS,
    },
];

/// Look up an array by designation (used when loading a checkpoint).
pub fn find_array(designation: &str) -> Result<&'static OrthogonalArray, DesignError> {
    CATALOG
        .iter()
        .find(|a| a.designation == designation)
        .ok_or_else(|| DesignError::UnknownArray {
            designation: designation.to_string(),
        })
}

/// Select the smallest array that can host the given control factors and
/// requested interactions.
///
/// An array qualifies when:
/// - for every level count among the factors, it has at least as many
///   columns of that level count as there are such factors,
/// - its total DOF covers the factor DOFs plus interaction DOFs, and
/// - it tabulates interactions, if any are requested.
///
/// Ties break on fewest runs, then lexicographic designation.
pub fn select_array(
    factors: &[Factor],
    interactions: &[(String, String)],
) -> Result<&'static OrthogonalArray, DesignError> {
    let factor_dof: usize = factors.iter().map(Factor::dof).sum();
    let interaction_dof: usize = interactions
        .iter()
        .filter_map(|(a, b)| {
            let fa = factors.iter().find(|f| &f.name == a)?;
            let fb = factors.iter().find(|f| &f.name == b)?;
            Some(fa.dof() * fb.dof())
        })
        .sum();
    let required = factor_dof + interaction_dof;

    let mut level_demand = std::collections::BTreeMap::new();
    for f in factors {
        *level_demand.entry(f.level_count()).or_insert(0usize) += 1;
    }

    CATALOG
        .iter()
        .filter(|array| {
            if array.total_dof() < required {
                return false;
            }
            if !interactions.is_empty() && !array.has_interaction_table() {
                return false;
            }
            level_demand
                .iter()
                .all(|(&levels, &count)| array.columns_with_levels(levels) >= count)
        })
        .min_by(|a, b| {
            a.runs()
                .cmp(&b.runs())
                .then_with(|| a.designation.cmp(b.designation))
        })
        .ok_or(DesignError::NoSuitableArray {
            factors: factors.len(),
            interactions: interactions.len(),
            dof_required: required,
        })
}
