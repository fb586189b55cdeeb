//! Invocation assembly: fixed arguments plus factor bindings.
//!
//! Argument order is deterministic: fixed CLI args first (config order),
//! then control factor pairs, then noise factor pairs. When a noise factor
//! binds the same flag or environment variable as a control factor, the
//! noise value replaces the control value and a warning is emitted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::FixedArg;
use crate::error::EngineWarning;
use crate::factors::{Factor, Level};

/// A fully assembled target invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Build the invocation for one repetition.
pub fn assemble(
    program: &Path,
    fixed_args: &[FixedArg],
    fixed_env: &BTreeMap<String, String>,
    control: &[(&Factor, &Level)],
    noise: &[(&Factor, &Level)],
) -> (Invocation, Vec<EngineWarning>) {
    let mut warnings = Vec::new();

    // CLI: fixed args first, then (flag, value) pairs per bound factor.
    // Pairs are tracked by flag so a noise collision replaces in place.
    let mut args: Vec<String> = Vec::new();
    for fixed in fixed_args {
        args.push(fixed.flag.clone());
        if let Some(value) = &fixed.value {
            args.push(value.clone());
        }
    }

    let mut factor_pairs: Vec<(String, String)> = Vec::new();
    for (factor, level) in control {
        if let Some(flag) = factor.bindings().cli {
            factor_pairs.push((flag.to_string(), level.value.clone()));
        }
    }
    for (factor, level) in noise {
        if let Some(flag) = factor.bindings().cli {
            if let Some(existing) = factor_pairs.iter_mut().find(|(f, _)| f.as_str() == flag) {
                warnings.push(EngineWarning::NoiseOverridesControl {
                    factor: factor.name.clone(),
                    binding: flag.to_string(),
                });
                existing.1 = level.value.clone();
            } else {
                factor_pairs.push((flag.to_string(), level.value.clone()));
            }
        }
    }
    for (flag, value) in factor_pairs {
        args.push(flag);
        args.push(value);
    }

    // Environment: fixed first, control overrides fixed, noise overrides
    // control (with a warning).
    let mut env = fixed_env.clone();
    let mut control_env = std::collections::BTreeSet::new();
    for (factor, level) in control {
        if let Some(name) = factor.bindings().env {
            env.insert(name.to_string(), level.value.clone());
            control_env.insert(name.to_string());
        }
    }
    for (factor, level) in noise {
        if let Some(name) = factor.bindings().env {
            if control_env.contains(name) {
                warnings.push(EngineWarning::NoiseOverridesControl {
                    factor: factor.name.clone(),
                    binding: name.to_string(),
                });
            }
            env.insert(name.to_string(), level.value.clone());
        }
    }

    (
        Invocation {
            program: program.to_path_buf(),
            args,
            env,
        },
        warnings,
    )
}
