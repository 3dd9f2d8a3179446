//! Drift detection between desired and observed specs
//!
//! Compares six fields in a fixed order and stops at the first mismatch.
//! Later fields are never read once an earlier one differs.

use crate::document;
use crate::error::{ProviderError, ProviderResult};
use k8s_openapi::api::core::v1::EnvVar;
use serde_json::Value;
use std::fmt;

/// Field that differs between desired and observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftField {
    Size,
    Version,
    Storage,
    Cpu,
    Memory,
    Env,
}

impl fmt::Display for DriftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftField::Size => write!(f, "size"),
            DriftField::Version => write!(f, "version"),
            DriftField::Storage => write!(f, "storage"),
            DriftField::Cpu => write!(f, "cpu"),
            DriftField::Memory => write!(f, "memory"),
            DriftField::Env => write!(f, "env"),
        }
    }
}

/// Outcome of one comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    InSync,
    Drifted(DriftField),
}

impl Drift {
    pub fn is_in_sync(&self) -> bool {
        matches!(self, Drift::InSync)
    }
}

const SIZE: &[&str] = &["size"];
const VERSION: &[&str] = &["version"];
const STORAGE: &[&str] = &[
    "template",
    "persistentVolumeClaimSpec",
    "resources",
    "requests",
    "storage",
];
const CPU: &[&str] = &["template", "resources", "requests", "cpu"];
const MEMORY: &[&str] = &["template", "resources", "requests", "memory"];
const ENV: &[&str] = &["template", "env"];

fn strip_version(version: &str) -> &str {
    version.trim_start_matches('v')
}

fn strip_quantity(quantity: &str) -> &str {
    quantity.trim_end_matches(&['G', 'i'][..])
}

fn exact(value: &str) -> &str {
    value
}

fn env_list(spec: &Value) -> ProviderResult<Vec<EnvVar>> {
    match document::nested_slice(spec, ENV)? {
        None => Ok(Vec::new()),
        Some(items) => serde_json::from_value(Value::Array(items.clone()))
            .map_err(|_| ProviderError::malformed(ENV, "a list of environment variables")),
    }
}

fn str_differs(
    desired: &Value,
    observed: &Value,
    path: &[&str],
    normalize: fn(&str) -> &str,
) -> ProviderResult<bool> {
    let desired = document::nested_str(desired, path)?;
    let observed = document::nested_str(observed, path)?;
    Ok(match (desired, observed) {
        (Some(d), Some(o)) => normalize(d) != normalize(o),
        (None, None) => false,
        _ => true,
    })
}

/// Compare the operator-relevant fields of two `spec` subtrees
pub fn detect_drift(desired: &Value, observed: &Value) -> ProviderResult<Drift> {
    let drift = detect(desired, observed)?;
    if let Drift::Drifted(field) = drift {
        tracing::info!(field = %field, "Spec drift detected");
    }
    Ok(drift)
}

fn detect(desired: &Value, observed: &Value) -> ProviderResult<Drift> {
    if document::nested_i64(desired, SIZE)? != document::nested_i64(observed, SIZE)? {
        return Ok(Drift::Drifted(DriftField::Size));
    }
    if str_differs(desired, observed, VERSION, strip_version)? {
        return Ok(Drift::Drifted(DriftField::Version));
    }
    if str_differs(desired, observed, STORAGE, strip_quantity)? {
        return Ok(Drift::Drifted(DriftField::Storage));
    }
    if str_differs(desired, observed, CPU, exact)? {
        return Ok(Drift::Drifted(DriftField::Cpu));
    }
    if str_differs(desired, observed, MEMORY, strip_quantity)? {
        return Ok(Drift::Drifted(DriftField::Memory));
    }
    if env_list(desired)? != env_list(observed)? {
        return Ok(Drift::Drifted(DriftField::Env));
    }
    Ok(Drift::InSync)
}
