//! Caller-facing error classification shared by every module.

use serde::{Deserialize, Serialize};

/// Broad category of a failure, used by callers to decide how to react.
///
/// Every module error exposes `kind()` so an outer layer (HTTP, CLI, tests)
/// can map failures without matching on module-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or out-of-range input. Nothing was mutated.
    Validation,
    /// Referenced entity does not exist.
    NotFound,
    /// Recoverable conflict with current state (full room, out of turn, ...).
    Conflict,
    /// Broken invariant or idempotency mismatch. Logged, never retried blindly.
    Integrity,
    /// External dependency unavailable after bounded retries.
    Transient,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::Integrity => write!(f, "integrity"),
            ErrorKind::Transient => write!(f, "transient"),
        }
    }
}
