use std::fmt;

use thiserror::Error;

/// Per-snapshot and whole-invocation failures surfaced by the core.
///
/// Cell-level problems never show up here: bad numbers become `None` and
/// rows without a level or element are dropped during normalization.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("snapshot '{snapshot}' is unavailable: {reason}")]
    SnapshotUnavailable { snapshot: String, reason: String },
    #[error("snapshot '{snapshot}' is missing columns {missing:?} (expected {expected:?}, found {found:?})")]
    StructuralMismatch {
        snapshot: String,
        expected: Vec<String>,
        found: Vec<String>,
        missing: Vec<String>,
    },
    #[error("insufficient data: {0}")]
    EmptyResult(Insufficiency),
}

impl CoreError {
    pub fn unavailable(snapshot: impl Into<String>, reason: impl fmt::Display) -> Self {
        CoreError::SnapshotUnavailable {
            snapshot: snapshot.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the expected "not enough data" outcome, as opposed to a
    /// snapshot that had to be skipped.
    pub fn is_empty_result(&self) -> bool {
        matches!(self, CoreError::EmptyResult(_))
    }
}

/// Why a view could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insufficiency {
    /// The catalog had no usable snapshot, or every fetch failed.
    NoSnapshots,
    /// Snapshots loaded, but no record survived normalization and filtering.
    NoRecords,
    /// A comparison needs more distinct snapshot dates than are available.
    TooFewSnapshots { required: usize, available: usize },
}

impl fmt::Display for Insufficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insufficiency::NoSnapshots => write!(f, "no usable snapshots were found"),
            Insufficiency::NoRecords => write!(f, "no records matched the requested view"),
            Insufficiency::TooFewSnapshots {
                required,
                available,
            } => write!(
                f,
                "comparison needs {} snapshots, only {} available",
                required, available
            ),
        }
    }
}
