//! Error taxonomy shared by every FrankenFrame crate.
//!
//! Fatal conditions are variants of [`FrameError`]. Arity, key-type and
//! configuration errors are raised while a join is being validated, before
//! any hash table is built, so a failing join never yields partial output.
//! [`FrameError::DistributedCollectiveFailure`] is raised by the exchange
//! layer and is not recoverable locally.
//!
//! Non-fatal conditions are reported as [`FrameWarning`] values and logged
//! by the component that detects them.

use std::fmt;

/// Primary error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Struct-array composition with mismatched field lengths or names.
    #[error("arity error: {detail}")]
    Arity { detail: String },

    /// Two join key columns whose types cannot be reconciled.
    #[error("join key types {left} and {right} do not match (key {key})")]
    KeyTypeMismatch {
        key: String,
        left: String,
        right: String,
    },

    /// Invalid join configuration, e.g. a condition naming an undeclared column.
    #[error("configuration error: {reason} (in `{fragment}`)")]
    Configuration { fragment: String, reason: String },

    /// A collective (all-gather / all-to-all) did not complete on every worker.
    #[error("distributed collective `{op}` failed on rank {rank}: {detail}")]
    DistributedCollectiveFailure {
        op: &'static str,
        rank: usize,
        detail: String,
    },

    /// Row or column index outside the addressed array.
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },

    /// Invariant violation inside the engine.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FrameError {
    pub fn arity(detail: impl Into<String>) -> Self {
        Self::Arity {
            detail: detail.into(),
        }
    }

    pub fn configuration(fragment: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            fragment: fragment.into(),
            reason: reason.into(),
        }
    }

    pub fn key_type_mismatch(
        key: impl Into<String>,
        left: impl fmt::Display,
        right: impl fmt::Display,
    ) -> Self {
        Self::KeyTypeMismatch {
            key: key.into(),
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn collective(op: &'static str, rank: usize, detail: impl Into<String>) -> Self {
        Self::DistributedCollectiveFailure {
            op,
            rank,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    /// Whether the error is detected during validation (before BUILD).
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Arity { .. } | Self::KeyTypeMismatch { .. } | Self::Configuration { .. }
        )
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FrameError>;

/// Non-fatal diagnostics returned alongside successful results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameWarning {
    /// A column with no representative element was materialized as text.
    NullAmbiguity { column: String, chosen: String },
}

impl fmt::Display for FrameWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullAmbiguity { column, chosen } => write!(
                f,
                "column {column} has no representative element; defaulting to {chosen}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_type_mismatch_names_both_types() {
        let err = FrameError::key_type_mismatch("k", "int64", "utf8");
        let msg = err.to_string();
        assert!(msg.contains("int64") && msg.contains("utf8"), "{msg}");
        assert!(err.is_validation_error());
    }

    #[test]
    fn collective_failure_is_not_a_validation_error() {
        let err = FrameError::collective("all_to_all", 3, "peer left");
        assert!(!err.is_validation_error());
        assert!(err.to_string().contains("rank 3"));
    }

    #[test]
    fn configuration_error_carries_fragment() {
        let err = FrameError::configuration("(left.zz > 1)", "undeclared column `zz`");
        assert!(err.to_string().contains("(left.zz > 1)"));
    }
}
