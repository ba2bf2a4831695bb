// src/error.rs

use thiserror::Error;

/// Errors raised at the boundary of the decomposition and fit engines.
///
/// Shape and configuration problems are reported before any computation
/// starts. A factorization that stops at its iteration cap is not an error;
/// it is logged and flagged on the returned [`crate::nmf::NmfReport`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArchetypeError {
    /// Dimension mismatches, negative factorization input, non-positive rank,
    /// missing or non-finite values.
    #[error("Input shape error: {0}")]
    InputShape(String),

    /// Invalid harness parameters (fold count, iteration count, subsample size, split fraction).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The estimator could not fit, predict or score, or reported inconsistent importances.
    #[error("Estimator error: {0}")]
    Estimator(String),

    /// Failure inside the dense linear-algebra backend.
    #[error("Linear algebra backend failed: {0}")]
    Linalg(String),
}

pub type Result<T> = std::result::Result<T, ArchetypeError>;
