//! Error types for the NMPC solver.

use thiserror::Error;

/// Errors that can occur while building or running the solver.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Construction/call-boundary validation failed (non-positive horizon,
    /// mismatched vector dimensions, zero worker count, ...). Detected
    /// eagerly and never silently clamped.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A contact-sequence query referenced a phase or event that does not
    /// exist on the current horizon.
    #[error("contact sequence error: {0}")]
    ContactSequence(String),

    /// Internal solver error (a bug, not a user error).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;
