//! The repository error taxonomy.
//!
//! Every failure in the store and the query evaluator is one of five kinds.
//! All failures are logical violations of invariants, never transient
//! conditions, so there is no retry logic anywhere in the core: each error
//! is surfaced to the immediate caller as-is.

use thiserror::Error;

/// Errors produced by repository and query operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// An id, path, type, or version did not resolve to anything.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with current object state (already checked
    /// out, non-empty folder on delete, stale change token).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A caller-supplied value is unusable (type-mismatched comparison,
    /// LIKE on a non-string property, comparison against a multi-valued
    /// property).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The construct is recognized but deliberately not implemented
    /// (CONTAINS, SCORE, IN / NOT IN, ANY-quantified operators).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The operation would break a repository invariant (duplicate sibling
    /// name, cyclic filing).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Convenience alias for repository results.
pub type RepoResult<T> = Result<T, RepositoryError>;
