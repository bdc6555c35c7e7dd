use std::fmt::Debug;

use sea_orm::{DbBackend, DbErr};
use thiserror::Error;

/// Errors returned by the closure-table APIs.
#[derive(Debug, Error)]
pub enum ClosureTreeError {
    #[error("closure-table supports PostgreSQL and SQLite connections only (got {0:?})")]
    UnsupportedBackend(DbBackend),

    /// A parent reference points at a node that does not exist.
    #[error("referenced node {0} does not exist")]
    MissingReference(String),

    /// The node has no persisted identity yet.
    #[error("invalid node state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(#[from] DbErr),

    #[error("operation restricted: {0}")]
    Restricted(String),

    #[error("closure-table invariant violation: {0}")]
    Invariant(String),
}

impl ClosureTreeError {
    pub fn missing_reference(id: &impl Debug) -> Self {
        Self::MissingReference(format!("{id:?}"))
    }

    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::InvalidState(detail.into())
    }

    pub fn restricted(detail: impl Into<String>) -> Self {
        Self::Restricted(detail.into())
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant(detail.into())
    }
}

/// Lets hosts run the lifecycle hooks from `ActiveModelBehavior` callbacks,
/// which must return `DbErr`.
impl From<ClosureTreeError> for DbErr {
    fn from(err: ClosureTreeError) -> Self {
        match err {
            ClosureTreeError::Storage(inner) => inner,
            other => DbErr::Custom(other.to_string()),
        }
    }
}
