//! Error taxonomy shared by every dispatch component.

use thiserror::Error;

/// Errors returned by registry, queue, ledger and ticket operations.
///
/// Everything except [`DispatchError::Storage`] is a recoverable, caller-facing
/// error. Storage errors mean the record store is unavailable or broken and
/// are propagated unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable snake_case name, used for metrics labels and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Conflict(_) => "conflict",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Storage(_) => "storage",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Map any store-level failure into [`DispatchError::Storage`].
pub(crate) fn storage(e: impl std::fmt::Display) -> DispatchError {
    DispatchError::Storage(e.to_string())
}
