use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{EntityId, EntityKind};

/// Payload for validation failures, kept serializable so callers can
/// surface the offending field to their own clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{kind} '{id}' not found")]
    EntityNotFound { kind: EntityKind, id: EntityId },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed on '{}': {}", .0.field, .0.message)]
    Validation(ValidationError),

    #[error("Transaction failure: {0}")]
    TransactionFailure(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Journal error: {0}")]
    Journal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn not_found(kind: EntityKind, id: EntityId) -> Self {
        Self::EntityNotFound { kind, id }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError {
            field: field.into(),
            message: message.into(),
        })
    }

    /// True for errors a caller may resolve by re-reading and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
