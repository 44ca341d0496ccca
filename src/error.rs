//! Error types for factline.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific conditions. Conversion failures, unknown converter tags and
//! tombstoned entities are *not* errors; they resolve locally to absence or
//! defaults and never reach this module.

use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors raised before anything is written or projected.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Relation name not declared on the aggregate schema.
    #[error("Relation '{name}' is not declared on this aggregate")]
    UnknownRelation {
        /// Requested relation name.
        name: String,
    },

    /// Retraction attempted before the aggregate id is known.
    #[error("Aggregate id is unknown; remember at least one fact first")]
    UnknownAggregate,

    /// `id` param that is not an unsigned integer.
    #[error("Invalid entity id '{value}'")]
    InvalidEntityId {
        /// Raw param text.
        value: String,
    },

    /// `happened_at` param that is not a recognized timestamp.
    #[error("Invalid timestamp '{value}'")]
    InvalidTimestamp {
        /// Raw param text.
        value: String,
    },

    /// Field or collection name declared twice on one kind.
    #[error("Field '{name}' is declared more than once on '{kind}'")]
    DuplicateField {
        /// Normalized entity kind.
        kind: String,
        /// Duplicated name.
        name: String,
    },

    /// Relation name declared twice.
    #[error("Relation '{name}' is declared more than once")]
    DuplicateRelation {
        /// Duplicated name.
        name: String,
    },

    /// Schema configuration that does not deserialize.
    #[error("Invalid schema configuration: {reason}")]
    InvalidConfig {
        /// Parser message.
        reason: String,
    },
}

/// Top-level error type for factline.
#[derive(Debug, Error)]
pub enum FactError {
    /// Rejected input or an undeclared name.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The fact store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl FactError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for factline operations.
pub type FactResult<T> = Result<T, FactError>;
