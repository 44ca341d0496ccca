//! Abstract storage traits for facts.
//!
//! A store is append-only: facts are never updated or deleted, and every
//! append is issued a strictly increasing id.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::fact::{AggregateId, Fact, FactDraft};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend error.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Read side: every fact of one aggregate visible at a point in time.
pub trait FactSource: Send + Sync {
    /// All facts for `aggregate_id` with `happened_at <= as_of`, in any order.
    fn find_before(
        &self,
        aggregate_id: AggregateId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Fact>, StorageError>;
}

/// Write side: append-only fact log.
///
/// Implementations must issue ids and append atomically with respect to
/// each other; concurrent writers are otherwise uncoordinated.
pub trait FactStore: FactSource {
    /// Issues the next id, commits the draft under it and returns the fact.
    ///
    /// Self-assigned ids in the draft resolve to the issued id.
    fn append(&self, draft: FactDraft) -> Result<Fact, StorageError>;

    /// Number of facts appended so far.
    fn count(&self) -> Result<usize, StorageError>;
}
