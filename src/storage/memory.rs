//! In-memory storage backend.
//!
//! Thread-safe reference implementation of the storage traits, intended for
//! embedded usage and tests. Ids follow the `count + 1` convention.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::fact::{AggregateId, Fact, FactDraft, FactId};
use crate::storage::traits::{FactSource, FactStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct FactLog {
    facts: Vec<Fact>,
    by_aggregate: HashMap<AggregateId, Vec<usize>>,
}

/// Thread-safe in-memory fact store.
///
/// Id issue and append happen under one write lock, so concurrent writers
/// are serialized.
#[derive(Debug, Default)]
pub struct InMemoryFactStore {
    state: RwLock<FactLog>,
}

impl InMemoryFactStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every fact, in append order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Backend` if the lock is poisoned.
    pub fn all(&self) -> Result<Vec<Fact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.all"))?;
        Ok(state.facts.clone())
    }
}

impl FactSource for InMemoryFactStore {
    fn find_before(
        &self,
        aggregate_id: AggregateId,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Fact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.find_before"))?;
        let Some(positions) = state.by_aggregate.get(&aggregate_id) else {
            return Ok(Vec::new());
        };
        Ok(positions
            .iter()
            .map(|&i| &state.facts[i])
            .filter(|fact| fact.happened_at <= as_of)
            .cloned()
            .collect())
    }
}

impl FactStore for InMemoryFactStore {
    fn append(&self, draft: FactDraft) -> Result<Fact, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("fact.append"))?;
        let id = FactId::new(state.facts.len() as u64 + 1);
        let fact = draft.commit(id);

        let position = state.facts.len();
        state
            .by_aggregate
            .entry(fact.aggregate_id)
            .or_default()
            .push(position);
        state.facts.push(fact.clone());
        Ok(fact)
    }

    fn count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.count"))?;
        Ok(state.facts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::fact::{EntityId, IdAssignment};

    fn draft(aggregate: IdAssignment<AggregateId>, at: DateTime<Utc>) -> FactDraft {
        FactDraft {
            aggregate_id: aggregate,
            entity_kind: "vehicle".to_string(),
            entity_id: IdAssignment::SelfAssigned,
            key: "model".to_string(),
            value: "Civic".to_string(),
            happened_at: at,
            is_retraction: false,
            delta: true,
        }
    }

    #[test]
    fn test_append_issues_sequential_ids() {
        let store = InMemoryFactStore::new();
        let known = IdAssignment::Known(AggregateId::new(1));

        let first = store.append(draft(known, Utc::now())).unwrap();
        let second = store.append(draft(known, Utc::now())).unwrap();

        assert_eq!(first.id, FactId::new(1));
        assert_eq!(second.id, FactId::new(2));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_append_resolves_self_assigned_ids() {
        let store = InMemoryFactStore::new();
        store
            .append(draft(IdAssignment::Known(AggregateId::new(1)), Utc::now()))
            .unwrap();

        let fact = store.append(draft(IdAssignment::SelfAssigned, Utc::now())).unwrap();

        assert_eq!(fact.aggregate_id, AggregateId::new(2));
        assert_eq!(fact.entity_id, Some(EntityId::new(2)));
    }

    #[test]
    fn test_find_before_filters_aggregate_and_time() {
        let store = InMemoryFactStore::new();
        let now = Utc::now();
        let mine = IdAssignment::Known(AggregateId::new(1));
        let theirs = IdAssignment::Known(AggregateId::new(2));

        store.append(draft(mine, now - Duration::days(2))).unwrap();
        store.append(draft(theirs, now - Duration::days(2))).unwrap();
        store.append(draft(mine, now + Duration::days(2))).unwrap();

        let facts = store.find_before(AggregateId::new(1), now).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].id, FactId::new(1));

        let later = store
            .find_before(AggregateId::new(1), now + Duration::days(3))
            .unwrap();
        assert_eq!(later.len(), 2);

        assert!(store.find_before(AggregateId::new(9), now).unwrap().is_empty());
    }

    #[test]
    fn test_as_of_is_inclusive() {
        let store = InMemoryFactStore::new();
        let at = Utc::now();
        store
            .append(draft(IdAssignment::Known(AggregateId::new(1)), at))
            .unwrap();

        assert_eq!(store.find_before(AggregateId::new(1), at).unwrap().len(), 1);
    }
}
