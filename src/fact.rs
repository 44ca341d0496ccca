//! Facts, the atomic unit of recorded knowledge.
//!
//! A fact asserts "entity E of kind K had attribute `key` = `value` as of
//! `happened_at`", or, when `is_retraction` is set, withdraws such an
//! assertion. Facts are immutable once the store hands them back.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned fact identifier. Strictly increasing per store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(u64);

impl FactId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the owning aggregate. Bootstrapped from the first fact id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(u64);

impl AggregateId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<FactId> for AggregateId {
    fn from(id: FactId) -> Self {
        Self(id.0)
    }
}

/// Identity of an entity within its kind. Bootstrapped from a fact id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<FactId> for EntityId {
    fn from(id: FactId) -> Self {
        Self(id.0)
    }
}

impl std::str::FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// What a retraction fact withdraws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetractionScope {
    /// Empty key: the entity vanishes from every projection, regardless of time.
    Entity,
    /// Key with an empty value: hides this fact and every older fact for the key.
    Key,
    /// Key and value: withdraws that one value.
    Value,
}

/// An immutable, committed fact.
///
/// This is the persisted shape; storage bindings may serialize it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Store-issued id.
    pub id: FactId,
    /// Owning aggregate.
    pub aggregate_id: AggregateId,

    /// Entity kind tag. Empty means the aggregate itself.
    pub entity_kind: String,

    /// Owning entity; `None` for aggregate attributes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,

    /// Attribute name. Empty on whole-entity retractions.
    pub key: String,

    /// Raw textual value. `None` models a null raw value.
    pub value: Option<String>,

    /// When the fact became true in the domain.
    pub happened_at: DateTime<Utc>,

    /// Withdraws earlier facts instead of asserting a value.
    #[serde(default)]
    pub is_retraction: bool,

    /// Incremental change rather than a full snapshot.
    #[serde(default)]
    pub delta: bool,
}

impl Fact {
    /// Starts building a fact from outside the write path (fact sources, fixtures).
    pub fn builder(id: u64, aggregate_id: u64) -> FactBuilder {
        FactBuilder::new(FactId::new(id), AggregateId::new(aggregate_id))
    }

    /// Raw value as a string slice, if present.
    #[must_use]
    pub fn raw(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Classifies a retraction by what it withdraws. `None` for assertions.
    #[must_use]
    pub fn retraction_scope(&self) -> Option<RetractionScope> {
        if !self.is_retraction {
            return None;
        }
        if self.key.is_empty() {
            return Some(RetractionScope::Entity);
        }
        match self.raw() {
            None | Some("") => Some(RetractionScope::Key),
            Some(_) => Some(RetractionScope::Value),
        }
    }

    /// Whole-entity tombstone.
    #[must_use]
    pub fn retracts_entity(&self) -> bool {
        self.retraction_scope() == Some(RetractionScope::Entity)
    }

    /// Key-level horizon.
    #[must_use]
    pub fn retracts_key(&self) -> bool {
        self.retraction_scope() == Some(RetractionScope::Key)
    }
}

/// Fluent constructor for [`Fact`].
#[derive(Debug, Clone)]
pub struct FactBuilder {
    fact: Fact,
}

impl FactBuilder {
    fn new(id: FactId, aggregate_id: AggregateId) -> Self {
        Self {
            fact: Fact {
                id,
                aggregate_id,
                entity_kind: String::new(),
                entity_id: None,
                key: String::new(),
                value: Some(String::new()),
                happened_at: Utc::now(),
                is_retraction: false,
                delta: true,
            },
        }
    }

    /// Entity kind tag.
    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.fact.entity_kind = kind.into();
        self
    }

    /// Owning entity id.
    #[must_use]
    pub fn entity(mut self, id: u64) -> Self {
        self.fact.entity_id = Some(EntityId::new(id));
        self
    }

    /// Attribute name.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.fact.key = key.into();
        self
    }

    /// Raw textual value.
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.fact.value = Some(value.into());
        self
    }

    /// Marks the raw value as null.
    #[must_use]
    pub fn null_value(mut self) -> Self {
        self.fact.value = None;
        self
    }

    /// Domain timestamp; defaults to now.
    #[must_use]
    pub fn happened_at(mut self, at: DateTime<Utc>) -> Self {
        self.fact.happened_at = at;
        self
    }

    /// Marks the fact as a retraction.
    #[must_use]
    pub fn retraction(mut self) -> Self {
        self.fact.is_retraction = true;
        self
    }

    /// Assembles the fact.
    #[must_use]
    pub fn build(self) -> Fact {
        self.fact
    }
}

/// How a draft's aggregate or entity id is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdAssignment<T> {
    /// Use this id.
    Known(T),
    /// Use the id the store issues to this very fact.
    SelfAssigned,
}

impl<T: From<FactId>> IdAssignment<T> {
    /// Resolves the assignment against the id issued to the fact.
    pub fn resolve(self, issued: FactId) -> T {
        match self {
            Self::Known(id) => id,
            Self::SelfAssigned => T::from(issued),
        }
    }
}

impl<T> From<Option<T>> for IdAssignment<T> {
    fn from(id: Option<T>) -> Self {
        id.map_or(Self::SelfAssigned, Self::Known)
    }
}

/// A fact that has not been committed yet.
///
/// The store turns a draft into a [`Fact`] in one step, after issuing its id,
/// so self-referential ids never require mutating a committed fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactDraft {
    /// Aggregate id, or bootstrap from the issued fact id.
    pub aggregate_id: IdAssignment<AggregateId>,
    /// Entity kind tag.
    pub entity_kind: String,
    /// Entity id, or bootstrap from the issued fact id.
    pub entity_id: IdAssignment<EntityId>,
    /// Attribute name.
    pub key: String,
    /// Raw textual value.
    pub value: String,
    /// Domain timestamp.
    pub happened_at: DateTime<Utc>,
    /// Withdraws earlier facts.
    pub is_retraction: bool,
    /// Incremental change rather than a full snapshot.
    pub delta: bool,
}

impl FactDraft {
    /// Finalizes the draft with the id issued by the store.
    #[must_use]
    pub fn commit(self, id: FactId) -> Fact {
        Fact {
            id,
            aggregate_id: self.aggregate_id.resolve(id),
            entity_kind: self.entity_kind,
            entity_id: Some(self.entity_id.resolve(id)),
            key: self.key,
            value: Some(self.value),
            happened_at: self.happened_at,
            is_retraction: self.is_retraction,
            delta: self.delta,
        }
    }
}
