//! Entity projection.
//!
//! An [`Entity`] is one sub-object of an aggregate, identified by kind and
//! id, whose declared fields are resolved from its own facts. Entities are
//! immutable snapshots; a new fact means a new projection.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

use log::debug;

use crate::aggregate::Aggregate;
use crate::fact::{EntityId, Fact};
use crate::resolve::{resolve, resolve_all, FactIndex};
use crate::schema::EntitySchema;
use crate::value::Value;

/// Declared fields of one projected object, resolved on demand.
///
/// Single-valued fields are memoized in write-once cells, so a value is
/// computed at most once per instance even when shared across threads.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedFields {
    schema: Arc<EntitySchema>,
    facts: FactIndex,
    values: Vec<OnceLock<Value>>,
}

impl ResolvedFields {
    pub(crate) fn new(schema: Arc<EntitySchema>, facts: impl IntoIterator<Item = Fact>) -> Self {
        let values = schema.fields().iter().map(|_| OnceLock::new()).collect();
        Self {
            facts: FactIndex::from_facts(facts),
            schema,
            values,
        }
    }

    pub(crate) fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    pub(crate) fn facts(&self) -> &FactIndex {
        &self.facts
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        let (index, field) = self.schema.field(name)?;
        Some(self.values[index].get_or_init(|| {
            resolve(
                self.facts.facts(&field.name),
                &field.default,
                &field.converter,
                field.sentinel.as_deref(),
            )
        }))
    }

    pub(crate) fn collection(&self, name: &str) -> Option<Vec<Value>> {
        let collection = self.schema.collection(name)?;
        Some(resolve_all(
            self.facts.facts(&collection.name),
            &collection.converter,
            collection.ignored.as_deref(),
        ))
    }

    /// Writes `key=value` pairs for every non-blank declared field.
    fn write_fields(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in self.schema.field_keys() {
            if let Some(value) = self.get(name).filter(|v| !v.is_blank()) {
                write!(f, ", {name}={value}")?;
            }
        }
        Ok(())
    }
}

/// A projected entity.
///
/// Equality and hashing use the id only.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Weak};
/// use factline::{Converter, Entity, EntityId, EntitySchema, Fact, Value};
///
/// let schema = Arc::new(
///     EntitySchema::builder("vehicle")
///         .fact("make", Converter::String)
///         .build()
///         .unwrap(),
/// );
/// let facts = vec![Fact::builder(1, 1).kind("vehicle").entity(4).key("make").value("Honda").build()];
///
/// let vehicle = Entity::build(schema, EntityId::new(4), facts, Weak::new()).unwrap();
/// assert_eq!(vehicle.get("make"), Some(&Value::from("Honda")));
/// ```
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    fields: ResolvedFields,
    aggregate: Weak<Aggregate>,
}

impl Entity {
    /// Projects an entity from its facts.
    ///
    /// Returns `None` if any fact is a whole-entity retraction, whatever its
    /// timestamp.
    pub fn build(
        schema: Arc<EntitySchema>,
        id: EntityId,
        facts: Vec<Fact>,
        aggregate: Weak<Aggregate>,
    ) -> Option<Self> {
        if facts.iter().any(Fact::retracts_entity) {
            debug!("event=entity_retracted kind={} id={id}", schema.kind());
            return None;
        }

        Some(Self {
            id,
            fields: ResolvedFields::new(schema, facts),
            aggregate,
        })
    }

    /// Projects a detached entity, taking its id from the first fact.
    ///
    /// Returns `None` for an empty list, a first fact without an entity id,
    /// or a retracted entity.
    pub fn build_from_facts(schema: Arc<EntitySchema>, facts: Vec<Fact>) -> Option<Self> {
        let id = facts.first()?.entity_id?;
        Self::build(schema, id, facts, Weak::new())
    }

    /// Entity id.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Normalised entity kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.fields.schema().kind()
    }

    /// Schema this entity was projected with.
    #[must_use]
    pub fn schema(&self) -> &Arc<EntitySchema> {
        self.fields.schema()
    }

    /// The entity's facts, grouped by key and most recent first.
    #[must_use]
    pub fn facts(&self) -> &FactIndex {
        self.fields.facts()
    }

    /// Resolved value of a declared single-valued field; `None` if undeclared.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Resolved members of a declared collection; `None` if undeclared.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<Vec<Value>> {
        self.fields.collection(name)
    }

    /// The owning aggregate, if it is still alive.
    #[must_use]
    pub fn aggregate(&self) -> Option<Arc<Aggregate>> {
        self.aggregate.upgrade()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}: id={}", self.kind(), self.id)?;
        self.fields.write_fields(f)?;
        write!(f, ">")
    }
}
