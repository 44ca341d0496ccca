//! Aggregate projection.
//!
//! An [`Aggregate`] is the top-level owning context: it partitions the full
//! fact bag by entity kind, resolves its own attributes from the facts with
//! an empty kind, and projects each declared relation into a sorted list of
//! [`Entity`] values the first time that relation is read.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, Weak};

use chrono::{DateTime, Utc};
use log::debug;

use crate::entity::{Entity, ResolvedFields};
use crate::error::{FactResult, ValidationError};
use crate::fact::{AggregateId, EntityId, Fact};
use crate::resolve::FactIndex;
use crate::schema::{normalize_kind, AggregateSchema, Relation};
use crate::storage::FactSource;
use crate::value::Value;

/// A projected aggregate and its entities.
///
/// Always handed out behind an [`Arc`] so entities can hold a weak
/// back-reference to it.
#[derive(Debug)]
pub struct Aggregate {
    id: AggregateId,
    schema: Arc<AggregateSchema>,
    attributes: ResolvedFields,
    kinds: HashMap<String, Vec<Fact>>,
    relations: Vec<OnceLock<Vec<Entity>>>,
    this: Weak<Aggregate>,
}

impl Aggregate {
    /// Projects an aggregate from every fact recorded for it.
    ///
    /// Entity-kind tags are matched case-insensitively. Facts whose kind no
    /// relation declares are kept but never projected.
    pub fn build(schema: Arc<AggregateSchema>, id: AggregateId, facts: Vec<Fact>) -> Arc<Self> {
        let mut own = Vec::new();
        let mut kinds: HashMap<String, Vec<Fact>> = HashMap::new();
        for fact in facts {
            let kind = normalize_kind(&fact.entity_kind);
            if kind.is_empty() {
                own.push(fact);
            } else {
                kinds.entry(kind).or_default().push(fact);
            }
        }

        let unprojected = kinds
            .keys()
            .filter(|kind| !schema.relations().iter().any(|r| r.schema.kind() == kind.as_str()))
            .count();
        debug!(
            "event=aggregate_build id={id} own_facts={} kinds={} unprojected_kinds={unprojected}",
            own.len(),
            kinds.len()
        );

        let attributes = ResolvedFields::new(Arc::clone(schema.attributes()), own);
        let relations = schema.relations().iter().map(|_| OnceLock::new()).collect();

        Arc::new_cyclic(|this| Self {
            id,
            schema,
            attributes,
            kinds,
            relations,
            this: this.clone(),
        })
    }

    /// Projects an aggregate from a fact list, taking its id from the first fact.
    ///
    /// Returns `None` for an empty list.
    pub fn build_from_facts(schema: Arc<AggregateSchema>, facts: Vec<Fact>) -> Option<Arc<Self>> {
        let id = facts.first()?.aggregate_id;
        Some(Self::build(schema, id, facts))
    }

    /// Loads the aggregate's current state from a fact source.
    ///
    /// # Errors
    ///
    /// Propagates the source's storage error.
    pub fn find(
        source: &dyn FactSource,
        schema: Arc<AggregateSchema>,
        id: AggregateId,
    ) -> FactResult<Arc<Self>> {
        Self::find_as_of(source, schema, id, Utc::now())
    }

    /// Loads the aggregate as it was known at `as_of`.
    ///
    /// # Errors
    ///
    /// Propagates the source's storage error.
    pub fn find_as_of(
        source: &dyn FactSource,
        schema: Arc<AggregateSchema>,
        id: AggregateId,
        as_of: DateTime<Utc>,
    ) -> FactResult<Arc<Self>> {
        let facts = source.find_before(id, as_of)?;
        Ok(Self::build(schema, id, facts))
    }

    /// Aggregate id.
    #[must_use]
    pub const fn id(&self) -> AggregateId {
        self.id
    }

    /// Schema this projection was built with.
    #[must_use]
    pub fn schema(&self) -> &Arc<AggregateSchema> {
        &self.schema
    }

    /// Resolved value of a declared aggregate attribute; `None` if undeclared.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Resolved members of a declared aggregate-level collection.
    #[must_use]
    pub fn attribute_collection(&self, name: &str) -> Option<Vec<Value>> {
        self.attributes.collection(name)
    }

    /// The aggregate's own facts, grouped by key and most recent first.
    #[must_use]
    pub fn attribute_facts(&self) -> &FactIndex {
        self.attributes.facts()
    }

    /// Entities of a relation, sorted by id. Projected once, then cached.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownRelation` for an undeclared relation.
    pub fn entities(&self, relation: &str) -> FactResult<&[Entity]> {
        let (index, declared) = self
            .schema
            .relation(relation)
            .ok_or_else(|| ValidationError::UnknownRelation {
                name: relation.to_string(),
            })?;
        Ok(self.relations[index].get_or_init(|| self.project(declared)))
    }

    /// Looks up one entity of a relation by id.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownRelation` for an undeclared relation.
    pub fn entity(&self, relation: &str, id: EntityId) -> FactResult<Option<&Entity>> {
        Ok(self.entities(relation)?.iter().find(|e| e.id() == id))
    }

    fn project(&self, relation: &Relation) -> Vec<Entity> {
        let mut by_id: BTreeMap<EntityId, Vec<Fact>> = BTreeMap::new();
        let mut orphans = 0usize;
        for fact in self.kinds.get(relation.schema.kind()).into_iter().flatten() {
            match fact.entity_id {
                Some(id) => by_id.entry(id).or_default().push(fact.clone()),
                None => orphans += 1,
            }
        }

        let candidates = by_id.len();
        let entities: Vec<Entity> = by_id
            .into_iter()
            .filter_map(|(id, facts)| {
                Entity::build(Arc::clone(&relation.schema), id, facts, self.this.clone())
            })
            .collect();

        debug!(
            "event=relation_projected aggregate={} relation={} entities={} retracted={} orphan_facts={orphans}",
            self.id,
            relation.name,
            entities.len(),
            candidates - entities.len()
        );
        entities
    }
}
