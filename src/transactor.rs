//! The write path: turning caller field maps into committed facts.
//!
//! A [`Transactor`] writes facts for one entity kind. It translates caller
//! key names, bootstraps aggregate and entity ids from the first committed
//! fact when they are not known yet, and notifies the search sink when a
//! searchable field is touched.
//!
//! Writes are not atomic: if the store fails halfway through a call, facts
//! appended before the failure stay committed.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::convert::parse_timestamp;
use crate::error::{FactResult, ValidationError};
use crate::fact::{AggregateId, EntityId, Fact, FactDraft, IdAssignment};
use crate::search::SearchSync;
use crate::storage::FactStore;

/// Reserved key carrying an explicit entity id.
pub const ID_KEY: &str = "id";

/// Reserved key carrying an explicit timestamp.
pub const HAPPENED_AT_KEY: &str = "happened_at";

/// A value to remember: one raw value, or a whole collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A single raw value.
    One(String),
    /// Replaces the collection: prior members are cleared first.
    Many(Vec<String>),
}

impl FieldValue {
    fn describe(&self) -> String {
        match self {
            Self::One(v) => v.clone(),
            Self::Many(vs) => vs.join(","),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::One(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::One(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::One(v.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::One(v.to_string())
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        Self::One(v.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::One(v.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::One(v.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::One(v.to_rfc3339())
    }
}

impl From<EntityId> for FieldValue {
    fn from(v: EntityId) -> Self {
        Self::One(v.to_string())
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            match value.into() {
                Self::One(v) => out.push(v),
                Self::Many(vs) => out.extend(vs),
            }
        }
        Self::Many(out)
    }
}

/// Ordered key → value map handed to [`Transactor::remember`].
///
/// Facts are emitted in insertion order. Setting an existing key replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, FieldValue)>,
}

impl Params {
    /// Empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Params::insert`].
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets `key`, replacing any earlier value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Takes `key` out.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    /// Value set for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no keys are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Params {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

type KeyPredicate = dyn Fn(&str) -> bool + Send + Sync;

/// Static write configuration for one entity kind.
///
/// # Examples
///
/// ```
/// use factline::TransactorConfig;
///
/// let config = TransactorConfig::new("Vehicle")
///     .translate("vin_number", "vin")
///     .searchable(["owner_name"]);
/// assert_eq!(config.entity_kind(), "Vehicle");
/// ```
#[derive(Clone)]
pub struct TransactorConfig {
    entity_kind: String,
    translations: HashMap<String, String>,
    searchable: HashSet<String>,
    acceptable: Arc<KeyPredicate>,
}

impl TransactorConfig {
    /// Configuration writing facts of `entity_kind`. Empty means the aggregate
    /// itself.
    pub fn new(entity_kind: impl Into<String>) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            translations: HashMap::new(),
            searchable: HashSet::new(),
            acceptable: Arc::new(|_| true),
        }
    }

    /// Renames caller key `from` to stored key `to`.
    #[must_use]
    pub fn translate(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.translations.insert(from.into(), to.into());
        self
    }

    /// Adds keys whose change triggers a search notification.
    #[must_use]
    pub fn searchable<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.searchable.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Filters translated keys; rejected keys are silently dropped.
    #[must_use]
    pub fn accept(mut self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.acceptable = Arc::new(predicate);
        self
    }

    /// Entity kind every written fact carries.
    #[must_use]
    pub fn entity_kind(&self) -> &str {
        &self.entity_kind
    }

    fn translate_key(&self, key: &str) -> String {
        match self.translations.get(key) {
            Some(translated) => translated.clone(),
            None => key.replace('?', ""),
        }
    }

    fn touches_searchable<'a>(&self, mut keys: impl Iterator<Item = &'a str>) -> bool {
        keys.any(|k| self.searchable.contains(k))
    }
}

impl fmt::Debug for TransactorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactorConfig")
            .field("entity_kind", &self.entity_kind)
            .field("translations", &self.translations)
            .field("searchable", &self.searchable)
            .finish_non_exhaustive()
    }
}

/// Writes facts for entities of one kind within one aggregate.
///
/// A fresh transactor knows neither its aggregate nor its entity. The
/// aggregate is adopted from the first fact it commits and kept. The entity
/// is chosen per [`Transactor::remember`] call: the `id` param, else the
/// [`Transactor::for_entity`] target, else a new entity bootstrapped from
/// the call's first fact.
pub struct Transactor {
    config: Arc<TransactorConfig>,
    store: Arc<dyn FactStore>,
    search: Option<Arc<dyn SearchSync>>,
    aggregate_id: Option<AggregateId>,
    target: Option<EntityId>,
    entity_id: Option<EntityId>,
}

impl Transactor {
    /// Transactor writing through `store` with the given static configuration.
    pub fn new(config: Arc<TransactorConfig>, store: Arc<dyn FactStore>) -> Self {
        Self {
            config,
            store,
            search: None,
            aggregate_id: None,
            target: None,
            entity_id: None,
        }
    }

    /// Targets an existing aggregate.
    #[must_use]
    pub fn for_aggregate(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    /// Targets an existing entity for every `remember` call without an `id`.
    #[must_use]
    pub fn for_entity(mut self, id: EntityId) -> Self {
        self.target = Some(id);
        self.entity_id = Some(id);
        self
    }

    /// Notifies `sink` after writes touching a searchable key.
    #[must_use]
    pub fn with_search(mut self, sink: Arc<dyn SearchSync>) -> Self {
        self.search = Some(sink);
        self
    }

    /// Aggregate written to; `None` before the first write.
    #[must_use]
    pub const fn aggregate_id(&self) -> Option<AggregateId> {
        self.aggregate_id
    }

    /// Entity written by the last `remember` call, or the targeted entity.
    #[must_use]
    pub const fn entity_id(&self) -> Option<EntityId> {
        self.entity_id
    }

    /// Static write configuration.
    #[must_use]
    pub fn config(&self) -> &TransactorConfig {
        &self.config
    }

    /// Applies key translation and the acceptance filter.
    #[must_use]
    pub fn translate_keys(&self, params: Params) -> Params {
        params
            .into_iter()
            .map(|(key, value)| (self.config.translate_key(&key), value))
            .filter(|(key, _)| (self.config.acceptable)(key.as_str()))
            .collect()
    }

    /// Records the given fields as facts.
    ///
    /// `id` and `happened_at` are reserved: they set the entity id and the
    /// timestamp (default: now) instead of being stored. Without an `id` or a
    /// targeted entity, every call creates a new entity. Collection values
    /// first clear the key when the entity already exists.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidEntityId` / `InvalidTimestamp` for bad
    /// reserved values, or the store's error. Facts appended before a store
    /// failure remain committed.
    pub fn remember(&mut self, params: Params) -> FactResult<Vec<Fact>> {
        let caller_keys: Vec<String> = params.keys().map(str::to_string).collect();
        let mut fields = self.translate_keys(params);

        self.entity_id = match fields.remove(ID_KEY) {
            Some(raw) => Some(parse_entity_id(&raw)?),
            None => self.target,
        };
        let happened_at = match fields.remove(HAPPENED_AT_KEY) {
            Some(raw) => parse_happened_at(&raw)?,
            None => Utc::now(),
        };

        let mut committed = Vec::new();
        for (key, value) in fields {
            let values = match value {
                FieldValue::Many(values) => {
                    if self.entity_id.is_some() {
                        let clear = self.draft(&key, String::new(), happened_at, true);
                        committed.push(self.commit(clear)?);
                    }
                    values
                }
                FieldValue::One(value) => vec![value],
            };

            for value in values {
                let draft = self.draft(&key, value, happened_at, false);
                committed.push(self.commit(draft)?);
            }
        }

        debug!(
            "event=remember kind={} aggregate={:?} entity={:?} facts={}",
            self.config.entity_kind,
            self.aggregate_id,
            self.entity_id,
            committed.len()
        );

        if self.config.touches_searchable(caller_keys.iter().map(String::as_str)) {
            self.synchronize_search();
        }
        Ok(committed)
    }

    /// Retracts a whole entity.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownAggregate` before the first write, or
    /// the store's error.
    pub fn forget(&self, entity_id: EntityId) -> FactResult<Vec<Fact>> {
        self.forget_values(entity_id, "", Vec::<String>::new())
    }

    /// Retracts every value of one key, hiding its history.
    ///
    /// # Errors
    ///
    /// See [`Transactor::forget`].
    pub fn forget_key(&self, entity_id: EntityId, key: &str) -> FactResult<Vec<Fact>> {
        self.forget_values(entity_id, key, Vec::<String>::new())
    }

    /// Retracts specific values of one key; one retraction fact per value.
    ///
    /// An empty list retracts the key as a whole.
    ///
    /// # Errors
    ///
    /// See [`Transactor::forget`].
    pub fn forget_values<I, S>(&self, entity_id: EntityId, key: &str, values: I) -> FactResult<Vec<Fact>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let aggregate_id = self.aggregate_id.ok_or(ValidationError::UnknownAggregate)?;
        let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            values.push(String::new());
        }

        let happened_at = Utc::now();
        let mut committed = Vec::with_capacity(values.len());
        for value in values {
            let fact = self.store.append(FactDraft {
                aggregate_id: IdAssignment::Known(aggregate_id),
                entity_kind: self.config.entity_kind.clone(),
                entity_id: IdAssignment::Known(entity_id),
                key: key.to_string(),
                value,
                happened_at,
                is_retraction: true,
                delta: true,
            })?;
            committed.push(fact);
        }

        debug!(
            "event=forget kind={} aggregate={aggregate_id} entity={entity_id} key={key:?} facts={}",
            self.config.entity_kind,
            committed.len()
        );

        if self.config.touches_searchable(std::iter::once(key)) {
            self.synchronize_search();
        }
        Ok(committed)
    }

    fn draft(&self, key: &str, value: String, happened_at: DateTime<Utc>, is_retraction: bool) -> FactDraft {
        FactDraft {
            aggregate_id: self.aggregate_id.into(),
            entity_kind: self.config.entity_kind.clone(),
            entity_id: self.entity_id.into(),
            key: key.to_string(),
            value,
            happened_at,
            is_retraction,
            delta: true,
        }
    }

    /// Appends a draft and adopts any ids it bootstrapped.
    fn commit(&mut self, draft: FactDraft) -> FactResult<Fact> {
        let fact = self.store.append(draft)?;
        if self.aggregate_id.is_none() {
            self.aggregate_id = Some(fact.aggregate_id);
        }
        if self.entity_id.is_none() {
            self.entity_id = fact.entity_id;
        }
        Ok(fact)
    }

    fn synchronize_search(&self) {
        let (Some(sink), Some(aggregate_id)) = (self.search.as_ref(), self.aggregate_id) else {
            return;
        };
        if let Err(e) = sink.notify(aggregate_id) {
            warn!("event=search_notify status=failed aggregate={aggregate_id} error={e}");
        }
    }
}

impl fmt::Debug for Transactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transactor")
            .field("config", &self.config)
            .field("aggregate_id", &self.aggregate_id)
            .field("entity_id", &self.entity_id)
            .finish_non_exhaustive()
    }
}

fn parse_entity_id(raw: &FieldValue) -> Result<EntityId, ValidationError> {
    match raw {
        FieldValue::One(value) => value.parse().map_err(|_| ValidationError::InvalidEntityId {
            value: value.clone(),
        }),
        FieldValue::Many(_) => Err(ValidationError::InvalidEntityId {
            value: raw.describe(),
        }),
    }
}

fn parse_happened_at(raw: &FieldValue) -> Result<DateTime<Utc>, ValidationError> {
    match raw {
        FieldValue::One(value) => parse_timestamp(value).ok_or_else(|| ValidationError::InvalidTimestamp {
            value: value.clone(),
        }),
        FieldValue::Many(_) => Err(ValidationError::InvalidTimestamp {
            value: raw.describe(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;

    use crate::fact::FactId;
    use crate::search::SearchSyncError;
    use crate::storage::{FactSource, InMemoryFactStore, StorageError};

    #[derive(Default)]
    struct CountingSearch {
        calls: AtomicUsize,
    }

    impl SearchSync for CountingSearch {
        fn notify(&self, _aggregate_id: AggregateId) -> Result<(), SearchSyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSearch;

    impl SearchSync for FailingSearch {
        fn notify(&self, _aggregate_id: AggregateId) -> Result<(), SearchSyncError> {
            Err(SearchSyncError::Failed("index offline".to_string()))
        }
    }

    /// Accepts `limit` appends, then fails.
    struct FlakyStore {
        inner: InMemoryFactStore,
        limit: usize,
    }

    impl FactSource for FlakyStore {
        fn find_before(&self, id: AggregateId, as_of: DateTime<Utc>) -> Result<Vec<Fact>, StorageError> {
            self.inner.find_before(id, as_of)
        }
    }

    impl FactStore for FlakyStore {
        fn append(&self, draft: FactDraft) -> Result<Fact, StorageError> {
            if self.inner.count()? >= self.limit {
                return Err(StorageError::Backend("disk full".to_string()));
            }
            self.inner.append(draft)
        }

        fn count(&self) -> Result<usize, StorageError> {
            self.inner.count()
        }
    }

    fn config() -> Arc<TransactorConfig> {
        Arc::new(
            TransactorConfig::new("Test")
                .translate("foo", "bar")
                .searchable(["first_name", "last_name"]),
        )
    }

    fn transactor(store: &Arc<InMemoryFactStore>) -> Transactor {
        Transactor::new(config(), store.clone()).for_aggregate(AggregateId::new(1))
    }

    #[test]
    fn test_remember_single_fact() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);

        let facts = tx.remember(Params::new().set("model", "Civic")).unwrap();

        assert_eq!(facts.len(), 1);
        let fact = &facts[0];
        assert_eq!(fact.key, "model");
        assert_eq!(fact.raw(), Some("Civic"));
        assert_eq!(fact.aggregate_id, AggregateId::new(1));
        assert_eq!(fact.entity_kind, "Test");
        assert_eq!(fact.entity_id, Some(EntityId::from(fact.id)));
        assert!(!fact.is_retraction);
        assert!(fact.delta);
    }

    #[test]
    fn test_remember_timestamp_value_is_one_fact() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);

        let facts = tx.remember(Params::new().set("model", Utc::now())).unwrap();
        assert_eq!(facts.len(), 1);
    }

    #[test]
    fn test_remember_bootstraps_aggregate() {
        let store = Arc::new(InMemoryFactStore::new());
        store
            .append(FactDraft {
                aggregate_id: IdAssignment::Known(AggregateId::new(99)),
                entity_kind: "Other".to_string(),
                entity_id: IdAssignment::SelfAssigned,
                key: "x".to_string(),
                value: "y".to_string(),
                happened_at: Utc::now(),
                is_retraction: false,
                delta: true,
            })
            .unwrap();

        let mut tx = Transactor::new(config(), store.clone());
        let facts = tx.remember(Params::new().set("foo", "bar")).unwrap();

        assert_eq!(facts[0].id, FactId::new(2));
        assert_eq!(facts[0].aggregate_id, AggregateId::new(2));
        assert_eq!(tx.aggregate_id(), Some(AggregateId::new(2)));
        assert_eq!(tx.entity_id(), Some(EntityId::new(2)));
    }

    #[test]
    fn test_remember_shares_generated_entity_id() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);

        let facts = tx
            .remember(Params::new().set("model", "Civic").set("make", "Honda"))
            .unwrap();

        let generated = facts[0].entity_id.unwrap();
        assert_eq!(generated, EntityId::from(facts[0].id));
        assert_eq!(facts[0].key, "model");
        assert_eq!(facts[1].key, "make");
        assert_eq!(facts[1].entity_id, Some(generated));
        assert_eq!(facts[1].aggregate_id, AggregateId::new(1));
    }

    #[test]
    fn test_remember_three_fields_three_facts() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);

        let before = store.count().unwrap();
        tx.remember(
            Params::new()
                .set("model", "Civic")
                .set("make", "Honda")
                .set("estimated_value", 45.00),
        )
        .unwrap();

        assert_eq!(store.count().unwrap() - before, 3);
        assert!(tx.entity_id().is_some());
    }

    #[test]
    fn test_remember_explicit_id() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);

        let facts = tx
            .remember(Params::new().set("id", 3_453_453_i64).set("model", "Civic").set("make", "Honda"))
            .unwrap();

        assert_eq!(tx.entity_id(), Some(EntityId::new(3_453_453)));
        assert!(facts.iter().all(|f| f.entity_id == Some(EntityId::new(3_453_453))));
        assert!(facts.iter().all(|f| f.key != "id"));
    }

    #[test]
    fn test_each_remember_creates_new_entity() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);

        let civic = tx
            .remember(Params::new().set("model", "Civic").set("codes", vec!["1", "2"]))
            .unwrap();
        let fit = tx
            .remember(Params::new().set("model", "Fit").set("codes", vec!["9"]))
            .unwrap();

        assert_eq!(fit.len(), 2);
        assert!(fit.iter().all(|f| !f.is_retraction));
        assert_ne!(civic[0].entity_id, fit[0].entity_id);
        assert_eq!(tx.entity_id(), fit[0].entity_id);
        assert_eq!(fit[0].aggregate_id, civic[0].aggregate_id);
    }

    #[test]
    fn test_targeted_entity_kept_across_calls() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store).for_entity(EntityId::new(40));

        let first = tx.remember(Params::new().set("model", "Civic")).unwrap();
        let named = tx
            .remember(Params::new().set("id", 41_i64).set("model", "Fit"))
            .unwrap();
        let second = tx.remember(Params::new().set("model", "Accord")).unwrap();

        assert_eq!(first[0].entity_id, Some(EntityId::new(40)));
        assert_eq!(named[0].entity_id, Some(EntityId::new(41)));
        assert_eq!(second[0].entity_id, Some(EntityId::new(40)));
    }

    #[test]
    fn test_remember_invalid_id() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);

        let err = tx.remember(Params::new().set("id", "abc")).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_remember_explicit_happened_at() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);
        let at = Utc.with_ymd_and_hms(2013, 4, 3, 0, 0, 0).unwrap();

        let facts = tx
            .remember(Params::new().set("happened_at", at).set("model", "Civic"))
            .unwrap();

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].happened_at, at);
    }

    #[test]
    fn test_remember_invalid_happened_at() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);

        let err = tx
            .remember(Params::new().set("happened_at", "someday").set("model", "Civic"))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_strips_question_marks() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);

        let facts = tx.remember(Params::new().set("model?", "Civic")).unwrap();
        assert_eq!(facts[0].key, "model");
    }

    #[test]
    fn test_translates_keys() {
        let store = Arc::new(InMemoryFactStore::new());
        let tx = transactor(&store);

        let translated = tx.translate_keys(Params::new().set("foo", "baz"));
        assert_eq!(translated, Params::new().set("bar", "baz"));
    }

    #[test]
    fn test_unacceptable_keys_dropped() {
        let store = Arc::new(InMemoryFactStore::new());
        let config = Arc::new(TransactorConfig::new("Test").accept(|key| key != "secret"));
        let mut tx = Transactor::new(config, store.clone()).for_aggregate(AggregateId::new(1));

        let facts = tx
            .remember(Params::new().set("secret", "x").set("model", "Civic"))
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].key, "model");
    }

    #[test]
    fn test_collection_for_new_entity_has_no_clear() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);

        let facts = tx
            .remember(Params::new().set("codes", vec!["1", "2"]))
            .unwrap();

        assert_eq!(facts.len(), 2);
        assert!(facts.iter().all(|f| !f.is_retraction));
        assert_eq!(facts[1].entity_id, facts[0].entity_id);
    }

    #[test]
    fn test_collection_for_known_entity_clears_first() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store).for_entity(EntityId::new(40));

        let facts = tx
            .remember(Params::new().set("codes", vec![3_i64, 4]))
            .unwrap();

        assert_eq!(facts.len(), 3);
        assert!(facts[0].retracts_key());
        assert_eq!(facts[0].key, "codes");
        assert_eq!(facts[0].happened_at, facts[1].happened_at);
        assert_eq!(facts[1].raw(), Some("3"));
        assert_eq!(facts[2].raw(), Some("4"));
    }

    #[test]
    fn test_forget_entity() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store);
        let fact = tx.remember(Params::new().set("model", "Civic")).unwrap().remove(0);
        let entity_id = fact.entity_id.unwrap();

        let before = store.count().unwrap();
        let forgotten = tx.forget(entity_id).unwrap();

        assert_eq!(store.count().unwrap() - before, 1);
        let retraction = &forgotten[0];
        assert!(retraction.is_retraction);
        assert!(retraction.retracts_entity());
        assert_eq!(retraction.key, "");
        assert_eq!(retraction.raw(), Some(""));
        assert_eq!(retraction.aggregate_id, AggregateId::new(1));
        assert_eq!(retraction.entity_kind, "Test");
        assert_eq!(retraction.entity_id, Some(entity_id));
    }

    #[test]
    fn test_forget_key() {
        let store = Arc::new(InMemoryFactStore::new());
        let tx = transactor(&store);

        let retraction = tx.forget_key(EntityId::new(4), "model").unwrap().remove(0);
        assert_eq!(retraction.key, "model");
        assert_eq!(retraction.raw(), Some(""));
        assert!(retraction.retracts_key());
    }

    #[test]
    fn test_forget_values() {
        let store = Arc::new(InMemoryFactStore::new());
        let tx = transactor(&store);

        let facts = tx.forget_values(EntityId::new(4), "model", ["Civic", "Accord"]).unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].raw(), Some("Civic"));
        assert_eq!(facts[1].raw(), Some("Accord"));
        assert!(facts.iter().all(|f| f.is_retraction && f.key == "model"));
    }

    #[test]
    fn test_forget_requires_aggregate() {
        let store = Arc::new(InMemoryFactStore::new());
        let tx = Transactor::new(config(), store.clone());

        let err = tx.forget(EntityId::new(4)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::FactError::Validation(ValidationError::UnknownAggregate)
        ));
    }

    #[test]
    fn test_search_notified_once_per_call() {
        let store = Arc::new(InMemoryFactStore::new());
        let search = Arc::new(CountingSearch::default());
        let mut tx = transactor(&store).with_search(search.clone());

        tx.remember(Params::new().set("first_name", "Ada").set("last_name", "Lovelace"))
            .unwrap();
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);

        tx.remember(Params::new().set("model", "Civic")).unwrap();
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);

        let entity_id = tx.entity_id().unwrap();
        tx.forget_key(entity_id, "last_name").unwrap();
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);

        tx.forget(entity_id).unwrap();
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_search_failure_does_not_fail_commit() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut tx = transactor(&store).with_search(Arc::new(FailingSearch));

        let facts = tx.remember(Params::new().set("first_name", "Ada")).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_store_failure_is_partial() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryFactStore::new(),
            limit: 1,
        });
        let mut tx = Transactor::new(config(), store.clone()).for_aggregate(AggregateId::new(1));

        let err = tx
            .remember(Params::new().set("model", "Civic").set("make", "Honda"))
            .unwrap_err();

        assert!(err.is_storage());
        assert_eq!(store.count().unwrap(), 1);
        assert!(tx.entity_id().is_some());
    }

    #[test]
    fn test_params_replace_in_place() {
        let params = Params::new().set("a", "1").set("b", "2").set("a", "3");
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(params.get("a"), Some(&FieldValue::One("3".to_string())));
    }
}
