//! Attribute resolution: from a key's fact history to its effective value.
//!
//! Facts for one key are kept most-recent first: descending `happened_at`,
//! ties broken by descending fact id (the later append wins).

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::convert::Converter;
use crate::fact::Fact;
use crate::value::Value;

/// Most-recent-first ordering for facts of one key.
pub(crate) fn recent_first(a: &Fact, b: &Fact) -> Ordering {
    b.happened_at
        .cmp(&a.happened_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Facts grouped by key, each group sorted most-recent first.
#[derive(Debug, Clone, Default)]
pub struct FactIndex {
    by_key: HashMap<String, Vec<Fact>>,
}

impl FactIndex {
    /// Groups and sorts `facts`.
    pub fn from_facts(facts: impl IntoIterator<Item = Fact>) -> Self {
        let mut by_key: HashMap<String, Vec<Fact>> = HashMap::new();
        for fact in facts {
            by_key.entry(fact.key.clone()).or_default().push(fact);
        }
        for group in by_key.values_mut() {
            group.sort_by(recent_first);
        }
        Self { by_key }
    }

    /// Facts recorded for `key`, most recent first. Empty if none.
    #[must_use]
    pub fn facts(&self, key: &str) -> &[Fact] {
        self.by_key.get(key).map_or(&[], Vec::as_slice)
    }

    /// Keys with at least one fact.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }

    /// True when no facts were indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Truncates a sorted fact list at the first key-level retraction.
///
/// The horizon fact itself is excluded along with everything older; facts
/// newer than it stay visible.
#[must_use]
pub fn visible(facts: &[Fact]) -> &[Fact] {
    let end = facts
        .iter()
        .position(Fact::retracts_key)
        .unwrap_or(facts.len());
    &facts[..end]
}

/// Resolves a single-valued field.
///
/// Falls back to `default` when nothing is visible, when the most recent fact
/// is a retraction, or when its raw value equals `sentinel`.
#[must_use]
pub fn resolve(
    facts: &[Fact],
    default: &Value,
    converter: &Converter,
    sentinel: Option<&str>,
) -> Value {
    let Some(latest) = visible(facts).first() else {
        return default.clone();
    };
    if latest.is_retraction || (sentinel.is_some() && latest.raw() == sentinel) {
        return default.clone();
    }
    converter.convert(latest.raw())
}

/// Resolves a collection field to a sorted, deduplicated set of values.
///
/// Each distinct raw value is judged by its own most recent fact: retracted
/// or `ignored` values are left out. Values converting to null are dropped.
#[must_use]
pub fn resolve_all(facts: &[Fact], converter: &Converter, ignored: Option<&str>) -> Vec<Value> {
    let mut seen: HashSet<Option<&str>> = HashSet::new();
    let mut values: Vec<Value> = visible(facts)
        .iter()
        .filter(|fact| seen.insert(fact.raw()))
        .filter(|fact| !fact.is_retraction)
        .filter(|fact| ignored.is_none() || fact.raw() != ignored)
        .map(|fact| converter.convert(fact.raw()))
        .filter(|value| !value.is_null())
        .collect();
    values.sort();
    values.dedup();
    values
}
