//! Static field and relation tables.
//!
//! Each entity kind declares its fields once, up front, in an
//! [`EntitySchema`]. Projection reads these tables generically; nothing is
//! declared per instance. An [`AggregateSchema`] adds the aggregate's own
//! attributes and the explicit relation-name → entity-kind mapping.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::convert::Converter;
use crate::error::ValidationError;
use crate::value::Value;

/// Normalizes an entity-kind tag for comparison.
pub(crate) fn normalize_kind(kind: &str) -> String {
    kind.trim().to_ascii_lowercase()
}

/// A declared single-valued field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Fact key.
    pub name: String,
    /// Raw text to value conversion.
    pub converter: Converter,
    /// Returned when no visible, non-retracted fact exists.
    pub default: Value,
    /// Raw value that also triggers the default.
    pub sentinel: Option<String>,
}

impl FieldDescriptor {
    /// Field with a null default and no sentinel.
    pub fn new(name: impl Into<String>, converter: Converter) -> Self {
        Self {
            name: name.into(),
            converter,
            default: Value::Null,
            sentinel: None,
        }
    }

    /// Value used when nothing visible is recorded.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Treat this raw value as "use the default".
    #[must_use]
    pub fn use_default_for(mut self, raw: impl Into<String>) -> Self {
        self.sentinel = Some(raw.into());
        self
    }
}

/// A declared multi-valued field.
#[derive(Debug, Clone)]
pub struct CollectionDescriptor {
    /// Fact key.
    pub name: String,
    /// Raw text to value conversion, applied per member.
    pub converter: Converter,
    /// Raw value never admitted to the collection.
    pub ignored: Option<String>,
}

impl CollectionDescriptor {
    /// Collection admitting every raw value.
    pub fn new(name: impl Into<String>, converter: Converter) -> Self {
        Self {
            name: name.into(),
            converter,
            ignored: None,
        }
    }

    /// Raw value to leave out of the collection.
    #[must_use]
    pub fn ignore_value(mut self, raw: impl Into<String>) -> Self {
        self.ignored = Some(raw.into());
        self
    }
}

/// Field declarations shared by every entity of one kind.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    kind: String,
    fields: Vec<FieldDescriptor>,
    collections: Vec<CollectionDescriptor>,
}

impl EntitySchema {
    /// Starts declaring fields for entities of `kind`.
    pub fn builder(kind: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            kind: kind.into(),
            fields: Vec::new(),
            collections: Vec::new(),
        }
    }

    /// Normalized (lowercase) entity-kind tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Single-valued fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Collections in declaration order.
    #[must_use]
    pub fn collections(&self) -> &[CollectionDescriptor] {
        &self.collections
    }

    /// Position and descriptor of a declared single-valued field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<(usize, &FieldDescriptor)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    /// Descriptor of a declared collection.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionDescriptor> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Names of the declared single-valued fields.
    pub fn field_keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Names of the declared collections.
    pub fn collection_keys(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(|c| c.name.as_str())
    }
}

/// Builder for [`EntitySchema`].
#[derive(Debug, Clone)]
pub struct EntitySchemaBuilder {
    kind: String,
    fields: Vec<FieldDescriptor>,
    collections: Vec<CollectionDescriptor>,
}

impl EntitySchemaBuilder {
    /// Declares a single-valued field with no default.
    #[must_use]
    pub fn fact(self, name: impl Into<String>, converter: Converter) -> Self {
        self.field(FieldDescriptor::new(name, converter))
    }

    /// Declares a single-valued field.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares a multi-valued field.
    #[must_use]
    pub fn collection(mut self, collection: CollectionDescriptor) -> Self {
        self.collections.push(collection);
        self
    }

    /// Freezes the declarations.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DuplicateField` if a name is declared twice,
    /// across fields and collections alike.
    pub fn build(self) -> Result<EntitySchema, ValidationError> {
        let kind = normalize_kind(&self.kind);
        let mut seen = HashSet::new();
        let names = self
            .fields
            .iter()
            .map(|f| &f.name)
            .chain(self.collections.iter().map(|c| &c.name));
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(ValidationError::DuplicateField {
                    kind,
                    name: name.clone(),
                });
            }
        }

        Ok(EntitySchema {
            kind,
            fields: self.fields,
            collections: self.collections,
        })
    }
}

/// A named one-to-many relation from an aggregate to entities of one kind.
#[derive(Debug, Clone)]
pub struct Relation {
    /// Name used with [`crate::Aggregate::entities`].
    pub name: String,
    /// Schema of the related entity kind.
    pub schema: Arc<EntitySchema>,
}

/// The aggregate's own attributes plus its declared relations.
#[derive(Debug, Clone)]
pub struct AggregateSchema {
    attributes: Arc<EntitySchema>,
    relations: Vec<Relation>,
}

impl AggregateSchema {
    /// Starts declaring attributes and relations.
    pub fn builder() -> AggregateSchemaBuilder {
        AggregateSchemaBuilder::default()
    }

    /// Builds a schema from deserialized configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` for duplicate fields or relations.
    pub fn from_config(config: SchemaConfig) -> Result<Self, ValidationError> {
        let mut builder = Self::builder();
        for field in config.attributes {
            builder = builder.attribute(field.into_descriptor());
        }
        for collection in config.collections {
            builder = builder.attribute_collection(collection.into_descriptor());
        }
        for relation in config.relations {
            let mut entity = EntitySchema::builder(relation.kind);
            for field in relation.facts {
                entity = entity.field(field.into_descriptor());
            }
            for collection in relation.collections {
                entity = entity.collection(collection.into_descriptor());
            }
            builder = builder.relation(relation.name, Arc::new(entity.build()?));
        }
        builder.build()
    }

    /// Parses a JSON [`SchemaConfig`] and builds the schema.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for malformed JSON, and the
    /// errors of [`AggregateSchema::from_config`].
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let config: SchemaConfig =
            serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
                reason: e.to_string(),
            })?;
        Self::from_config(config)
    }

    /// Schema of the aggregate's own attributes (empty kind).
    #[must_use]
    pub fn attributes(&self) -> &Arc<EntitySchema> {
        &self.attributes
    }

    /// Declared relations in declaration order.
    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Position and declaration of a relation.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<(usize, &Relation)> {
        self.relations.iter().enumerate().find(|(_, r)| r.name == name)
    }
}

/// Builder for [`AggregateSchema`].
#[derive(Debug, Clone, Default)]
pub struct AggregateSchemaBuilder {
    attributes: Vec<FieldDescriptor>,
    collections: Vec<CollectionDescriptor>,
    relations: Vec<Relation>,
}

impl AggregateSchemaBuilder {
    /// Declares a single-valued attribute of the aggregate itself.
    #[must_use]
    pub fn attribute(mut self, field: FieldDescriptor) -> Self {
        self.attributes.push(field);
        self
    }

    /// Declares a multi-valued attribute of the aggregate itself.
    #[must_use]
    pub fn attribute_collection(mut self, collection: CollectionDescriptor) -> Self {
        self.collections.push(collection);
        self
    }

    /// Maps relation `name` to entities described by `schema`.
    #[must_use]
    pub fn relation(mut self, name: impl Into<String>, schema: Arc<EntitySchema>) -> Self {
        self.relations.push(Relation {
            name: name.into(),
            schema,
        });
        self
    }

    /// # Errors
    ///
    /// Returns `ValidationError::DuplicateRelation` or `DuplicateField`.
    pub fn build(self) -> Result<AggregateSchema, ValidationError> {
        let mut seen = HashSet::new();
        for relation in &self.relations {
            if !seen.insert(relation.name.as_str()) {
                return Err(ValidationError::DuplicateRelation {
                    name: relation.name.clone(),
                });
            }
        }

        let mut attributes = EntitySchema::builder("");
        for field in self.attributes {
            attributes = attributes.field(field);
        }
        for collection in self.collections {
            attributes = attributes.collection(collection);
        }
        let attributes = attributes.build()?;

        Ok(AggregateSchema {
            attributes: Arc::new(attributes),
            relations: self.relations,
        })
    }
}

fn default_tag() -> String {
    "string".to_string()
}

/// Serializable schema configuration.
///
/// ```
/// use factline::AggregateSchema;
///
/// let schema = AggregateSchema::from_json(r#"{
///     "attributes": [{ "name": "last_name" }],
///     "relations": [{
///         "name": "vehicles",
///         "kind": "Vehicle",
///         "facts": [{ "name": "estimated_value", "convert_to": "amount", "default": "0" }]
///     }]
/// }"#).unwrap();
///
/// assert_eq!(schema.relations()[0].schema.kind(), "vehicle");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Single-valued aggregate attributes.
    #[serde(default)]
    pub attributes: Vec<FieldConfig>,
    /// Multi-valued aggregate attributes.
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
    /// Relations to entity kinds.
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

/// One relation and the fields of its entity kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationConfig {
    /// Relation name.
    pub name: String,
    /// Entity-kind tag of the related facts.
    pub kind: String,
    /// Single-valued fields.
    #[serde(default)]
    pub facts: Vec<FieldConfig>,
    /// Multi-valued fields.
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

/// Single-valued field configuration. `default` is raw text run through the
/// field's converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Fact key.
    pub name: String,
    /// Converter tag; `string` when omitted.
    #[serde(default = "default_tag")]
    pub convert_to: String,
    /// Raw default text.
    #[serde(default)]
    pub default: Option<String>,
    /// Raw value that triggers the default.
    #[serde(default)]
    pub use_default_for: Option<String>,
}

impl FieldConfig {
    fn into_descriptor(self) -> FieldDescriptor {
        let converter = Converter::from_tag(&self.convert_to);
        let default = self
            .default
            .as_deref()
            .map_or(Value::Null, |raw| converter.convert(Some(raw)));
        FieldDescriptor {
            name: self.name,
            converter,
            default,
            sentinel: self.use_default_for,
        }
    }
}

/// Multi-valued field configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Fact key.
    pub name: String,
    /// Converter tag; `string` when omitted.
    #[serde(default = "default_tag")]
    pub convert_to: String,
    /// Raw value left out of the collection.
    #[serde(default)]
    pub ignore_value: Option<String>,
}

impl CollectionConfig {
    fn into_descriptor(self) -> CollectionDescriptor {
        CollectionDescriptor {
            name: self.name,
            converter: Converter::from_tag(&self.convert_to),
            ignored: self.ignore_value,
        }
    }
}
