//! # Factline - an event-sourced read model
//!
//! Every change to an aggregate is recorded as an immutable, timestamped
//! [`Fact`]. Current state is never stored: it is projected on demand by
//! resolving, per key, the most recent visible fact.
//!
//! ## Core Concepts
//!
//! - **Fact**: an append-only record of one key/value change, or a retraction
//! - **Entity**: a typed view over the facts of one sub-entity, described by an [`EntitySchema`]
//! - **Aggregate**: the owning context; partitions its facts by kind and projects relations
//! - **Transactor**: the write path, turning field maps into committed facts
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use factline::{
//!     Aggregate, AggregateSchema, Converter, EntitySchema, InMemoryFactStore, Params,
//!     Transactor, TransactorConfig, Value,
//! };
//!
//! let vehicle = EntitySchema::builder("Vehicle")
//!     .fact("make", Converter::String)
//!     .fact("year", Converter::Integer)
//!     .build()?;
//! let schema = Arc::new(AggregateSchema::builder().relation("vehicles", Arc::new(vehicle)).build()?);
//!
//! let store = Arc::new(InMemoryFactStore::new());
//! let mut tx = Transactor::new(Arc::new(TransactorConfig::new("Vehicle")), store.clone());
//! tx.remember(Params::new().set("make", "Honda").set("year", 2004_i64))?;
//!
//! let aggregate = Aggregate::find(store.as_ref(), schema, tx.aggregate_id().unwrap())?;
//! let vehicles = aggregate.entities("vehicles")?;
//! assert_eq!(vehicles[0].get("year"), Some(&Value::Int(2004)));
//! # Ok::<(), factline::FactError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod error;
pub mod fact;
pub mod value;

// Projection
pub mod aggregate;
pub mod convert;
pub mod entity;
pub mod resolve;
pub mod schema;

// Write path
pub mod search;
pub mod storage;
pub mod transactor;

pub use aggregate::Aggregate;
pub use convert::{Converter, CustomConverter};
pub use entity::Entity;
pub use error::{FactError, FactResult, ValidationError};
pub use fact::{AggregateId, EntityId, Fact, FactDraft, FactId, IdAssignment, RetractionScope};
pub use resolve::FactIndex;
pub use schema::{
    AggregateSchema, CollectionDescriptor, EntitySchema, FieldDescriptor, Relation, SchemaConfig,
};
pub use search::{SearchQueue, SearchQueueConfig, SearchSync, SearchSyncError};
pub use storage::{FactSource, FactStore, InMemoryFactStore, StorageError};
pub use transactor::{FieldValue, Params, Transactor, TransactorConfig};
pub use value::{Amount, Value};
