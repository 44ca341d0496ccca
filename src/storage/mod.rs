//! Fact storage.
//!
//! The traits define what the projector reads ([`FactSource`]) and what the
//! transactor writes to ([`FactStore`]). [`InMemoryFactStore`] is the
//! reference backend; durable bindings implement the same traits.

mod memory;
mod traits;

pub use memory::InMemoryFactStore;
pub use traits::{FactSource, FactStore, StorageError};
