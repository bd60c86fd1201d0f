//! dbkeeper core: resource model, store capability and error taxonomy.
//!
//! Everything every other dbkeeper crate builds on: the managed-resource
//! records (spec + status + lifecycle metadata), the consumed declared-
//! resource store interface with its in-memory implementation, and the
//! shared operator error type.

pub mod error;
pub mod meta;
pub mod resources;
pub mod store;

pub use error::{OperatorError, OperatorResult};
pub use meta::{ResourceKey, ResourceKind, ResourceMeta, FINALIZER};
pub use resources::Resource;
pub use store::{LabelSelector, MemoryStore, ResourceStore};
