//! Angelo Core - declarative relationships, inheritance and object lifecycle.
//!
//! Entities are declared on a [`SchemaBuilder`], which synthesizes foreign
//! keys, named back-references, association entities for many-to-many
//! relations and discriminator-driven inheritance hierarchies. The frozen
//! [`Schema`] is then served by a sled-backed [`Database`], whose
//! [`Session`]s stage writes and whose [`Lifecycle`] runs create, update
//! and delete with hooks and commit control.

pub mod builder;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod instance;
pub mod introspect;
pub mod lifecycle;
pub mod logging;
pub mod naming;
pub mod storage;
pub mod value;

pub use builder::{BaseModel, CrossReferenceOptions, ReferenceOptions, SchemaBuilder};
pub use catalog::{
    Cardinality, CascadePolicy, DeleteBehavior, EntityDef, FieldDef, FieldType, RelationDef,
    ScalarType, Schema, StorageStrategy, DISCRIMINATOR, PRIMARY_KEY,
};
pub use config::AngeloConfig;
pub use database::Database;
pub use error::{Error, PersistenceError, Result};
pub use instance::{Instance, Kwargs};
pub use introspect::{EntityView, Introspectable};
pub use lifecycle::{HookRegistry, Hooks, Lifecycle, SanitizePolicy, WriteOptions};
pub use logging::{Logger, MemoryLogger, SilentLogger, TracingLogger};
pub use naming::{Inflector, Naming, NamingResolver, PluralizerInflector};
pub use storage::{Related, Session, SledStore, StorageConfig, Store};
pub use value::Value;
