//! Schema catalog.
//!
//! Holds the entity, field and relation declarations produced by the schema
//! builder, and records every distinct schema a database has been opened with.

mod catalog;
mod entity;
mod field;
mod relation;
mod schema;
mod types;

pub use catalog::Catalog;
pub use entity::{
    EntityDef, EntityRole, InheritanceDef, PolymorphicDef, StorageStrategy, DISCRIMINATOR,
};
pub use field::{DefaultValue, FieldDef, ForeignKeyRef, PRIMARY_KEY};
pub use relation::{
    AccessorDef, AssociationDef, Cardinality, CascadeOption, CascadePolicy, ColumnRef,
    DeleteBehavior, JoinCondition, RelationDef, Side, DEFAULT_CASCADE,
};
pub use schema::{Schema, TableLayout};
pub use types::{FieldType, ScalarType};
