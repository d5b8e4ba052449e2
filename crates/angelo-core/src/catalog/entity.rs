//! Entity definitions.

use super::field::{FieldDef, PRIMARY_KEY};
use super::relation::AccessorDef;
use heck::ToSnakeCase;
use rkyv::{Archive, Deserialize, Serialize};

/// Conventional name of the discriminator column.
pub const DISCRIMINATOR: &str = "_identity";

/// An entity definition (storage schema).
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity type name (unique within the schema).
    pub name: String,
    /// Storage table name.
    pub table: String,
    /// Override for the API name.
    pub api_name: Option<String>,
    /// Declared fields, in declaration order.
    pub fields: Vec<FieldDef>,
    /// Relationship accessors declared on this entity.
    pub accessors: Vec<AccessorDef>,
    /// Parent link for derived entities.
    pub inheritance: Option<InheritanceDef>,
    /// Discriminator setup for polymorphic roots.
    pub polymorphic: Option<PolymorphicDef>,
    /// Discriminator value identifying this entity's rows.
    pub identity: Option<String>,
    /// Whether this entity was synthesized for a many-to-many relation.
    pub association: bool,
    /// Default for the `delay_save` flag of new instances.
    pub delay_save: bool,
}

/// How a derived entity stores its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum StorageStrategy {
    /// Rows live in the root's table.
    SingleTable,
    /// Rows live in an own table sharing the parent's primary key.
    JoinedTable,
}

/// Link from a derived entity to its parent.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct InheritanceDef {
    /// Parent entity name.
    pub parent: String,
    /// Storage strategy.
    pub strategy: StorageStrategy,
}

/// Discriminator setup of a polymorphic root.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct PolymorphicDef {
    /// Discriminator field name.
    pub discriminator: String,
    /// Permitted identities; the first is the root's own.
    pub identities: Vec<String>,
}

/// Role of an entity within an inheritance hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRole {
    /// No inheritance involved.
    Plain,
    /// Head of a polymorphic hierarchy.
    Root,
    /// Bound to a root through a parent chain.
    Derived(StorageStrategy),
}

impl EntityDef {
    /// Create a new entity definition; the table is the snake_case of the name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: name.to_snake_case(),
            name,
            api_name: None,
            fields: Vec::new(),
            accessors: Vec::new(),
            inheritance: None,
            polymorphic: None,
            identity: None,
            association: false,
            delay_save: false,
        }
    }

    /// Override the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Override the API name.
    pub fn with_api_name(mut self, api_name: impl Into<String>) -> Self {
        self.api_name = Some(api_name.into());
        self
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Make new instances defer their commits.
    pub fn with_delay_save(mut self) -> Self {
        self.delay_save = true;
        self
    }

    /// Get a field declared on this entity by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get an accessor declared on this entity by name.
    pub fn get_accessor(&self, name: &str) -> Option<&AccessorDef> {
        self.accessors.iter().find(|a| a.name == name)
    }

    /// Check whether this entity declares its own primary key.
    pub fn has_primary_key(&self) -> bool {
        self.get_field(PRIMARY_KEY).is_some_and(|f| f.primary_key)
    }

    /// Parent entity name, for derived entities.
    pub fn parent(&self) -> Option<&str> {
        self.inheritance.as_ref().map(|i| i.parent.as_str())
    }

    /// Role within an inheritance hierarchy.
    pub fn role(&self) -> EntityRole {
        match (&self.inheritance, &self.polymorphic) {
            (Some(inheritance), _) => EntityRole::Derived(inheritance.strategy),
            (None, Some(_)) => EntityRole::Root,
            (None, None) => EntityRole::Plain,
        }
    }

    /// Whether this entity stores its rows in a table of its own.
    pub fn owns_table(&self) -> bool {
        !matches!(
            self.role(),
            EntityRole::Derived(StorageStrategy::SingleTable)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldType;

    #[test]
    fn test_entity_builder() {
        let entity = EntityDef::new("UserGroup")
            .with_field(FieldDef::primary_key())
            .with_field(FieldDef::new("name", FieldType::text()))
            .with_field(FieldDef::optional("email", FieldType::text()));

        assert_eq!(entity.name, "UserGroup");
        assert_eq!(entity.table, "user_group");
        assert_eq!(entity.fields.len(), 3);
        assert!(entity.has_primary_key());
        assert_eq!(entity.role(), EntityRole::Plain);
        assert!(entity.owns_table());
    }

    #[test]
    fn test_get_field() {
        let entity = EntityDef::new("Company")
            .with_field(FieldDef::primary_key())
            .with_field(FieldDef::new("name", FieldType::string(30)));

        assert!(entity.get_field("id").is_some());
        assert!(entity.get_field("name").is_some());
        assert!(entity.get_field("nonexistent").is_none());
    }

    #[test]
    fn test_roles() {
        let mut root = EntityDef::new("User");
        root.polymorphic = Some(PolymorphicDef {
            discriminator: DISCRIMINATOR.into(),
            identities: vec!["User".into(), "Employee".into()],
        });
        assert_eq!(root.role(), EntityRole::Root);

        let mut derived = EntityDef::new("Employee");
        derived.inheritance = Some(InheritanceDef {
            parent: "User".into(),
            strategy: StorageStrategy::SingleTable,
        });
        assert_eq!(
            derived.role(),
            EntityRole::Derived(StorageStrategy::SingleTable)
        );
        assert!(!derived.owns_table());
        assert_eq!(derived.parent(), Some("User"));
    }
}
