//! Column and relationship introspection, and flat serialization of instances.

use crate::catalog::{EntityDef, Schema};
use crate::error::Result;
use crate::instance::Instance;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Metadata about an entity's storable attributes and relationships.
pub trait Introspectable {
    /// Column names, optionally without the primary key and without the
    /// whitespace separated names in `remove`.
    fn columns(&self, skip_pk: bool, remove: &str) -> BTreeSet<String>;

    /// Relationship accessor names, without those in `remove`.
    fn relationships(&self, remove: &str) -> BTreeSet<String>;
}

/// An entity resolved against its schema, inherited members included.
#[derive(Debug, Clone, Copy)]
pub struct EntityView<'a> {
    schema: &'a Schema,
    entity: &'a EntityDef,
}

impl<'a> EntityView<'a> {
    /// Resolve `name` in `schema`.
    pub fn new(schema: &'a Schema, name: &str) -> Result<Self> {
        Ok(Self {
            schema,
            entity: schema.entity(name)?,
        })
    }

    /// The entity's own declaration.
    pub fn entity(&self) -> &'a EntityDef {
        self.entity
    }

    /// Columns of `instance` with their values. Relationships are never
    /// included; serialize `<relation>_id` instead.
    pub fn to_dict(&self, instance: &Instance, remove: &str) -> BTreeMap<String, Value> {
        self.columns(false, remove)
            .into_iter()
            .map(|column| {
                let value = instance.value(&column);
                (column, value)
            })
            .collect()
    }

    /// [`EntityView::to_dict`] as a JSON object.
    pub fn to_json(&self, instance: &Instance, remove: &str) -> serde_json::Value {
        serde_json::Value::Object(
            self.to_dict(instance, remove)
                .into_iter()
                .map(|(column, value)| (column, value.to_json()))
                .collect(),
        )
    }
}

impl Introspectable for EntityView<'_> {
    fn columns(&self, skip_pk: bool, remove: &str) -> BTreeSet<String> {
        let remove: Vec<&str> = remove.split_whitespace().collect();
        self.schema
            .fields(&self.entity.name)
            .unwrap_or_default()
            .into_iter()
            .filter(|f| !(skip_pk && f.primary_key))
            .filter(|f| !remove.contains(&f.name.as_str()))
            .map(|f| f.name.clone())
            .collect()
    }

    fn relationships(&self, remove: &str) -> BTreeSet<String> {
        let remove: Vec<&str> = remove.split_whitespace().collect();
        self.schema
            .accessors(&self.entity.name)
            .unwrap_or_default()
            .into_iter()
            .filter(|a| !remove.contains(&a.name.as_str()))
            .map(|a| a.name.clone())
            .collect()
    }
}

impl Instance {
    /// Flat mapping of the instance's columns, primary key included.
    pub fn to_dict(&self, schema: &Schema, remove: &str) -> Result<BTreeMap<String, Value>> {
        Ok(EntityView::new(schema, self.entity())?.to_dict(self, remove))
    }

    /// [`Instance::to_dict`] as a JSON object.
    pub fn to_json(&self, schema: &Schema, remove: &str) -> Result<serde_json::Value> {
        Ok(EntityView::new(schema, self.entity())?.to_json(self, remove))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BaseModel, CrossReferenceOptions, ReferenceOptions, SchemaBuilder};
    use crate::catalog::{FieldDef, FieldType, StorageStrategy, DISCRIMINATOR};
    use std::sync::Arc;

    fn schema() -> Arc<Schema> {
        let mut builder = SchemaBuilder::new();
        let base = BaseModel::new();
        builder
            .add_entity(
                EntityDef::new("Group").with_field(FieldDef::new("abbr", FieldType::string(6))),
            )
            .unwrap();
        builder
            .add_entity(
                EntityDef::new("Company").with_field(FieldDef::new("name", FieldType::string(30))),
            )
            .unwrap();
        builder
            .make_polymorphic_top(
                &base,
                EntityDef::new("User").with_field(FieldDef::new("email", FieldType::string(30))),
                ["User", "Employee"],
            )
            .unwrap();
        builder
            .add_cross_reference("User", "Group", CrossReferenceOptions::new())
            .unwrap();
        builder
            .derive_model(
                "User",
                EntityDef::new("Employee")
                    .with_field(FieldDef::optional("salary", FieldType::money())),
                None,
                StorageStrategy::SingleTable,
            )
            .unwrap();
        builder
            .add_reference("Employee", "Company", ReferenceOptions::new())
            .unwrap();
        builder.build().unwrap()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_columns_include_inherited() {
        let schema = schema();
        let employee = EntityView::new(&schema, "Employee").unwrap();

        assert_eq!(
            employee.columns(true, ""),
            set(&["email", DISCRIMINATOR, "salary", "company_id"])
        );
        assert_eq!(
            employee.columns(false, "salary _identity"),
            set(&["id", "email", "company_id"])
        );
    }

    #[test]
    fn test_relationships() {
        let schema = schema();
        let employee = EntityView::new(&schema, "Employee").unwrap();
        assert_eq!(employee.relationships(""), set(&["groups", "company"]));
        assert_eq!(employee.relationships("groups"), set(&["company"]));

        let company = EntityView::new(&schema, "Company").unwrap();
        assert_eq!(company.relationships(""), set(&["employees"]));
    }

    #[test]
    fn test_to_dict_skips_relationships() {
        let schema = schema();
        let employee = Instance::new("Employee")
            .with("id", 2i64)
            .with("email", "e2@acme.com")
            .with("company_id", 1i64);

        let dict = employee.to_dict(&schema, DISCRIMINATOR).unwrap();
        assert_eq!(dict.len(), 4);
        assert_eq!(dict["salary"], Value::Null);
        assert!(!dict.contains_key("company"));

        let json = employee.to_json(&schema, "salary _identity").unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 2, "email": "e2@acme.com", "company_id": 1})
        );
    }
}
