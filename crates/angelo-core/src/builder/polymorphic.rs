//! Polymorphic hierarchies: roots and derived entities.

use super::{BaseModel, SchemaBuilder};
use crate::catalog::{
    DefaultValue, EntityDef, FieldDef, FieldType, InheritanceDef, PolymorphicDef,
    StorageStrategy, DISCRIMINATOR, PRIMARY_KEY,
};
use crate::error::{Error, Result};

impl SchemaBuilder {
    /// Register `cls`, bound to `base`, as the root of a polymorphic hierarchy.
    ///
    /// The root carries a discriminator column restricted to `identities`;
    /// the first identity is the root's own and the column's default.
    pub fn make_polymorphic_top<I, S>(
        &mut self,
        base: &BaseModel,
        cls: EntityDef,
        identities: I,
    ) -> Result<&EntityDef>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let identities: Vec<String> = identities.into_iter().map(Into::into).collect();
        let Some(top) = identities.first().cloned() else {
            return Err(Error::Configuration(format!(
                "polymorphic {} needs at least one identity",
                cls.name
            )));
        };
        if let Some(dup) = identities
            .iter()
            .enumerate()
            .find(|(i, id)| identities[..*i].contains(id))
            .map(|(_, id)| id)
        {
            return Err(Error::Configuration(format!(
                "identity {dup} listed twice for {}",
                cls.name
            )));
        }
        if cls.get_field(DISCRIMINATOR).is_some() {
            return Err(Error::ambiguous(
                &cls.name,
                DISCRIMINATOR,
                "discriminator column declared explicitly",
            ));
        }
        if cls.inheritance.is_some() {
            return Err(Error::Configuration(format!(
                "{} already derives from another entity",
                cls.name
            )));
        }

        self.logger.log(&format!(
            "Making polymorphic {}: {}",
            cls.name,
            identities.join(" ")
        ));

        let mut root = base.bind(cls);
        let discriminator = FieldDef::new(
            DISCRIMINATOR,
            FieldType::enum_type(format!("{}{DISCRIMINATOR}", root.table), identities.clone()),
        )
        .with_default(DefaultValue::String(top.clone()));
        root.fields.push(discriminator);
        root.polymorphic = Some(PolymorphicDef {
            discriminator: DISCRIMINATOR.to_string(),
            identities,
        });
        root.identity = Some(top);
        self.register(root)
    }

    /// Register `derived` as a concrete member of the hierarchy below `parent`.
    ///
    /// `identity` defaults to the derived entity's name and must be one of the
    /// root's identities. Single-table members share the parent's table;
    /// joined-table members get an own table whose primary key references the
    /// parent's.
    pub fn derive_model(
        &mut self,
        parent: &str,
        mut derived: EntityDef,
        identity: Option<&str>,
        strategy: StorageStrategy,
    ) -> Result<&EntityDef> {
        let lineage = self.lineage(parent)?;
        let root = lineage[lineage.len() - 1];
        let Some(polymorphic) = &root.polymorphic else {
            return Err(Error::Configuration(format!(
                "{parent} is not part of a polymorphic hierarchy"
            )));
        };
        if derived.inheritance.is_some() || derived.polymorphic.is_some() {
            return Err(Error::Configuration(format!(
                "{} is already part of a hierarchy",
                derived.name
            )));
        }

        let identity = identity.unwrap_or(derived.name.as_str()).to_string();
        if !polymorphic.identities.contains(&identity) {
            return Err(Error::InvalidIdentity {
                root: root.name.clone(),
                identity,
                allowed: polymorphic.identities.clone(),
            });
        }
        let root_name = root.name.clone();
        if let Some(bound) = self
            .entities
            .values()
            .find(|e| {
                e.identity.as_deref() == Some(identity.as_str()) && self.is_a(&e.name, &root_name)
            })
        {
            return Err(Error::ambiguous(
                &derived.name,
                &identity,
                format!("identity already bound to {}", bound.name),
            ));
        }

        let parent_def = lineage[0];
        let parent_table = parent_def.table.clone();
        let inherited_delay = parent_def.delay_save;
        for field in &derived.fields {
            if field.name == PRIMARY_KEY {
                return Err(Error::ambiguous(
                    &derived.name,
                    PRIMARY_KEY,
                    "derived entities inherit their primary key",
                ));
            }
            self.ensure_member_free(parent, &field.name)?;
        }

        match strategy {
            StorageStrategy::SingleTable => {
                self.logger.log(&format!(
                    "Derive model {} < {parent} (single table: {parent_table})",
                    derived.name
                ));
                derived.table = parent_table;
            }
            StorageStrategy::JoinedTable => {
                self.logger.log(&format!(
                    "Derive model {} < {parent} (joined table: {}.id -> {parent_table}.id)",
                    derived.name, derived.table
                ));
                let mut key = FieldDef::foreign_key(PRIMARY_KEY, parent_table, false);
                key.primary_key = true;
                derived.fields.insert(0, key);
            }
        }

        derived.inheritance = Some(InheritanceDef {
            parent: parent.to_string(),
            strategy,
        });
        derived.identity = Some(identity);
        derived.delay_save |= inherited_delay;
        self.register(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityRole;

    fn builder() -> SchemaBuilder {
        let mut builder = SchemaBuilder::new();
        let base = BaseModel::new();
        builder
            .make_polymorphic_top(
                &base,
                EntityDef::new("User").with_field(FieldDef::new("email", FieldType::string(30))),
                "User Employee Manager".split_whitespace(),
            )
            .unwrap();
        builder
    }

    #[test]
    fn test_polymorphic_top() {
        let builder = builder();
        let user = builder.entity("User").unwrap();

        assert_eq!(user.role(), EntityRole::Root);
        assert_eq!(user.identity.as_deref(), Some("User"));
        assert!(user.has_primary_key());
        let discriminator = user.get_field(DISCRIMINATOR).unwrap();
        assert_eq!(
            discriminator.default,
            Some(DefaultValue::String("User".into()))
        );
        assert!(matches!(
            &discriminator.field_type,
            FieldType::Enum { variants, .. } if variants.len() == 3
        ));
    }

    #[test]
    fn test_empty_and_duplicate_identities() {
        let mut builder = SchemaBuilder::new();
        let base = BaseModel::new();
        let err = builder
            .make_polymorphic_top(&base, EntityDef::new("Thing"), Vec::<String>::new())
            .unwrap_err();
        assert!(err.is_configuration());

        let err = builder
            .make_polymorphic_top(&base, EntityDef::new("Thing"), ["A", "B", "A"])
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("twice")));
    }

    #[test]
    fn test_single_table_derivation() {
        let mut builder = builder();
        let employee = builder
            .derive_model(
                "User",
                EntityDef::new("Employee")
                    .with_field(FieldDef::optional("salary", FieldType::money())),
                None,
                StorageStrategy::SingleTable,
            )
            .unwrap();

        assert_eq!(employee.table, "user");
        assert_eq!(employee.identity.as_deref(), Some("Employee"));
        assert!(!employee.has_primary_key());
        assert!(!employee.owns_table());
    }

    #[test]
    fn test_joined_table_derivation() {
        let mut builder = builder();
        builder
            .derive_model("User", EntityDef::new("Employee"), None, StorageStrategy::SingleTable)
            .unwrap();
        let manager = builder
            .derive_model(
                "Employee",
                EntityDef::new("Manager")
                    .with_field(FieldDef::optional("bonus", FieldType::money())),
                None,
                StorageStrategy::JoinedTable,
            )
            .unwrap();

        assert_eq!(manager.table, "manager");
        let key = manager.get_field("id").unwrap();
        assert!(key.primary_key);
        assert_eq!(key.references.as_ref().unwrap().table, "user");
    }

    #[test]
    fn test_invalid_identity() {
        let mut builder = builder();
        let err = builder
            .derive_model("User", EntityDef::new("Contractor"), None, StorageStrategy::SingleTable)
            .unwrap_err();
        match err {
            Error::InvalidIdentity {
                root,
                identity,
                allowed,
            } => {
                assert_eq!(root, "User");
                assert_eq!(identity, "Contractor");
                assert_eq!(allowed, vec!["User", "Employee", "Manager"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_identity_bound_once() {
        let mut builder = builder();
        builder
            .derive_model("User", EntityDef::new("Employee"), None, StorageStrategy::SingleTable)
            .unwrap();
        let err = builder
            .derive_model(
                "User",
                EntityDef::new("Staff"),
                Some("Employee"),
                StorageStrategy::SingleTable,
            )
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousReference { .. }));
    }

    #[test]
    fn test_non_polymorphic_parent() {
        let mut builder = builder();
        builder.add_entity(EntityDef::new("Company")).unwrap();
        let err = builder
            .derive_model("Company", EntityDef::new("Startup"), None, StorageStrategy::SingleTable)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_derived_column_collision() {
        let mut builder = builder();
        let err = builder
            .derive_model(
                "User",
                EntityDef::new("Employee").with_field(FieldDef::new("email", FieldType::text())),
                None,
                StorageStrategy::SingleTable,
            )
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousReference { .. }));
    }
}
