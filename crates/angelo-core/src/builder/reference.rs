//! One-to-many and one-to-one references.

use super::SchemaBuilder;
use crate::catalog::{
    AccessorDef, Cardinality, CascadePolicy, DefaultValue, DeleteBehavior, FieldDef, RelationDef,
    Side,
};
use crate::error::{Error, Result};
use crate::naming::Naming;

/// Length of the conventional prefix of lookup tables (`enum_status` → `status`).
pub const ENUM_PREFIX_LEN: usize = 5;

/// Optional arguments of a reference directive.
#[derive(Debug, Clone)]
pub struct ReferenceOptions {
    name: Option<String>,
    rev_name: Option<String>,
    nullable: Option<bool>,
    default: Option<i64>,
    rev_cascade: Option<String>,
    add_backref: bool,
    on_delete: Option<DeleteBehavior>,
}

impl ReferenceOptions {
    /// Defaults: names derived from the entities, non-null key, back-reference added.
    pub fn new() -> Self {
        Self {
            name: None,
            rev_name: None,
            nullable: None,
            default: None,
            rev_cascade: None,
            add_backref: true,
            on_delete: None,
        }
    }

    /// Name of the forward accessor; the foreign key becomes `<name>_id`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name of the back-reference on the peer.
    pub fn with_rev_name(mut self, rev_name: impl Into<String>) -> Self {
        self.rev_name = Some(rev_name.into());
        self
    }

    /// Whether the foreign key may be null.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Default value of the foreign key.
    pub fn with_default(mut self, default: i64) -> Self {
        self.default = Some(default);
        self
    }

    /// Cascade directives of the back-reference.
    pub fn with_rev_cascade(mut self, cascade: impl Into<String>) -> Self {
        self.rev_cascade = Some(cascade.into());
        self
    }

    /// Don't add a back-reference to the peer.
    pub fn without_backref(mut self) -> Self {
        self.add_backref = false;
        self
    }

    /// Force the delete behavior instead of deriving it from the cascade.
    pub(crate) fn with_on_delete(mut self, on_delete: DeleteBehavior) -> Self {
        self.on_delete = Some(on_delete);
        self
    }
}

impl Default for ReferenceOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Many `owner`s point to one `peer`.
    ///
    /// Adds `<name>_id` and the forward accessor `<name>` to the owner, and
    /// unless disabled the collection `<rev_name>` to the peer. `name`
    /// defaults to the peer's API name, `rev_name` to the owner's plural.
    pub fn add_reference(
        &mut self,
        owner: &str,
        peer: &str,
        options: ReferenceOptions,
    ) -> Result<RelationDef> {
        self.add_foreign_key_reference(Cardinality::OneToMany, owner, peer, options)
    }

    /// One `owner` points to one `peer`; the back-reference yields at most one
    /// instance and is named after the owner's API name by default.
    pub fn add_single_reference(
        &mut self,
        owner: &str,
        peer: &str,
        options: ReferenceOptions,
    ) -> Result<RelationDef> {
        self.add_foreign_key_reference(Cardinality::OneToOne, owner, peer, options)
    }

    /// Nullable reference to a lookup table; the name drops the table's
    /// `enum_` style prefix.
    pub fn add_enum_reference(
        &mut self,
        owner: &str,
        peer: &str,
        mut options: ReferenceOptions,
    ) -> Result<RelationDef> {
        if options.nullable.is_none() {
            options.nullable = Some(true);
        }
        if options.name.is_none() {
            let table = &self.require(peer)?.table;
            let short = table
                .get(ENUM_PREFIX_LEN..)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "table {table} of {peer} is too short for an enum reference"
                    ))
                })?;
            options.name = Some(short.to_string());
        }
        self.add_foreign_key_reference(Cardinality::OneToMany, owner, peer, options)
    }

    pub(super) fn add_foreign_key_reference(
        &mut self,
        cardinality: Cardinality,
        owner: &str,
        peer: &str,
        options: ReferenceOptions,
    ) -> Result<RelationDef> {
        let owner_def = self.require(owner)?;
        let peer_def = self.require(peer)?;
        if peer_def.table.is_empty() {
            return Err(Error::Configuration(format!(
                "{peer} has no resolvable table name"
            )));
        }

        let name = options.name.clone().unwrap_or_else(|| peer_def.api());
        let foreign_key = format!("{name}_id");
        let id = format!("{owner}.{name}");

        if let Some(existing) = self.relations.get(&id) {
            if existing.peer == peer && existing.foreign_key.as_deref() == Some(&foreign_key) {
                self.logger
                    .log(&format!("Reference {id} -> {peer} already declared"));
                return Ok(existing.clone());
            }
            return Err(Error::ambiguous(
                owner,
                &name,
                format!("already references {}", existing.peer),
            ));
        }

        let rev_name = match (&options.rev_name, options.add_backref) {
            (_, false) => None,
            (Some(rev_name), true) => Some(rev_name.clone()),
            (None, true) => Some(match cardinality {
                Cardinality::OneToOne => owner_def.api(),
                _ => owner_def.plural(self.naming.inflector()),
            }),
        };
        let peer_table = peer_def.table.clone();

        self.ensure_member_free(owner, &foreign_key)?;
        self.ensure_member_free(owner, &name)?;
        if let Some(rev_name) = &rev_name {
            self.ensure_member_free(peer, rev_name)?;
            if owner == peer && *rev_name == name {
                return Err(Error::ambiguous(
                    peer,
                    rev_name,
                    "back-reference shadows the forward accessor",
                ));
            }
        }

        let cascade = match &options.rev_cascade {
            Some(spec) => CascadePolicy::parse(spec)?,
            None => self.default_cascade.clone(),
        };
        let nullable = options.nullable.unwrap_or(false);
        let on_delete = options.on_delete.unwrap_or(match rev_name {
            Some(_) if cascade.deletes() => DeleteBehavior::Cascade,
            _ if nullable => DeleteBehavior::SetNull,
            _ => DeleteBehavior::Restrict,
        });

        let mut relation =
            RelationDef::reference(cardinality, owner, peer, &foreign_key, &name)
                .with_key_options(nullable, options.default)
                .with_on_delete(on_delete);
        if let Some(rev_name) = &rev_name {
            relation = relation.with_backref(rev_name, cascade);
        }

        let mut key = FieldDef::foreign_key(&foreign_key, peer_table, nullable);
        if let Some(default) = options.default {
            key = key.with_default(DefaultValue::Int(default));
        }

        let owner_def = self.require_mut(owner)?;
        owner_def.fields.push(key);
        owner_def.accessors.push(AccessorDef {
            name: name.clone(),
            relation: id.clone(),
            side: Side::Owner,
        });
        if let Some(rev_name) = &rev_name {
            self.require_mut(peer)?.accessors.push(AccessorDef {
                name: rev_name.clone(),
                relation: id.clone(),
                side: Side::Peer,
            });
        }

        self.logger.log(&format!(
            "Referencing {owner}.{name} -> {peer}{}",
            rev_name
                .as_deref()
                .map(|r| format!(" (back: {peer}.{r})"))
                .unwrap_or_default()
        ));
        self.relations.insert(id, relation.clone());
        Ok(relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldType};

    fn builder() -> SchemaBuilder {
        let mut builder = SchemaBuilder::new();
        builder
            .add_entity(
                EntityDef::new("Company").with_field(FieldDef::new("name", FieldType::string(30))),
            )
            .unwrap();
        builder
            .add_entity(
                EntityDef::new("Worker").with_field(FieldDef::new("name", FieldType::text())),
            )
            .unwrap();
        builder
            .add_entity(
                EntityDef::new("EnumStatus").with_field(FieldDef::new("label", FieldType::text())),
            )
            .unwrap();
        builder
    }

    #[test]
    fn test_default_names() {
        let mut builder = builder();
        let rel = builder
            .add_reference("Worker", "Company", ReferenceOptions::new())
            .unwrap();

        assert_eq!(rel.id, "Worker.company");
        assert_eq!(rel.foreign_key.as_deref(), Some("company_id"));
        assert_eq!(rel.backref.as_deref(), Some("workers"));
        assert_eq!(rel.cascade.to_string(), "save-update, merge, delete");
        assert_eq!(rel.on_delete, DeleteBehavior::Cascade);

        let worker = builder.entity("Worker").unwrap();
        let key = worker.get_field("company_id").unwrap();
        assert!(key.required);
        assert_eq!(key.references.as_ref().unwrap().table, "company");
        assert!(worker.get_accessor("company").is_some());
        assert!(builder.entity("Company").unwrap().get_accessor("workers").is_some());
    }

    #[test]
    fn test_reference_is_idempotent() {
        let mut builder = builder();
        builder
            .add_reference("Worker", "Company", ReferenceOptions::new())
            .unwrap();
        builder
            .add_reference("Worker", "Company", ReferenceOptions::new())
            .unwrap();

        let worker = builder.entity("Worker").unwrap();
        assert_eq!(
            worker.fields.iter().filter(|f| f.name == "company_id").count(),
            1
        );
        let company = builder.entity("Company").unwrap();
        assert_eq!(company.accessors.len(), 1);
    }

    #[test]
    fn test_rev_name_collision() {
        let mut builder = builder();
        let err = builder
            .add_reference(
                "Worker",
                "Company",
                ReferenceOptions::new().with_rev_name("name"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousReference { ref name, .. } if name == "name"));
        assert!(builder.entity("Worker").unwrap().get_field("company_id").is_none());
    }

    #[test]
    fn test_name_reused_for_other_peer() {
        let mut builder = builder();
        builder
            .add_reference(
                "Worker",
                "Company",
                ReferenceOptions::new().with_name("employer"),
            )
            .unwrap();
        let err = builder
            .add_reference(
                "Worker",
                "EnumStatus",
                ReferenceOptions::new().with_name("employer"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousReference { .. }));
    }

    #[test]
    fn test_single_reference() {
        let mut builder = builder();
        let rel = builder
            .add_single_reference("Worker", "Company", ReferenceOptions::new().with_name("owned"))
            .unwrap();

        assert_eq!(rel.cardinality, Cardinality::OneToOne);
        assert_eq!(rel.backref.as_deref(), Some("worker"));
        assert!(!rel.is_collection(Side::Peer));
    }

    #[test]
    fn test_enum_reference() {
        let mut builder = builder();
        let rel = builder
            .add_enum_reference("Worker", "EnumStatus", ReferenceOptions::new())
            .unwrap();

        assert_eq!(rel.forward, "status");
        assert_eq!(rel.foreign_key.as_deref(), Some("status_id"));
        assert!(rel.nullable);
        assert!(!builder
            .entity("Worker")
            .unwrap()
            .get_field("status_id")
            .unwrap()
            .required);
    }

    #[test]
    fn test_enum_reference_short_table() {
        let mut builder = builder();
        builder.add_entity(EntityDef::new("Tag")).unwrap();
        let err = builder
            .add_enum_reference("Worker", "Tag", ReferenceOptions::new())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unregistered_peer() {
        let mut builder = builder();
        let err = builder
            .add_reference("Worker", "Ghost", ReferenceOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_without_backref_nullable() {
        let mut builder = builder();
        let rel = builder
            .add_reference(
                "Worker",
                "Company",
                ReferenceOptions::new()
                    .without_backref()
                    .with_nullable(true)
                    .with_default(1),
            )
            .unwrap();

        assert!(rel.backref.is_none());
        assert_eq!(rel.on_delete, DeleteBehavior::SetNull);
        let key = builder.entity("Worker").unwrap().get_field("company_id").unwrap().clone();
        assert_eq!(key.default, Some(DefaultValue::Int(1)));
        assert!(builder.entity("Company").unwrap().accessors.is_empty());
    }

    #[test]
    fn test_self_reference() {
        let mut builder = builder();
        let rel = builder
            .add_reference(
                "Worker",
                "Worker",
                ReferenceOptions::new()
                    .with_name("mentor")
                    .with_rev_name("mentees")
                    .with_nullable(true)
                    .with_rev_cascade("save-update"),
            )
            .unwrap();
        assert_eq!(rel.on_delete, DeleteBehavior::SetNull);
    }
}
