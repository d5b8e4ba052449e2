//! Schema assembly.
//!
//! A [`SchemaBuilder`] collects entity declarations, wires references,
//! cross references and polymorphic hierarchies between them, and finally
//! freezes everything into a [`Schema`]. Directives validate eagerly and
//! report collisions before touching the declarations they would extend.

mod cross;
mod polymorphic;
mod reference;

pub use cross::CrossReferenceOptions;
pub use reference::{ReferenceOptions, ENUM_PREFIX_LEN};

use crate::catalog::{
    CascadePolicy, EntityDef, FieldDef, RelationDef, Schema, PRIMARY_KEY,
};
use crate::error::{Error, Result};
use crate::logging::{Logger, TracingLogger};
use crate::naming::{Inflector, NamingResolver};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum parent chain length before a hierarchy is considered cyclic.
const MAX_HIERARCHY_DEPTH: usize = 64;

/// Storage contract shared by all entities: the primary key and instance defaults.
#[derive(Debug, Clone)]
pub struct BaseModel {
    fields: Vec<FieldDef>,
    delay_save: bool,
}

impl BaseModel {
    /// Base contract with only the generated `id` primary key.
    pub fn new() -> Self {
        Self {
            fields: vec![FieldDef::primary_key()],
            delay_save: false,
        }
    }

    /// Add a column every bound entity receives.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Make instances of bound entities defer their commits.
    pub fn with_delay_save(mut self) -> Self {
        self.delay_save = true;
        self
    }

    /// Place the base columns in front of the entity's own, skipping redeclared ones.
    pub fn bind(&self, mut entity: EntityDef) -> EntityDef {
        let mut fields: Vec<FieldDef> = self
            .fields
            .iter()
            .filter(|f| entity.get_field(&f.name).is_none())
            .cloned()
            .collect();
        fields.append(&mut entity.fields);
        entity.fields = fields;
        entity.delay_save |= self.delay_save;
        entity
    }
}

impl Default for BaseModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects declarations and produces a frozen [`Schema`].
pub struct SchemaBuilder {
    base: BaseModel,
    entities: IndexMap<String, EntityDef>,
    relations: IndexMap<String, RelationDef>,
    /// Association entity per unordered pair of participants.
    associations: HashMap<(String, String), String>,
    naming: NamingResolver,
    logger: Arc<dyn Logger>,
    default_cascade: CascadePolicy,
}

impl SchemaBuilder {
    /// Create a builder with the default base model, inflector and logger.
    pub fn new() -> Self {
        Self {
            base: BaseModel::new(),
            entities: IndexMap::new(),
            relations: IndexMap::new(),
            associations: HashMap::new(),
            naming: NamingResolver::default(),
            logger: Arc::new(TracingLogger::default()),
            default_cascade: CascadePolicy::default(),
        }
    }

    /// Use a different base model for [`SchemaBuilder::add_entity`].
    pub fn with_base(mut self, base: BaseModel) -> Self {
        self.base = base;
        self
    }

    /// Use a different pluralization service.
    pub fn with_inflector(mut self, inflector: Arc<dyn Inflector>) -> Self {
        self.naming = NamingResolver::new(inflector);
        self
    }

    /// Send diagnostics to a different logger.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Change the cascade applied to back-references that don't name one.
    pub fn with_default_cascade(mut self, cascade: &str) -> Result<Self> {
        self.default_cascade = CascadePolicy::parse(cascade)?;
        Ok(self)
    }

    /// The base model bound by [`SchemaBuilder::add_entity`].
    pub fn base(&self) -> &BaseModel {
        &self.base
    }

    /// The naming resolver used for default names.
    pub fn naming(&self) -> &NamingResolver {
        &self.naming
    }

    /// Look up a declared entity.
    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Look up a declared relation by id.
    pub fn relation(&self, id: &str) -> Option<&RelationDef> {
        self.relations.get(id)
    }

    /// Register a plain entity bound to the builder's base model.
    pub fn add_entity(&mut self, entity: EntityDef) -> Result<&EntityDef> {
        let entity = self.base.bind(entity);
        self.register(entity)
    }

    /// Validate and freeze the declarations.
    pub fn build(self) -> Result<Arc<Schema>> {
        let mut schema = Schema::new(0);
        for entity in self.entities.values() {
            if entity.owns_table() && !entity.has_primary_key() {
                return Err(Error::Configuration(format!(
                    "{} stores rows without a primary key",
                    entity.name
                )));
            }
            for field in &entity.fields {
                if let Some(target) = &field.references {
                    let resolvable = self
                        .entities
                        .values()
                        .any(|e| e.owns_table() && e.table == target.table);
                    if !resolvable {
                        return Err(Error::Configuration(format!(
                            "{}.{} references unknown table {}",
                            entity.name, field.name, target.table
                        )));
                    }
                }
            }
        }
        for entity in self.entities.into_values() {
            schema = schema.with_entity(entity);
        }
        for relation in self.relations.into_values() {
            schema = schema.with_relation(relation);
        }
        self.logger.log(&format!(
            "Schema frozen: {} entities, {} relations",
            schema.entities.len(),
            schema.relations.len()
        ));
        Ok(Arc::new(schema))
    }

    fn register(&mut self, entity: EntityDef) -> Result<&EntityDef> {
        if self.entities.contains_key(&entity.name) {
            return Err(Error::Configuration(format!(
                "entity {} is already registered",
                entity.name
            )));
        }
        if entity.table.is_empty() {
            return Err(Error::Configuration(format!(
                "entity {} has no table name",
                entity.name
            )));
        }
        if let Some(field) = entity.get_field(PRIMARY_KEY) {
            if !field.primary_key {
                return Err(Error::ambiguous(
                    &entity.name,
                    PRIMARY_KEY,
                    "declared as a plain column",
                ));
            }
        }
        if entity.owns_table() {
            if let Some(owner) = self
                .entities
                .values()
                .find(|e| e.owns_table() && e.table == entity.table)
            {
                return Err(Error::ambiguous(
                    &entity.name,
                    &entity.table,
                    format!("table already used by {}", owner.name),
                ));
            }
        }
        self.logger
            .log(&format!("Registering {} ({})", entity.name, entity.table));
        let name = entity.name.clone();
        Ok(self.entities.entry(name).or_insert(entity))
    }

    fn require(&self, name: &str) -> Result<&EntityDef> {
        self.entities.get(name).ok_or_else(|| {
            Error::Configuration(format!("entity {name} is used before it is registered"))
        })
    }

    fn require_mut(&mut self, name: &str) -> Result<&mut EntityDef> {
        self.entities.get_mut(name).ok_or_else(|| {
            Error::Configuration(format!("entity {name} is used before it is registered"))
        })
    }

    /// Entity followed by its ancestors.
    fn lineage(&self, name: &str) -> Result<Vec<&EntityDef>> {
        let mut lineage = vec![self.require(name)?];
        while let Some(parent) = lineage[lineage.len() - 1].parent() {
            if lineage.len() > MAX_HIERARCHY_DEPTH {
                return Err(Error::Configuration(format!(
                    "inheritance chain of {name} does not terminate"
                )));
            }
            lineage.push(self.require(parent)?);
        }
        Ok(lineage)
    }

    fn is_a(&self, name: &str, ancestor: &str) -> bool {
        self.lineage(name)
            .map(|l| l.iter().any(|e| e.name == ancestor))
            .unwrap_or(false)
    }

    /// Fail if `member` is already a field or accessor visible on `entity`,
    /// whether declared there, inherited, or declared on a descendant.
    fn ensure_member_free(&self, entity: &str, member: &str) -> Result<()> {
        let related = self
            .entities
            .values()
            .filter(|e| self.is_a(entity, &e.name) || self.is_a(&e.name, entity));
        for candidate in related {
            if candidate.get_field(member).is_some() {
                return Err(Error::ambiguous(
                    entity,
                    member,
                    format!("collides with column {}.{member}", candidate.name),
                ));
            }
            if candidate.get_accessor(member).is_some() {
                return Err(Error::ambiguous(
                    entity,
                    member,
                    format!("collides with relationship {}.{member}", candidate.name),
                ));
            }
        }
        Ok(())
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("default_cascade", &self.default_cascade.to_string())
            .finish_non_exhaustive()
    }
}
