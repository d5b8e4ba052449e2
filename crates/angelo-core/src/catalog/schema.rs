//! Frozen schema: the registry of entities and relations.

use super::{AccessorDef, EntityDef, FieldDef, PolymorphicDef, RelationDef};
use crate::error::{Error, PersistenceError};
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum parent chain length before a hierarchy is considered cyclic.
const MAX_HIERARCHY_DEPTH: usize = 64;

/// An immutable snapshot of all entity and relation declarations.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Schema {
    /// Schema version (assigned by the catalog).
    pub version: u64,
    /// Entity definitions keyed by name.
    pub entities: HashMap<String, EntityDef>,
    /// Relation definitions keyed by id.
    pub relations: HashMap<String, RelationDef>,
    /// Entity names in declaration order.
    pub order: Vec<String>,
}

/// Fields stored in one table for a given entity.
#[derive(Debug, Clone)]
pub struct TableLayout<'a> {
    /// Table name.
    pub table: &'a str,
    /// Fields stored in that table.
    pub fields: Vec<&'a FieldDef>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            entities: HashMap::new(),
            relations: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Add an entity to the schema.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        if !self.entities.contains_key(&entity.name) {
            self.order.push(entity.name.clone());
        }
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Add a relation to the schema.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.insert(relation.id.clone(), relation);
        self
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Get an entity by name, failing if it is not registered.
    pub fn entity(&self, name: &str) -> Result<&EntityDef, Error> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Get a relation by id.
    pub fn get_relation(&self, id: &str) -> Option<&RelationDef> {
        self.relations.get(id)
    }

    /// List all entity names in declaration order.
    pub fn entity_names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Inheritance chain of an entity, root first and the entity itself last.
    pub fn chain(&self, name: &str) -> Result<Vec<&EntityDef>, Error> {
        let mut chain = vec![self.entity(name)?];
        while let Some(parent) = chain[chain.len() - 1].parent() {
            if chain.len() > MAX_HIERARCHY_DEPTH {
                return Err(Error::Configuration(format!(
                    "inheritance chain of {name} does not terminate"
                )));
            }
            chain.push(self.entity(parent)?);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Top of the inheritance chain (the entity itself if it has no parent).
    pub fn root(&self, name: &str) -> Result<&EntityDef, Error> {
        Ok(self.chain(name)?[0])
    }

    /// Whether `name` is `ancestor` or derives from it.
    pub fn is_a(&self, name: &str, ancestor: &str) -> bool {
        self.chain(name)
            .map(|chain| chain.iter().any(|e| e.name == ancestor))
            .unwrap_or(false)
    }

    /// All entities deriving (directly or transitively) from `name`.
    pub fn descendants(&self, name: &str) -> Vec<&EntityDef> {
        self.order
            .iter()
            .filter(|n| n.as_str() != name && self.is_a(n, name))
            .filter_map(|n| self.entities.get(n))
            .collect()
    }

    /// Discriminator setup governing an entity's rows.
    pub fn polymorphism(&self, name: &str) -> Result<Option<&PolymorphicDef>, Error> {
        Ok(self.root(name)?.polymorphic.as_ref())
    }

    /// Identities a query for `name` must match: its own and its descendants'.
    pub fn identities_of(&self, name: &str) -> Result<Vec<&str>, Error> {
        let entity = self.entity(name)?;
        let mut identities: Vec<&str> = entity.identity.iter().map(|s| s.as_str()).collect();
        for descendant in self.descendants(name) {
            if let Some(identity) = &descendant.identity {
                identities.push(identity);
            }
        }
        Ok(identities)
    }

    /// Concrete entity bound to `identity` within the hierarchy headed by `root`.
    pub fn entity_for_identity(&self, root: &str, identity: &str) -> Option<&EntityDef> {
        self.order
            .iter()
            .filter_map(|n| self.entities.get(n))
            .find(|e| e.identity.as_deref() == Some(identity) && self.is_a(&e.name, root))
    }

    /// All fields of an entity including inherited ones; the first declaration of a name wins.
    pub fn fields(&self, name: &str) -> Result<Vec<&FieldDef>, Error> {
        let mut fields: Vec<&FieldDef> = Vec::new();
        for entity in self.chain(name)? {
            for field in &entity.fields {
                if !fields.iter().any(|f| f.name == field.name) {
                    fields.push(field);
                }
            }
        }
        Ok(fields)
    }

    /// Look up a field of an entity, including inherited ones.
    pub fn field(&self, name: &str, field: &str) -> Result<Option<&FieldDef>, Error> {
        Ok(self.fields(name)?.into_iter().find(|f| f.name == field))
    }

    /// All accessors of an entity including inherited ones.
    pub fn accessors(&self, name: &str) -> Result<Vec<&AccessorDef>, Error> {
        Ok(self
            .chain(name)?
            .into_iter()
            .flat_map(|e| e.accessors.iter())
            .collect())
    }

    /// Resolve an accessor name on an entity to its relation.
    pub fn accessor(
        &self,
        name: &str,
        accessor: &str,
    ) -> Result<(&AccessorDef, &RelationDef), Error> {
        let found = self
            .accessors(name)?
            .into_iter()
            .find(|a| a.name == accessor)
            .ok_or_else(|| Error::UnknownRelationship {
                entity: name.to_string(),
                name: accessor.to_string(),
            })?;
        let relation = self.relations.get(&found.relation).ok_or_else(|| {
            Error::Configuration(format!("accessor {name}.{accessor} has no relation"))
        })?;
        Ok((found, relation))
    }

    /// How an entity's fields are spread over tables, root table first.
    pub fn layout(&self, name: &str) -> Result<Vec<TableLayout<'_>>, Error> {
        let mut layout: Vec<TableLayout<'_>> = Vec::new();
        for entity in self.chain(name)? {
            match layout.last_mut() {
                Some(last) if !entity.owns_table() => last.fields.extend(entity.fields.iter()),
                _ => layout.push(TableLayout {
                    table: &entity.table,
                    fields: entity.fields.iter().collect(),
                }),
            }
        }
        Ok(layout)
    }

    /// Table storing one field of an entity.
    pub fn table_of(&self, name: &str, field: &str) -> Result<&str, Error> {
        self.layout(name)?
            .into_iter()
            .find(|part| part.fields.iter().any(|f| f.name == field))
            .map(|part| part.table)
            .ok_or_else(|| Error::UnknownAttribute {
                entity: name.to_string(),
                attribute: field.to_string(),
            })
    }

    /// Table holding the primary key sequence of an entity.
    pub fn root_table(&self, name: &str) -> Result<&str, Error> {
        Ok(&self.root(name)?.table)
    }

    /// Every distinct table, in declaration order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for entity in self.order.iter().filter_map(|n| self.entities.get(n)) {
            if entity.owns_table() && !tables.contains(&entity.table.as_str()) {
                tables.push(&entity.table);
            }
        }
        tables
    }

    /// Foreign key relations whose peer is `name` or one of its ancestors.
    pub fn relations_to(&self, name: &str) -> Vec<&RelationDef> {
        let mut relations: Vec<&RelationDef> = self
            .relations
            .values()
            .filter(|r| r.foreign_key.is_some() && self.is_a(name, &r.peer))
            .collect();
        relations.sort_by(|a, b| a.id.cmp(&b.id));
        relations
    }

    /// All relations owned by an entity.
    pub fn relations_from(&self, name: &str) -> Vec<&RelationDef> {
        let mut relations: Vec<&RelationDef> =
            self.relations.values().filter(|r| r.owner == name).collect();
        relations.sort_by(|a, b| a.id.cmp(&b.id));
        relations
    }

    /// Whether two schemas declare the same entities and relations, ignoring versions.
    pub fn same_shape(&self, other: &Schema) -> bool {
        self.entities == other.entities && self.relations == other.relations
    }

    /// Serialize the schema to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| PersistenceError::Serialization(e.to_string()))
    }

    /// Deserialize a schema from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| PersistenceError::Deserialization(e.to_string()))
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new(0)
    }
}
