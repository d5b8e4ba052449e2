//! Unit of work over a [`Store`].
//!
//! A session stages puts and deletes in memory, answers reads from the
//! staged state first, and hands everything to the store as one batch on
//! [`Session::commit`].

use super::cascade::{CascadeExecutor, CascadeResult};
use super::{Row, Store, WriteBatch};
use crate::catalog::{
    Cardinality, DefaultValue, FieldDef, FieldType, ScalarType, Schema, PRIMARY_KEY,
};
use crate::error::{Error, PersistenceError, Result};
use crate::instance::Instance;
use crate::logging::Logger;
use crate::value::Value;
use std::collections::btree_map::Range;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// `(table or entity, id)`.
type RowKey = (String, i64);

#[derive(Debug, Clone)]
enum Pending {
    Put(Row),
    Delete,
}

/// Staged changes of a session, restorable after a failed bulk operation.
#[derive(Clone)]
struct Snapshot {
    pending: BTreeMap<RowKey, Pending>,
    next_ids: HashMap<String, i64>,
    new: BTreeSet<RowKey>,
    dirty: BTreeSet<RowKey>,
    deleted: BTreeSet<RowKey>,
}

/// Session-scoped unit of work.
pub struct Session {
    schema: Arc<Schema>,
    store: Arc<dyn Store>,
    logger: Arc<dyn Logger>,
    /// Staged row writes keyed by `(table, id)`.
    pending: BTreeMap<RowKey, Pending>,
    /// Next primary key per root table.
    next_ids: HashMap<String, i64>,
    /// Instances keyed by `(entity, id)`.
    new: BTreeSet<RowKey>,
    dirty: BTreeSet<RowKey>,
    deleted: BTreeSet<RowKey>,
}

impl Session {
    /// Create a session over a store.
    pub fn new(schema: Arc<Schema>, store: Arc<dyn Store>, logger: Arc<dyn Logger>) -> Self {
        Self {
            schema,
            store,
            logger,
            pending: BTreeMap::new(),
            next_ids: HashMap::new(),
            new: BTreeSet::new(),
            dirty: BTreeSet::new(),
            deleted: BTreeSet::new(),
        }
    }

    /// Schema the session operates on.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Whether anything is staged.
    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Instances added since the last commit.
    pub fn new_instances(&self) -> Vec<(String, i64)> {
        self.new.iter().cloned().collect()
    }

    /// Stored instances modified since the last commit.
    pub fn dirty_instances(&self) -> Vec<(String, i64)> {
        self.dirty.iter().cloned().collect()
    }

    /// Stored instances deleted since the last commit.
    pub fn deleted_instances(&self) -> Vec<(String, i64)> {
        self.deleted.iter().cloned().collect()
    }

    /// Create every table of the schema.
    pub fn create_all(&self) -> Result<()> {
        self.store.create_tables(&self.schema.tables())?;
        Ok(())
    }

    /// Drop every table of the schema, discarding staged changes.
    pub fn drop_all(&mut self) -> Result<()> {
        self.reset();
        self.store.drop_tables(&self.schema.tables())?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Look up an instance by primary key.
    ///
    /// For a polymorphic entity the instance is returned as its concrete
    /// type, and rows of other branches of the hierarchy are not found.
    pub fn get(&self, entity: &str, id: i64) -> Result<Option<Instance>> {
        let table = self.schema.root_table(entity)?;
        match self.read_row(table, id)? {
            Some(row) => self.materialize(entity, id, row),
            None => Ok(None),
        }
    }

    /// Look up an instance that must exist.
    pub fn require(&self, entity: &str, id: i64) -> Result<Instance> {
        self.get(entity, id)?.ok_or_else(|| {
            PersistenceError::NotFound {
                entity: entity.to_string(),
                id,
            }
            .into()
        })
    }

    /// Every instance of an entity and its descendants, by primary key.
    pub fn all(&self, entity: &str) -> Result<Vec<Instance>> {
        let table = self.schema.root_table(entity)?;
        let mut instances = Vec::new();
        for (id, row) in self.scan_rows(table)? {
            if let Some(instance) = self.materialize(entity, id, row)? {
                instances.push(instance);
            }
        }
        Ok(instances)
    }

    /// Every instance whose `field` equals `value`.
    pub fn all_by(&self, entity: &str, field: &str, value: &Value) -> Result<Vec<Instance>> {
        if self.schema.field(entity, field)?.is_none() {
            return Err(Error::UnknownAttribute {
                entity: entity.to_string(),
                attribute: field.to_string(),
            });
        }
        Ok(self
            .all(entity)?
            .into_iter()
            .filter(|instance| instance.value(field).same_as(value))
            .collect())
    }

    /// The instance whose `field` equals `value`, if any; more than one is an error.
    pub fn get_by(&self, entity: &str, field: &str, value: &Value) -> Result<Option<Instance>> {
        let mut found = self.all_by(entity, field, value)?;
        match found.len() {
            0 | 1 => Ok(found.pop()),
            count => Err(PersistenceError::MultipleResults {
                entity: entity.to_string(),
                field: field.to_string(),
                count,
            }
            .into()),
        }
    }

    /// The single instance whose `field` equals `value`.
    pub fn get_one_by(&self, entity: &str, field: &str, value: &Value) -> Result<Instance> {
        self.get_by(entity, field, value)?.ok_or_else(|| {
            PersistenceError::NoResult {
                entity: entity.to_string(),
                field: field.to_string(),
                value: value.to_string(),
            }
            .into()
        })
    }

    /// Every instance except the one with primary key `id`.
    pub fn others(&self, entity: &str, id: i64) -> Result<Vec<Instance>> {
        Ok(self
            .all(entity)?
            .into_iter()
            .filter(|instance| instance.id() != Some(id))
            .collect())
    }

    /// Highest primary key in use by the hierarchy `entity` belongs to.
    pub fn max_id(&self, entity: &str) -> Result<Option<i64>> {
        let table = self.schema.root_table(entity)?;
        Ok(self.scan_rows(table)?.keys().next_back().copied())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Stage an instance for insertion or, if its row exists, for update.
    ///
    /// Missing fields take their defaults, the discriminator is forced to
    /// the entity's identity and the instance is refreshed with the stored
    /// values, including a newly assigned primary key.
    pub fn add(&mut self, instance: &mut Instance) -> Result<i64> {
        let entity = instance.entity().to_string();
        let table = self.schema.root_table(&entity)?.to_string();

        let (id, values, is_new) = match instance.id() {
            Some(id) if self.read_row(&table, id)?.is_some() => {
                let current = self.get(&entity, id)?.ok_or_else(|| {
                    PersistenceError::Constraint(format!("{table} {id} is not a {entity}"))
                })?;
                let mut values = current.values().clone();
                values.extend(
                    instance
                        .values()
                        .iter()
                        .map(|(name, value)| (name.clone(), value.clone())),
                );
                (id, values, false)
            }
            Some(id) => (id, instance.values().clone(), true),
            None => (self.allocate_id(&table)?, instance.values().clone(), true),
        };

        let values = self.stage(&entity, id, values, is_new)?;
        instance.replace_values(values);
        Ok(id)
    }

    /// Stage raw rows for insertion, bypassing instance construction.
    ///
    /// Rows without a primary key get consecutive ones after the current
    /// maximum, in input order. Nothing is staged if any row is rejected.
    pub fn insert_rows(&mut self, entity: &str, rows: Vec<Row>) -> Result<Vec<i64>> {
        let snapshot = self.snapshot();
        match self.insert_rows_inner(entity, rows) {
            Ok(ids) => Ok(ids),
            Err(e) => {
                self.restore(snapshot);
                Err(e)
            }
        }
    }

    fn insert_rows_inner(&mut self, entity: &str, rows: Vec<Row>) -> Result<Vec<i64>> {
        let table = self.schema.root_table(entity)?.to_string();
        let mut ids = Vec::with_capacity(rows.len());
        for mut row in rows {
            let id = match row.remove(PRIMARY_KEY) {
                Some(value) if !value.is_null() => {
                    let id = value.as_i64().ok_or_else(|| {
                        PersistenceError::Constraint(format!(
                            "{entity}.{PRIMARY_KEY} must be an integer, got {value}"
                        ))
                    })?;
                    if self.read_row(&table, id)?.is_some() {
                        return Err(PersistenceError::Constraint(format!(
                            "duplicate primary key {table} {id}"
                        ))
                        .into());
                    }
                    id
                }
                _ => self.allocate_id(&table)?,
            };
            self.stage(entity, id, row, true)?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Stage the deletion of an instance and everything its removal cascades to.
    pub fn delete(&mut self, instance: &Instance) -> Result<CascadeResult> {
        let id = instance.id().ok_or_else(|| {
            PersistenceError::Constraint(format!("{instance} has never been added"))
        })?;
        let target = self.require(instance.entity(), id)?;
        let result = CascadeExecutor::new(self).process_delete(target.entity(), id)?;

        for (entity, row_id, field) in &result.nullified_fields {
            let table = self.schema.table_of(entity, field)?.to_string();
            if let Some(mut row) = self.read_row(&table, *row_id)? {
                row.insert(field.clone(), Value::Null);
                self.pending.insert((table, *row_id), Pending::Put(row));
                self.mark_dirty(entity, *row_id);
            }
        }
        for (entity, row_id) in &result.deleted_entities {
            self.stage_delete(entity, *row_id)?;
        }
        self.stage_delete(target.entity(), id)?;

        tracing::debug!(
            entity = target.entity(),
            id,
            affected = result.affected_count(),
            "staged delete"
        );
        Ok(result)
    }

    /// Write all staged changes to the store in one batch.
    ///
    /// Staged changes are kept if the store rejects the batch, so the
    /// caller can inspect them or [`Session::rollback`].
    pub fn commit(&mut self) -> Result<()> {
        self.logger.log(&format!("DIRTY: {}", Keys(&self.dirty)));
        self.logger.log(&format!("NEW: {}", Keys(&self.new)));
        self.logger.log(&format!("DELETED: {}", Keys(&self.deleted)));

        let mut batch = WriteBatch::new();
        for ((table, id), pending) in &self.pending {
            match pending {
                Pending::Put(row) => batch.put(table.clone(), *id, row.clone()),
                Pending::Delete => batch.delete(table.clone(), *id),
            }
        }
        let writes = batch.len();
        if !batch.is_empty() {
            self.store.apply(batch)?;
        }

        tracing::debug!(
            writes,
            new = self.new.len(),
            dirty = self.dirty.len(),
            deleted = self.deleted.len(),
            "session committed"
        );
        self.reset();
        Ok(())
    }

    /// Discard all staged changes.
    pub fn rollback(&mut self) {
        if self.has_changes() {
            self.logger
                .log(&format!("Rolling back {} staged writes", self.pending.len()));
        }
        self.reset();
    }

    /// Flush committed data to disk.
    pub fn flush(&self) -> Result<()> {
        self.store.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Row level
    // ------------------------------------------------------------------

    /// Read a row, staged state first.
    pub(crate) fn read_row(&self, table: &str, id: i64) -> Result<Option<Row>, PersistenceError> {
        match self.pending.get(&(table.to_string(), id)) {
            Some(Pending::Put(row)) => Ok(Some(row.clone())),
            Some(Pending::Delete) => Ok(None),
            None => self.store.read(table, id),
        }
    }

    /// Read all rows of a table, staged state first.
    pub(crate) fn scan_rows(&self, table: &str) -> Result<BTreeMap<i64, Row>, PersistenceError> {
        let mut rows: BTreeMap<i64, Row> = self.store.scan(table)?.into_iter().collect();
        for ((_, id), pending) in self.pending_in(table) {
            match pending {
                Pending::Put(row) => {
                    rows.insert(*id, row.clone());
                }
                Pending::Delete => {
                    rows.remove(id);
                }
            }
        }
        Ok(rows)
    }

    fn pending_in(&self, table: &str) -> Range<'_, RowKey, Pending> {
        self.pending
            .range((table.to_string(), i64::MIN)..=(table.to_string(), i64::MAX))
    }

    /// Build the instance stored under `id`, or `None` if the row belongs
    /// to an entity outside `entity`'s branch of the hierarchy.
    fn materialize(&self, entity: &str, id: i64, root_row: Row) -> Result<Option<Instance>> {
        let concrete = match self.schema.polymorphism(entity)? {
            Some(polymorphic) => {
                let root = self.schema.root(entity)?;
                let concrete = root_row
                    .get(&polymorphic.discriminator)
                    .and_then(Value::as_str)
                    .and_then(|identity| self.schema.entity_for_identity(&root.name, identity))
                    .unwrap_or(root);
                if !self.schema.is_a(&concrete.name, entity) {
                    return Ok(None);
                }
                concrete
            }
            None => self.schema.entity(entity)?,
        };

        let mut merged = root_row;
        for part in self.schema.layout(&concrete.name)?.iter().skip(1) {
            if let Some(row) = self.read_row(part.table, id)? {
                merged.extend(row);
            }
        }
        let values = self
            .schema
            .fields(&concrete.name)?
            .into_iter()
            .map(|f| (f.name.clone(), merged.remove(&f.name).unwrap_or(Value::Null)))
            .collect();

        Ok(Some(Instance::from_parts(
            &concrete.name,
            values,
            concrete.delay_save,
        )))
    }

    fn allocate_id(&mut self, table: &str) -> Result<i64> {
        let stored = self.store.max_id(table)?;
        let staged = self.pending_in(table).next_back().map(|((_, id), _)| *id);
        let exhausted = || -> Error {
            PersistenceError::Constraint(format!("primary key space of {table} exhausted")).into()
        };
        let floor = match stored.max(staged) {
            Some(max) => max.checked_add(1).ok_or_else(exhausted)?,
            None => 1,
        };
        let next = self
            .next_ids
            .get(table)
            .map_or(floor, |&next| next.max(floor));
        let after = next.checked_add(1).ok_or_else(exhausted)?;
        self.next_ids.insert(table.to_string(), after);
        Ok(next)
    }

    /// Validate `values` against the entity and stage one row per table.
    fn stage(&mut self, entity: &str, id: i64, mut values: Row, is_new: bool) -> Result<Row> {
        let schema = Arc::clone(&self.schema);
        let def = schema.entity(entity)?;
        let fields = schema.fields(entity)?;

        if let Some(unknown) = values
            .keys()
            .find(|name| !fields.iter().any(|f| &f.name == *name))
        {
            return Err(Error::UnknownAttribute {
                entity: entity.to_string(),
                attribute: unknown.clone(),
            });
        }

        values.insert(PRIMARY_KEY.to_string(), Value::Int64(id));
        if let (Some(polymorphic), Some(identity)) = (schema.polymorphism(entity)?, &def.identity) {
            values.insert(
                polymorphic.discriminator.clone(),
                Value::String(identity.clone()),
            );
        }

        for field in &fields {
            let value = match values.remove(&field.name) {
                Some(value) => value,
                None if is_new => field
                    .default
                    .as_ref()
                    .map_or(Value::Null, DefaultValue::to_value),
                None => Value::Null,
            };
            let value = self.check_field(&schema, entity, id, field, value)?;
            values.insert(field.name.clone(), value);
        }

        for part in schema.layout(entity)? {
            let row: Row = part
                .fields
                .iter()
                .map(|f| {
                    (
                        f.name.clone(),
                        values.get(&f.name).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect();
            self.pending
                .insert((part.table.to_string(), id), Pending::Put(row));
        }

        if is_new {
            self.new.insert((entity.to_string(), id));
        } else {
            self.mark_dirty(entity, id);
        }
        tracing::debug!(entity, id, new = is_new, "staged instance");
        Ok(values)
    }

    fn check_field(
        &self,
        schema: &Schema,
        entity: &str,
        id: i64,
        field: &FieldDef,
        value: Value,
    ) -> Result<Value> {
        if field.primary_key {
            return Ok(value);
        }
        let value = coerce(&field.field_type, value);
        if value.is_null() {
            if field.required {
                return Err(PersistenceError::Constraint(format!(
                    "{entity}.{} may not be null",
                    field.name
                ))
                .into());
            }
            return Ok(value);
        }
        if !field.field_type.accepts(&value) {
            return Err(PersistenceError::Constraint(format!(
                "{entity}.{}: {value} does not fit {:?}",
                field.name, field.field_type
            ))
            .into());
        }

        if let Some(target) = &field.references {
            let target_id = value.as_i64().ok_or_else(|| {
                PersistenceError::Constraint(format!(
                    "{entity}.{}: {value} is not a key",
                    field.name
                ))
            })?;
            if self.read_row(&target.table, target_id)?.is_none() {
                return Err(PersistenceError::Constraint(format!(
                    "{entity}.{} references missing {} {target_id}",
                    field.name, target.table
                ))
                .into());
            }

            let one_to_one = schema.relations.values().any(|r| {
                r.cardinality == Cardinality::OneToOne
                    && r.foreign_key.as_deref() == Some(field.name.as_str())
                    && schema.is_a(entity, &r.owner)
            });
            if one_to_one {
                let table = schema.table_of(entity, &field.name)?;
                let taken = self.scan_rows(table)?.into_iter().any(|(other, row)| {
                    other != id && row.get(&field.name).is_some_and(|v| v.same_as(&value))
                });
                if taken {
                    return Err(PersistenceError::Constraint(format!(
                        "{entity}.{}: {} {target_id} is already referenced",
                        field.name, target.table
                    ))
                    .into());
                }
            }
        }
        Ok(value)
    }

    fn stage_delete(&mut self, entity: &str, id: i64) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        for part in schema.layout(entity)? {
            self.pending
                .insert((part.table.to_string(), id), Pending::Delete);
        }
        let key = (entity.to_string(), id);
        self.dirty.remove(&key);
        if !self.new.remove(&key) {
            self.deleted.insert(key);
        }
        Ok(())
    }

    fn mark_dirty(&mut self, entity: &str, id: i64) {
        let key = (entity.to_string(), id);
        if !self.new.contains(&key) {
            self.dirty.insert(key);
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            pending: self.pending.clone(),
            next_ids: self.next_ids.clone(),
            new: self.new.clone(),
            dirty: self.dirty.clone(),
            deleted: self.deleted.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.pending = snapshot.pending;
        self.next_ids = snapshot.next_ids;
        self.new = snapshot.new;
        self.dirty = snapshot.dirty;
        self.deleted = snapshot.deleted;
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.next_ids.clear();
        self.new.clear();
        self.dirty.clear();
        self.deleted.clear();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("schema_version", &self.schema.version)
            .field("pending", &self.pending.len())
            .field("new", &self.new)
            .field("dirty", &self.dirty)
            .field("deleted", &self.deleted)
            .finish()
    }
}

/// Widen integers to the column's representation.
fn coerce(field_type: &FieldType, value: Value) -> Value {
    match (field_type.scalar_type(), value) {
        (Some(ScalarType::Int64), Value::Int32(i)) => Value::Int64(i64::from(i)),
        (Some(ScalarType::Decimal { scale, .. }), Value::Int32(i)) => {
            rescale(i64::from(i), 0, *scale).unwrap_or(Value::Int32(i))
        }
        (Some(ScalarType::Decimal { scale, .. }), Value::Int64(i)) => {
            rescale(i, 0, *scale).unwrap_or(Value::Int64(i))
        }
        (Some(ScalarType::Decimal { scale, .. }), Value::Decimal { mantissa, scale: from })
            if from < *scale =>
        {
            rescale(mantissa, from, *scale).unwrap_or(Value::Decimal {
                mantissa,
                scale: from,
            })
        }
        (_, value) => value,
    }
}

fn rescale(mantissa: i64, from: u8, to: u8) -> Option<Value> {
    10i64
        .checked_pow(u32::from(to - from))
        .and_then(|factor| mantissa.checked_mul(factor))
        .map(|mantissa| Value::decimal(mantissa, to))
}

/// Renders instance keys as `[Employee 1, Group 2]`.
struct Keys<'a>(&'a BTreeSet<RowKey>);

impl fmt::Display for Keys<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (entity, id)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{entity} {id}")?;
        }
        f.write_str("]")
    }
}
