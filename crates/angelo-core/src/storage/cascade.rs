//! Cascade executor for handling referential integrity on deletes.
//!
//! Every foreign key relation carries a [`DeleteBehavior`]:
//! - CASCADE: delete referencing instances recursively
//! - RESTRICT: refuse the delete while references exist
//! - SET NULL: clear the foreign key on referencing instances
//!
//! Association rows of many-to-many relations are ordinary referencing
//! rows here; their behavior comes from the association's delete policy.

use std::collections::HashSet;

use super::Session;
use crate::catalog::DeleteBehavior;
use crate::error::{PersistenceError, Result};
use crate::instance::Instance;
use crate::value::Value;

/// Maximum cascade depth to prevent infinite recursion.
const MAX_CASCADE_DEPTH: usize = 100;

/// Result of a cascade operation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CascadeResult {
    /// Instances deleted along with the target, as `(entity, id)`.
    pub deleted_entities: Vec<(String, i64)>,
    /// Foreign keys set to null, as `(entity, id, field)`.
    pub nullified_fields: Vec<(String, i64, String)>,
}

impl CascadeResult {
    /// Create an empty cascade result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the total number of affected instances.
    pub fn affected_count(&self) -> usize {
        self.deleted_entities.len() + self.nullified_fields.len()
    }
}

/// Plans the effects of a delete without staging anything.
pub struct CascadeExecutor<'a> {
    session: &'a Session,
}

impl<'a> CascadeExecutor<'a> {
    /// Create a new cascade executor.
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Work out what deleting `entity` `id` implies.
    ///
    /// Deleted instances are listed dependents first. Rows that are deleted
    /// anyway are never reported as nullified.
    pub fn process_delete(&self, entity: &str, id: i64) -> Result<CascadeResult> {
        let mut result = CascadeResult::new();
        let mut visited = HashSet::new();

        self.process_delete_recursive(entity, id, &mut result, &mut visited, 0)?;

        let schema = self.session.schema();
        result.nullified_fields.retain(|(entity, id, _)| {
            schema
                .root_table(entity)
                .map(|table| !visited.contains(&(table.to_string(), *id)))
                .unwrap_or(true)
        });
        Ok(result)
    }

    /// Recursively process cascades.
    fn process_delete_recursive(
        &self,
        entity: &str,
        id: i64,
        result: &mut CascadeResult,
        visited: &mut HashSet<(String, i64)>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_CASCADE_DEPTH {
            return Err(PersistenceError::CascadeDepthExceeded { depth }.into());
        }

        let schema = self.session.schema();
        // Prevent cycles
        if !visited.insert((schema.root_table(entity)?.to_string(), id)) {
            return Ok(());
        }

        for relation in schema.relations_to(entity) {
            let Some(foreign_key) = &relation.foreign_key else {
                continue;
            };
            let referencing: Vec<Instance> = self
                .find_referencing(&relation.owner, foreign_key, id)?
                .into_iter()
                .filter(|instance| !self.is_visited(instance, visited))
                .collect();

            if referencing.is_empty() {
                continue;
            }

            match relation.on_delete {
                DeleteBehavior::Restrict => {
                    return Err(PersistenceError::Constraint(format!(
                        "cannot delete {entity} {id}: referenced by {} {} through {}",
                        referencing.len(),
                        relation.owner,
                        relation.id
                    ))
                    .into());
                }
                DeleteBehavior::Cascade => {
                    for instance in referencing {
                        if self.is_visited(&instance, visited) {
                            continue;
                        }
                        let Some(ref_id) = instance.id() else {
                            continue;
                        };
                        // Dependents of the dependent go first
                        self.process_delete_recursive(
                            instance.entity(),
                            ref_id,
                            result,
                            visited,
                            depth + 1,
                        )?;
                        result
                            .deleted_entities
                            .push((instance.entity().to_string(), ref_id));
                    }
                }
                DeleteBehavior::SetNull => {
                    for instance in referencing {
                        if let Some(ref_id) = instance.id() {
                            result.nullified_fields.push((
                                instance.entity().to_string(),
                                ref_id,
                                foreign_key.clone(),
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Find all instances of `owner` whose `field` holds `target_id`.
    fn find_referencing(&self, owner: &str, field: &str, target_id: i64) -> Result<Vec<Instance>> {
        let table = self.session.schema().table_of(owner, field)?;
        let target = Value::Int64(target_id);
        let mut referencing = Vec::new();

        for (row_id, row) in self.session.scan_rows(table)? {
            if !row.get(field).is_some_and(|value| value.same_as(&target)) {
                continue;
            }
            // The row may belong to another branch of a shared table
            if let Some(instance) = self.session.get(owner, row_id)? {
                referencing.push(instance);
            }
        }

        Ok(referencing)
    }

    fn is_visited(&self, instance: &Instance, visited: &HashSet<(String, i64)>) -> bool {
        match (self.session.schema().root_table(instance.entity()), instance.id()) {
            (Ok(table), Some(id)) => visited.contains(&(table.to_string(), id)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CrossReferenceOptions, ReferenceOptions, SchemaBuilder};
    use crate::catalog::{EntityDef, FieldDef, FieldType, Schema};
    use crate::error::Error;
    use crate::logging::SilentLogger;
    use crate::storage::{SledStore, StorageConfig};
    use std::sync::Arc;

    fn schema() -> Arc<Schema> {
        let mut builder = SchemaBuilder::new();
        builder
            .add_entity(
                EntityDef::new("Company").with_field(FieldDef::new("name", FieldType::text())),
            )
            .unwrap();
        builder
            .add_entity(
                EntityDef::new("Department").with_field(FieldDef::new("name", FieldType::text())),
            )
            .unwrap();
        builder
            .add_entity(
                EntityDef::new("Worker").with_field(FieldDef::new("name", FieldType::text())),
            )
            .unwrap();
        builder
            .add_entity(
                EntityDef::new("Badge").with_field(FieldDef::new("code", FieldType::text())),
            )
            .unwrap();
        builder
            .add_entity(
                EntityDef::new("Project").with_field(FieldDef::new("name", FieldType::text())),
            )
            .unwrap();
        // Company -> Department -> Worker cascade; Badge restricts Worker deletes
        builder
            .add_reference("Department", "Company", ReferenceOptions::new())
            .unwrap();
        builder
            .add_reference("Worker", "Department", ReferenceOptions::new())
            .unwrap();
        builder
            .add_reference(
                "Badge",
                "Worker",
                ReferenceOptions::new().with_rev_cascade("save-update, merge"),
            )
            .unwrap();
        builder
            .add_cross_reference("Worker", "Project", CrossReferenceOptions::new())
            .unwrap();
        builder.build().unwrap()
    }

    fn session() -> Session {
        let store = SledStore::open(&StorageConfig::temporary()).unwrap();
        let session = Session::new(schema(), Arc::new(store), Arc::new(SilentLogger));
        session.create_all().unwrap();
        session
    }

    fn add(session: &mut Session, instance: Instance) -> Instance {
        let mut instance = instance;
        session.add(&mut instance).unwrap();
        instance
    }

    #[test]
    fn test_cascade_deletes_dependents_first() {
        let mut session = session();
        let acme = add(&mut session, Instance::new("Company").with("name", "ACME"));
        let sales = add(
            &mut session,
            Instance::new("Department")
                .with("name", "Sales")
                .with_ref("company", &acme),
        );
        add(
            &mut session,
            Instance::new("Worker")
                .with("name", "Ann")
                .with_ref("department", &sales),
        );

        let result = CascadeExecutor::new(&session)
            .process_delete("Company", 1)
            .unwrap();
        assert_eq!(
            result.deleted_entities,
            vec![("Worker".to_string(), 1), ("Department".to_string(), 1)]
        );
        assert!(result.nullified_fields.is_empty());
        assert_eq!(result.affected_count(), 2);
    }

    #[test]
    fn test_restrict_blocks_delete() {
        let mut session = session();
        let acme = add(&mut session, Instance::new("Company").with("name", "ACME"));
        let sales = add(
            &mut session,
            Instance::new("Department")
                .with("name", "Sales")
                .with_ref("company", &acme),
        );
        let ann = add(
            &mut session,
            Instance::new("Worker")
                .with("name", "Ann")
                .with_ref("department", &sales),
        );
        add(
            &mut session,
            Instance::new("Badge")
                .with("code", "B-1")
                .with_ref("worker", &ann),
        );

        let err = session.delete(&acme).unwrap_err();
        assert!(matches!(err, Error::Persistence(PersistenceError::Constraint(_))));
        assert!(session.get("Department", 1).unwrap().is_some());
    }

    #[test]
    fn test_association_rows_follow_either_side() {
        let mut session = session();
        let acme = add(&mut session, Instance::new("Company").with("name", "ACME"));
        let sales = add(
            &mut session,
            Instance::new("Department")
                .with("name", "Sales")
                .with_ref("company", &acme),
        );
        let ann = add(
            &mut session,
            Instance::new("Worker")
                .with("name", "Ann")
                .with_ref("department", &sales),
        );
        let apollo = add(&mut session, Instance::new("Project").with("name", "Apollo"));
        add(
            &mut session,
            Instance::new("WorkerProject")
                .with_ref("worker", &ann)
                .with_ref("project", &apollo),
        );

        let result = session.delete(&apollo).unwrap();
        assert_eq!(result.deleted_entities, vec![("WorkerProject".to_string(), 1)]);
        assert!(session.all("WorkerProject").unwrap().is_empty());
        assert!(session.get("Worker", 1).unwrap().is_some());
    }
}
