//! Lifecycle hooks.

use crate::catalog::Schema;
use crate::error::Result;
use crate::instance::{Instance, Kwargs};
use crate::storage::Session;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Extension points around create, update and delete.
///
/// Before-hooks run before anything is committed, after-hooks after the
/// commit (if any). An error from a hook aborts the remaining steps.
#[allow(unused_variables)]
pub trait Hooks: Send + Sync {
    /// Runs after construction, before the instance joins the session.
    fn before_create(
        &self,
        session: &mut Session,
        instance: &mut Instance,
        values: &Kwargs,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs after the instance was added and saved.
    fn after_create(
        &self,
        session: &mut Session,
        instance: &mut Instance,
        values: &Kwargs,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs before `values` are assigned; may rewrite them.
    fn before_update(
        &self,
        session: &mut Session,
        instance: &mut Instance,
        values: &mut Kwargs,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs after the update was saved.
    fn after_update(
        &self,
        session: &mut Session,
        instance: &mut Instance,
        values: &Kwargs,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs after the delete was staged, before the commit.
    fn after_delete(&self, session: &mut Session, instance: &Instance) -> Result<()> {
        Ok(())
    }
}

/// Hooks per entity. Entities without their own hooks use their nearest ancestor's.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn Hooks>>,
}

impl HookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install hooks for an entity, replacing earlier ones.
    pub fn register(&mut self, entity: impl Into<String>, hooks: Arc<dyn Hooks>) {
        self.hooks.insert(entity.into(), hooks);
    }

    /// Hooks governing `entity`.
    pub fn resolve(&self, schema: &Schema, entity: &str) -> Result<Option<Arc<dyn Hooks>>> {
        Ok(schema
            .chain(entity)?
            .iter()
            .rev()
            .find_map(|e| self.hooks.get(&e.name).cloned()))
    }

    /// Check whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entities: Vec<&String> = self.hooks.keys().collect();
        entities.sort();
        f.debug_struct("HookRegistry")
            .field("entities", &entities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BaseModel, SchemaBuilder};
    use crate::catalog::{EntityDef, StorageStrategy};

    struct NoHooks;

    impl Hooks for NoHooks {}

    fn schema() -> Arc<Schema> {
        let mut builder = SchemaBuilder::new();
        builder
            .make_polymorphic_top(
                &BaseModel::new(),
                EntityDef::new("User"),
                ["User", "Employee", "Manager"],
            )
            .unwrap();
        builder
            .derive_model("User", EntityDef::new("Employee"), None, StorageStrategy::SingleTable)
            .unwrap();
        builder
            .derive_model("Employee", EntityDef::new("Manager"), None, StorageStrategy::SingleTable)
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_hooks_are_inherited() {
        let schema = schema();
        let mut registry = HookRegistry::new();
        assert!(registry.resolve(&schema, "Manager").unwrap().is_none());

        let user: Arc<dyn Hooks> = Arc::new(NoHooks);
        let employee: Arc<dyn Hooks> = Arc::new(NoHooks);
        registry.register("User", user.clone());
        registry.register("Employee", employee.clone());

        let resolved = |entity| registry.resolve(&schema, entity).unwrap().unwrap();
        assert!(Arc::ptr_eq(&resolved("User"), &user));
        assert!(Arc::ptr_eq(&resolved("Employee"), &employee));
        assert!(Arc::ptr_eq(&resolved("Manager"), &employee));
    }

    #[test]
    fn test_unknown_entity() {
        let registry = HookRegistry::new();
        assert!(registry.resolve(&schema(), "Nope").is_err());
    }
}
