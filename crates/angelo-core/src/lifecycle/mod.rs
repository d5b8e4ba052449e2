//! Create, update, delete and bulk insert on top of a [`Session`].
//!
//! The lifecycle sanitizes keyword arguments, reports every write on the
//! logger's report channel, runs the per-entity [`Hooks`] around the
//! session calls and decides when the session is committed.

mod hooks;
mod sanitize;

pub use hooks::{HookRegistry, Hooks};
pub use sanitize::{resolve_attribute, sanitize, SanitizePolicy};

use crate::catalog::Schema;
use crate::error::Result;
use crate::instance::{Instance, Kwargs};
use crate::logging::Logger;
use crate::storage::{Row, Session};
use std::sync::Arc;

/// Per-call switches of the write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Commit the session once the write is staged.
    pub commit: bool,
    /// Emit a report line for the write.
    pub report: bool,
}

impl WriteOptions {
    /// Stage only; the caller commits later.
    pub fn deferred() -> Self {
        Self {
            commit: false,
            ..Self::default()
        }
    }

    /// Set whether the write is reported.
    pub fn with_report(mut self, report: bool) -> Self {
        self.report = report;
        self
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            commit: true,
            report: true,
        }
    }
}

/// Object lifecycle for one schema.
pub struct Lifecycle {
    schema: Arc<Schema>,
    logger: Arc<dyn Logger>,
    hooks: HookRegistry,
    policy: SanitizePolicy,
}

impl Lifecycle {
    pub fn new(schema: Arc<Schema>, logger: Arc<dyn Logger>) -> Self {
        Self {
            schema,
            logger,
            hooks: HookRegistry::new(),
            policy: SanitizePolicy::default(),
        }
    }

    /// Replace the hook registry.
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Set how unknown keyword arguments are treated.
    pub fn with_policy(mut self, policy: SanitizePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Install hooks for `entity` and, unless overridden, its descendants.
    pub fn register_hooks(&mut self, entity: &str, hooks: Arc<dyn Hooks>) -> Result<()> {
        self.schema.entity(entity)?;
        self.hooks.register(entity, hooks);
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn policy(&self) -> SanitizePolicy {
        self.policy
    }

    /// Map keyword arguments onto `entity`'s columns.
    pub fn sanitize(&self, entity: &str, kwargs: Kwargs) -> Result<Kwargs> {
        sanitize(&self.schema, entity, kwargs, self.policy, self.logger.as_ref())
    }

    /// Create and commit an instance of `entity`.
    pub fn create(&self, session: &mut Session, entity: &str, kwargs: Kwargs) -> Result<Instance> {
        self.create_with(session, entity, kwargs, WriteOptions::default())
    }

    /// Create an instance of `entity`.
    ///
    /// `before_create` sees the constructed instance before it joins the
    /// session; `after_create` runs once it has been saved.
    pub fn create_with(
        &self,
        session: &mut Session,
        entity: &str,
        kwargs: Kwargs,
        options: WriteOptions,
    ) -> Result<Instance> {
        let kwargs = self.sanitize(entity, kwargs)?;
        if options.report {
            self.logger.report(&format!("Creating {entity}: {kwargs}"));
        }

        let mut instance = Instance::new(entity);
        instance.set_delay_save(self.schema.entity(entity)?.delay_save);
        for (name, value) in kwargs.iter() {
            instance.set(name.clone(), value.clone());
        }

        let hooks = self.hooks.resolve(&self.schema, entity)?;
        if let Some(hooks) = &hooks {
            hooks.before_create(session, &mut instance, &kwargs)?;
        }
        session.add(&mut instance)?;
        self.save(session, &instance, options.commit)?;
        if let Some(hooks) = &hooks {
            hooks.after_create(session, &mut instance, &kwargs)?;
        }
        Ok(instance)
    }

    /// Update and commit `instance`.
    pub fn update(
        &self,
        session: &mut Session,
        instance: &mut Instance,
        kwargs: Kwargs,
    ) -> Result<()> {
        self.update_with(session, instance, kwargs, WriteOptions::default())
    }

    /// Assign the sanitized `kwargs` to `instance` and save it.
    pub fn update_with(
        &self,
        session: &mut Session,
        instance: &mut Instance,
        kwargs: Kwargs,
        options: WriteOptions,
    ) -> Result<()> {
        let entity = instance.entity().to_string();
        let mut kwargs = self.sanitize(&entity, kwargs)?;
        if options.report {
            self.logger
                .report(&format!("Updating {entity} \"{instance}\": {kwargs}"));
        }
        self.logger.log(&format!("UPDATE {instance}"));
        self.logger.log(&format!("   {kwargs}"));

        let hooks = self.hooks.resolve(&self.schema, &entity)?;
        if let Some(hooks) = &hooks {
            hooks.before_update(session, instance, &mut kwargs)?;
        }
        for (name, value) in kwargs.iter() {
            instance.set(name.clone(), value.clone());
        }
        session.add(instance)?;
        self.save(session, instance, options.commit)?;
        if let Some(hooks) = &hooks {
            hooks.after_update(session, instance, &kwargs)?;
        }
        Ok(())
    }

    /// Commit the session if `really` is set and `instance` does not delay
    /// saving. Returns whether a commit happened.
    pub fn save(&self, session: &mut Session, instance: &Instance, really: bool) -> Result<bool> {
        if really && !instance.delay_save() {
            session.commit()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Delete `instance` and commit.
    pub fn delete(&self, session: &mut Session, instance: &Instance) -> Result<bool> {
        self.delete_with(session, instance, WriteOptions::default())
    }

    /// Stage the deletion of `instance`, run `after_delete` and commit if
    /// asked to. `delay_save` does not apply here.
    pub fn delete_with(
        &self,
        session: &mut Session,
        instance: &Instance,
        options: WriteOptions,
    ) -> Result<bool> {
        let entity = instance.entity();
        if options.report {
            self.logger
                .report(&format!("Deleting {entity} \"{instance}\""));
        }

        let cascaded = session.delete(instance)?;
        if cascaded.affected_count() > 0 {
            tracing::debug!(
                entity,
                deleted = cascaded.deleted_entities.len(),
                nullified = cascaded.nullified_fields.len(),
                "delete cascaded"
            );
        }
        if let Some(hooks) = self.hooks.resolve(&self.schema, entity)? {
            hooks.after_delete(session, instance)?;
        }
        if options.commit {
            session.commit()?;
        }
        Ok(options.commit)
    }

    /// Insert raw records of `entity` in one batch and commit.
    ///
    /// Neither sanitization nor hooks apply. Records without a primary key
    /// are numbered after the current maximum, in order.
    pub fn bulk_insert(
        &self,
        session: &mut Session,
        entity: &str,
        records: Vec<Kwargs>,
    ) -> Result<Vec<i64>> {
        let listed: Vec<String> = records.iter().map(|r| r.to_string()).collect();
        self.logger
            .report(&format!("Bulk insert of {entity}: [{}]", listed.join(", ")));

        let rows: Vec<Row> = records
            .into_iter()
            .map(|record| record.into_iter().collect())
            .collect();
        let ids = session.insert_rows(entity, rows)?;
        session.commit()?;
        Ok(ids)
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("hooks", &self.hooks)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
