//! Database handle combining the sled store, the schema catalog and the lifecycle.

use crate::catalog::{Catalog, Schema};
use crate::config::AngeloConfig;
use crate::error::Result;
use crate::introspect::EntityView;
use crate::lifecycle::{HookRegistry, Hooks, Lifecycle};
use crate::logging::Logger;
use crate::storage::{Session, SledStore, Store};
use std::sync::Arc;

/// An opened database for one frozen schema.
pub struct Database {
    config: AngeloConfig,
    schema: Arc<Schema>,
    store: Arc<SledStore>,
    catalog: Catalog,
    logger: Arc<dyn Logger>,
    hooks: HookRegistry,
}

impl Database {
    /// Open the store described by `config` for `schema`.
    ///
    /// Tables are not created; call [`Database::create_all`].
    pub fn open(config: AngeloConfig, schema: Arc<Schema>) -> Result<Self> {
        let store = Arc::new(SledStore::open(&config.storage)?);
        let catalog = Catalog::open(store.db())?;

        tracing::info!(
            path = %config.storage.path.display(),
            temporary = config.storage.temporary,
            schema_version = catalog.current_version(),
            entities = schema.entities.len(),
            "opened database"
        );

        Ok(Self {
            logger: Arc::new(config.logger()),
            config,
            schema,
            store,
            catalog,
            hooks: HookRegistry::new(),
        })
    }

    /// Send lifecycle and session messages to a different logger.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Install hooks for `entity` and, unless overridden, its descendants.
    pub fn register_hooks(&mut self, entity: &str, hooks: Arc<dyn Hooks>) -> Result<()> {
        self.schema.entity(entity)?;
        self.hooks.register(entity, hooks);
        Ok(())
    }

    pub fn config(&self) -> &AngeloConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &SledStore {
        &self.store
    }

    /// Start a unit of work.
    pub fn session(&self) -> Session {
        let store: Arc<dyn Store> = self.store.clone();
        Session::new(self.schema.clone(), store, self.logger.clone())
    }

    /// Lifecycle with this database's hooks and sanitize policy.
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.schema.clone(), self.logger.clone())
            .with_hooks(self.hooks.clone())
            .with_policy(self.config.sanitize)
    }

    /// Create every table and record the schema, returning its catalog version.
    pub fn create_all(&self) -> Result<u64> {
        self.store.create_tables(&self.schema.tables())?;
        let version = self.catalog.apply_schema(Schema::clone(&self.schema))?;
        self.logger
            .log(&format!("Created tables for schema version {version}"));
        Ok(version)
    }

    /// Drop every table of the schema together with its rows.
    pub fn drop_all(&self) -> Result<()> {
        self.store.drop_tables(&self.schema.tables())?;
        self.logger.log("Dropped all tables");
        Ok(())
    }

    /// Introspection view of an entity.
    pub fn view(&self, entity: &str) -> Result<EntityView<'_>> {
        EntityView::new(&self.schema, entity)
    }

    /// Flush data and catalog to disk.
    pub fn flush(&self) -> Result<()> {
        self.store.flush()?;
        self.catalog.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("schema_version", &self.catalog.current_version())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
