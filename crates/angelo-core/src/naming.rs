//! Canonical API and collection names of entities.

use crate::catalog::{EntityDef, EntityRole, StorageStrategy};
use heck::ToSnakeCase;
use std::fmt;
use std::sync::Arc;

/// Pluralization service.
pub trait Inflector: Send + Sync {
    /// Plural form of a word.
    fn pluralize(&self, word: &str) -> String;
}

/// Inflector backed by the `pluralizer` rule set.
#[derive(Debug, Clone, Copy, Default)]
pub struct PluralizerInflector;

impl Inflector for PluralizerInflector {
    fn pluralize(&self, word: &str) -> String {
        pluralizer::pluralize(word, 2, false)
    }
}

/// Something with an API name.
pub trait Naming {
    /// Canonical singular name, used for accessors and foreign keys.
    fn api(&self) -> String;

    /// Plural of [`Naming::api`].
    fn plural(&self, inflector: &dyn Inflector) -> String {
        inflector.pluralize(&self.api())
    }
}

impl Naming for EntityDef {
    fn api(&self) -> String {
        if let Some(name) = &self.api_name {
            return name.clone();
        }
        match self.role() {
            EntityRole::Derived(StorageStrategy::SingleTable) => self.name.to_snake_case(),
            _ => self.table.clone(),
        }
    }
}

/// Resolves names through an injected [`Inflector`].
#[derive(Clone)]
pub struct NamingResolver {
    inflector: Arc<dyn Inflector>,
}

impl NamingResolver {
    /// Create a resolver with a custom inflector.
    pub fn new(inflector: Arc<dyn Inflector>) -> Self {
        Self { inflector }
    }

    /// Canonical singular name.
    pub fn get_api(&self, entity: &dyn Naming) -> String {
        entity.api()
    }

    /// Canonical collection name.
    pub fn get_plural(&self, entity: &dyn Naming) -> String {
        entity.plural(self.inflector.as_ref())
    }

    /// The injected pluralization service.
    pub fn inflector(&self) -> &dyn Inflector {
        self.inflector.as_ref()
    }

    /// Pluralize an arbitrary word.
    pub fn pluralize(&self, word: &str) -> String {
        self.inflector.pluralize(word)
    }
}

impl Default for NamingResolver {
    fn default() -> Self {
        Self::new(Arc::new(PluralizerInflector))
    }
}

impl fmt::Debug for NamingResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamingResolver").finish_non_exhaustive()
    }
}
