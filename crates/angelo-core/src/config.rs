//! Configuration of a [`crate::Database`] and its schema builder.

use crate::builder::SchemaBuilder;
use crate::catalog::CascadePolicy;
use crate::error::Result;
use crate::lifecycle::SanitizePolicy;
use crate::logging::TracingLogger;
use crate::storage::StorageConfig;
use std::sync::Arc;

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct AngeloConfig {
    /// Where and how rows are stored.
    pub storage: StorageConfig,

    /// Emit diagnostic messages on the debug channel.
    pub debug: bool,

    /// Treatment of unknown keyword arguments in create and update.
    pub sanitize: SanitizePolicy,

    /// Cascade of back-references that don't name one.
    pub default_cascade: CascadePolicy,
}

impl AngeloConfig {
    /// Create a configuration over the given storage.
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            debug: false,
            sanitize: SanitizePolicy::default(),
            default_cascade: CascadePolicy::default(),
        }
    }

    /// Create a configuration from a database URI (`sled://<path>` or `memory://`).
    pub fn from_uri(uri: &str) -> Result<Self> {
        Ok(Self::new(StorageConfig::from_uri(uri)?))
    }

    /// Configuration of a throwaway database.
    pub fn temporary() -> Self {
        Self::new(StorageConfig::temporary())
    }

    /// Enable or disable debug diagnostics.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the sanitize policy.
    pub fn with_sanitize(mut self, policy: SanitizePolicy) -> Self {
        self.sanitize = policy;
        self
    }

    /// Set the default back-reference cascade, e.g. `"save-update, merge"`.
    pub fn with_default_cascade(mut self, cascade: &str) -> Result<Self> {
        self.default_cascade = CascadePolicy::parse(cascade)?;
        Ok(self)
    }

    /// Logger honouring the debug flag.
    pub fn logger(&self) -> TracingLogger {
        TracingLogger::new(self.debug)
    }

    /// A schema builder using this configuration's logger and default cascade.
    pub fn schema_builder(&self) -> Result<SchemaBuilder> {
        SchemaBuilder::new()
            .with_logger(Arc::new(self.logger()))
            .with_default_cascade(&self.default_cascade.to_string())
    }
}

impl Default for AngeloConfig {
    fn default() -> Self {
        Self::new(StorageConfig::default())
    }
}
