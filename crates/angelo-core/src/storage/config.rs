//! Storage configuration.

use crate::error::Error;
use std::path::PathBuf;

/// URI scheme of on-disk databases.
pub const SLED_SCHEME: &str = "sled://";

/// URI scheme of throwaway databases.
pub const MEMORY_SCHEME: &str = "memory://";

/// Configuration for the storage engine.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the database directory.
    pub path: PathBuf,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Flush interval in milliseconds. None means flush on every write.
    pub flush_every_ms: Option<u64>,

    /// Enable zstd compression.
    pub compression: bool,

    /// Temporary database (deleted on drop).
    pub temporary: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./angelo_data"),
            cache_capacity: 64 * 1024 * 1024, // 64MB
            flush_every_ms: Some(1000),
            compression: true,
            temporary: false,
        }
    }
}

impl StorageConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::from(""),
            temporary: true,
            ..Default::default()
        }
    }

    /// Parse a database URI: `sled://<path>` or `memory://`.
    pub fn from_uri(uri: &str) -> Result<Self, Error> {
        if let Some(path) = uri.strip_prefix(SLED_SCHEME) {
            if path.is_empty() {
                return Err(Error::Configuration(format!("no path in database uri {uri:?}")));
            }
            return Ok(Self::new(path));
        }
        if uri.strip_prefix(MEMORY_SCHEME).is_some() {
            return Ok(Self::temporary());
        }
        Err(Error::Configuration(format!(
            "unsupported database uri {uri:?} (expected {SLED_SCHEME}<path> or {MEMORY_SCHEME})"
        )))
    }

    /// Set the page cache capacity.
    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Set the flush interval; `None` flushes on every write.
    pub fn with_flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }

    /// Enable or disable compression.
    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    /// Convert to sled configuration.
    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression)
            .flush_every_ms(self.flush_every_ms);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }

        config
    }
}
