//! Versioned schema snapshots kept next to the data.

use super::Schema;
use crate::error::PersistenceError;
use parking_lot::RwLock;
use sled::{Db, Tree};
use std::sync::atomic::{AtomicU64, Ordering};

/// Tree name for schema snapshots.
const SCHEMA_TREE: &str = "catalog:schemas";

/// Tree name for catalog metadata.
const META_TREE: &str = "catalog:meta";

/// Key for current schema version in meta tree.
const CURRENT_VERSION_KEY: &[u8] = b"current_version";

/// Records every distinct schema a database has been opened with.
pub struct Catalog {
    schema_tree: Tree,
    meta_tree: Tree,
    current_version: AtomicU64,
    current_schema: RwLock<Option<Schema>>,
}

impl Catalog {
    /// Open or create a catalog using the given sled database.
    pub fn open(db: &Db) -> Result<Self, PersistenceError> {
        let schema_tree = db.open_tree(SCHEMA_TREE)?;
        let meta_tree = db.open_tree(META_TREE)?;

        let current_version = match meta_tree.get(CURRENT_VERSION_KEY)? {
            Some(bytes) => decode_version(&bytes)?,
            None => 0,
        };

        let catalog = Self {
            schema_tree,
            meta_tree,
            current_version: AtomicU64::new(current_version),
            current_schema: RwLock::new(None),
        };

        if current_version > 0 {
            let schema = catalog.schema_at_version(current_version)?;
            *catalog.current_schema.write() = schema;
        }

        Ok(catalog)
    }

    /// Get the current schema version.
    pub fn current_version(&self) -> u64 {
        self.current_version.load(Ordering::SeqCst)
    }

    /// Get the current schema.
    pub fn current_schema(&self) -> Option<Schema> {
        self.current_schema.read().clone()
    }

    /// Get the schema stored under a specific version.
    pub fn schema_at_version(&self, version: u64) -> Result<Option<Schema>, PersistenceError> {
        match self.schema_tree.get(version.to_be_bytes())? {
            Some(bytes) => Ok(Some(Schema::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Record a schema, returning its version.
    ///
    /// A schema with the same shape as the current one keeps the current version.
    pub fn apply_schema(&self, mut schema: Schema) -> Result<u64, PersistenceError> {
        if let Some(current) = self.current_schema.read().as_ref() {
            if current.same_shape(&schema) {
                return Ok(current.version);
            }
        }

        let new_version = self.current_version() + 1;
        schema.version = new_version;

        self.schema_tree
            .insert(new_version.to_be_bytes(), schema.to_bytes()?)?;
        self.meta_tree
            .insert(CURRENT_VERSION_KEY, &new_version.to_be_bytes())?;

        self.current_version.store(new_version, Ordering::SeqCst);
        *self.current_schema.write() = Some(schema);

        tracing::debug!(version = new_version, "recorded schema version");
        Ok(new_version)
    }

    /// List all schema versions.
    pub fn list_versions(&self) -> Result<Vec<u64>, PersistenceError> {
        let mut versions = Vec::new();
        for result in self.schema_tree.iter() {
            let (key, _) = result?;
            if key.len() == 8 {
                versions.push(decode_version(&key)?);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.schema_tree.flush()?;
        self.meta_tree.flush()?;
        Ok(())
    }
}

fn decode_version(bytes: &[u8]) -> Result<u64, PersistenceError> {
    let buf: [u8; 8] = bytes
        .try_into()
        .map_err(|_| PersistenceError::Deserialization("malformed schema version".into()))?;
    Ok(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, FieldType};

    fn sample_schema() -> Schema {
        let group = EntityDef::new("Group")
            .with_field(FieldDef::primary_key())
            .with_field(FieldDef::new("abbr", FieldType::string(6)));
        let company = EntityDef::new("Company")
            .with_field(FieldDef::primary_key())
            .with_field(FieldDef::new("name", FieldType::string(30)));

        Schema::new(0).with_entity(group).with_entity(company)
    }

    fn test_db() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    #[test]
    fn test_catalog_open_empty() {
        let db = test_db();
        let catalog = Catalog::open(&db).unwrap();

        assert_eq!(catalog.current_version(), 0);
        assert!(catalog.current_schema().is_none());
    }

    #[test]
    fn test_apply_schema() {
        let db = test_db();
        let catalog = Catalog::open(&db).unwrap();

        let version = catalog.apply_schema(sample_schema()).unwrap();

        assert_eq!(version, 1);
        assert_eq!(catalog.current_version(), 1);
        assert_eq!(catalog.current_schema().unwrap().version, 1);
    }

    #[test]
    fn test_unchanged_schema_keeps_version() {
        let db = test_db();
        let catalog = Catalog::open(&db).unwrap();

        assert_eq!(catalog.apply_schema(sample_schema()).unwrap(), 1);
        assert_eq!(catalog.apply_schema(sample_schema()).unwrap(), 1);
        assert_eq!(catalog.list_versions().unwrap(), vec![1]);
    }

    #[test]
    fn test_schema_versioning() {
        let db = test_db();
        let catalog = Catalog::open(&db).unwrap();

        catalog.apply_schema(sample_schema()).unwrap();
        let extended = sample_schema()
            .with_entity(EntityDef::new("Status").with_field(FieldDef::primary_key()));
        assert_eq!(catalog.apply_schema(extended).unwrap(), 2);

        let v1 = catalog.schema_at_version(1).unwrap().unwrap();
        assert_eq!(v1.entities.len(), 2);
        let v2 = catalog.schema_at_version(2).unwrap().unwrap();
        assert_eq!(v2.entities.len(), 3);

        assert_eq!(catalog.list_versions().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let config = sled::Config::new().path(dir.path());

        {
            let db = config.clone().open().unwrap();
            let catalog = Catalog::open(&db).unwrap();
            catalog.apply_schema(sample_schema()).unwrap();
            catalog.flush().unwrap();
        }

        {
            let db = config.open().unwrap();
            let catalog = Catalog::open(&db).unwrap();

            assert_eq!(catalog.current_version(), 1);
            let schema = catalog.current_schema().unwrap();
            assert_eq!(schema.entity_names(), vec!["Group", "Company"]);
        }
    }
}
