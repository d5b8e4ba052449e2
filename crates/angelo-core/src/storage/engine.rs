//! Persistence seam and its sled implementation.

use super::{Record, Row, StorageConfig};
use crate::error::PersistenceError;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};

/// Tree name for table rows.
const DATA_TREE: &str = "data";

/// Tree name for the table registry.
const META_TREE: &str = "meta";

/// Prefix of table registry entries in the meta tree.
const TABLE_PREFIX: &[u8] = b"table:";

/// A single staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or replace a row.
    Put {
        /// Table name.
        table: String,
        /// Primary key.
        id: i64,
        /// Full row.
        row: Row,
    },
    /// Remove a row.
    Delete {
        /// Table name.
        table: String,
        /// Primary key.
        id: i64,
    },
}

impl WriteOp {
    /// Table the operation touches.
    pub fn table(&self) -> &str {
        match self {
            WriteOp::Put { table, .. } | WriteOp::Delete { table, .. } => table,
        }
    }
}

/// Writes applied atomically by [`Store::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a row insert or replacement.
    pub fn put(&mut self, table: impl Into<String>, id: i64, row: Row) {
        self.ops.push(WriteOp::Put {
            table: table.into(),
            id,
            row,
        });
    }

    /// Stage a row removal.
    pub fn delete(&mut self, table: impl Into<String>, id: i64) {
        self.ops.push(WriteOp::Delete {
            table: table.into(),
            id,
        });
    }

    /// Staged operations in order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Row storage the session delegates to.
///
/// Rows are addressed by table name and integer primary key.
pub trait Store: Send + Sync {
    /// Create tables that don't exist yet.
    fn create_tables(&self, tables: &[&str]) -> Result<(), PersistenceError>;

    /// Drop tables and all their rows.
    fn drop_tables(&self, tables: &[&str]) -> Result<(), PersistenceError>;

    /// Check whether a table exists.
    fn has_table(&self, table: &str) -> Result<bool, PersistenceError>;

    /// Read one row.
    fn read(&self, table: &str, id: i64) -> Result<Option<Row>, PersistenceError>;

    /// Read all rows of a table in primary key order.
    fn scan(&self, table: &str) -> Result<Vec<(i64, Row)>, PersistenceError>;

    /// Highest primary key in a table.
    fn max_id(&self, table: &str) -> Result<Option<i64>, PersistenceError>;

    /// Apply a batch atomically.
    fn apply(&self, batch: WriteBatch) -> Result<(), PersistenceError>;

    /// Flush pending writes to disk.
    fn flush(&self) -> Result<(), PersistenceError>;
}

/// [`Store`] keeping every table in one sled tree.
pub struct SledStore {
    db: Db,
    data_tree: Tree,
    meta_tree: Tree,
}

impl SledStore {
    /// Open or create a store with the given configuration.
    pub fn open(config: &StorageConfig) -> Result<Self, PersistenceError> {
        let db = config.to_sled_config().open()?;
        let data_tree = db.open_tree(DATA_TREE)?;
        let meta_tree = db.open_tree(META_TREE)?;

        tracing::debug!(
            path = %config.path.display(),
            temporary = config.temporary,
            recovered = db.was_recovered(),
            "opened sled store"
        );

        Ok(Self {
            db,
            data_tree,
            meta_tree,
        })
    }

    /// Get the underlying sled database (for opening new trees).
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Get database size in bytes.
    pub fn size_on_disk(&self) -> Result<u64, PersistenceError> {
        Ok(self.db.size_on_disk()?)
    }

    fn ensure_table(&self, table: &str) -> Result<(), PersistenceError> {
        if self.has_table(table)? {
            Ok(())
        } else {
            Err(PersistenceError::UnknownTable(table.to_string()))
        }
    }
}

impl Store for SledStore {
    fn create_tables(&self, tables: &[&str]) -> Result<(), PersistenceError> {
        for table in tables {
            if self
                .meta_tree
                .insert(table_key(table), &[])?
                .is_none()
            {
                tracing::debug!(table, "created table");
            }
        }
        Ok(())
    }

    fn drop_tables(&self, tables: &[&str]) -> Result<(), PersistenceError> {
        for table in tables {
            let mut batch = sled::Batch::default();
            for result in self.data_tree.scan_prefix(row_prefix(table)) {
                let (key, _) = result?;
                batch.remove(key);
            }
            self.data_tree.apply_batch(batch)?;
            self.meta_tree.remove(table_key(table))?;
            tracing::debug!(table, "dropped table");
        }
        Ok(())
    }

    fn has_table(&self, table: &str) -> Result<bool, PersistenceError> {
        Ok(self.meta_tree.contains_key(table_key(table))?)
    }

    fn read(&self, table: &str, id: i64) -> Result<Option<Row>, PersistenceError> {
        self.ensure_table(table)?;
        match self.data_tree.get(row_key(table, id))? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?.into_row())),
            None => Ok(None),
        }
    }

    fn scan(&self, table: &str) -> Result<Vec<(i64, Row)>, PersistenceError> {
        self.ensure_table(table)?;
        let prefix = row_prefix(table);
        let mut rows = Vec::new();
        for result in self.data_tree.scan_prefix(&prefix) {
            let (key, value) = result?;
            let id = decode_id(&key[prefix.len()..])?;
            rows.push((id, Record::from_bytes(&value)?.into_row()));
        }
        Ok(rows)
    }

    fn max_id(&self, table: &str) -> Result<Option<i64>, PersistenceError> {
        self.ensure_table(table)?;
        let prefix = row_prefix(table);
        match self.data_tree.scan_prefix(&prefix).next_back() {
            Some(result) => {
                let (key, _) = result?;
                Ok(Some(decode_id(&key[prefix.len()..])?))
            }
            None => Ok(None),
        }
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), PersistenceError> {
        // Encode outside the transaction; the closure may run more than once.
        let mut encoded: Vec<(String, Vec<u8>, Option<Vec<u8>>)> = Vec::with_capacity(batch.len());
        for op in batch.ops() {
            match op {
                WriteOp::Put { table, id, row } => encoded.push((
                    table.clone(),
                    row_key(table, *id),
                    Some(Record::from_row(row).to_bytes()?),
                )),
                WriteOp::Delete { table, id } => {
                    encoded.push((table.clone(), row_key(table, *id), None))
                }
            }
        }

        let result: Result<(), TransactionError<PersistenceError>> =
            (&self.data_tree, &self.meta_tree).transaction(|(data_tx, meta_tx)| {
                for (table, key, value) in &encoded {
                    if meta_tx.get(table_key(table))?.is_none() {
                        return Err(ConflictableTransactionError::Abort(
                            PersistenceError::UnknownTable(table.clone()),
                        ));
                    }
                    match value {
                        Some(bytes) => {
                            data_tx.insert(key.as_slice(), bytes.as_slice())?;
                        }
                        None => {
                            data_tx.remove(key.as_slice())?;
                        }
                    }
                }
                Ok(())
            });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(PersistenceError::Storage(e)),
        }
    }

    fn flush(&self) -> Result<(), PersistenceError> {
        self.db.flush()?;
        Ok(())
    }
}

fn table_key(table: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(TABLE_PREFIX.len() + table.len());
    key.extend_from_slice(TABLE_PREFIX);
    key.extend_from_slice(table.as_bytes());
    key
}

fn row_prefix(table: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(table.len() + 1);
    prefix.extend_from_slice(table.as_bytes());
    prefix.push(0); // Null separator
    prefix
}

/// `<table>\0<id>`, with the id's sign bit flipped so keys sort numerically.
fn row_key(table: &str, id: i64) -> Vec<u8> {
    let mut key = row_prefix(table);
    key.extend_from_slice(&((id as u64) ^ (1 << 63)).to_be_bytes());
    key
}

fn decode_id(bytes: &[u8]) -> Result<i64, PersistenceError> {
    let buf: [u8; 8] = bytes
        .try_into()
        .map_err(|_| PersistenceError::Deserialization("malformed row key".into()))?;
    Ok((u64::from_be_bytes(buf) ^ (1 << 63)) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    struct TestStore {
        store: SledStore,
        _dir: tempfile::TempDir, // Keep the temp dir alive
    }

    impl std::ops::Deref for TestStore {
        type Target = SledStore;
        fn deref(&self) -> &Self::Target {
            &self.store
        }
    }

    fn test_store() -> TestStore {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(&StorageConfig::new(dir.path())).unwrap();
        store.create_tables(&["group", "company"]).unwrap();
        TestStore { store, _dir: dir }
    }

    fn row(abbr: &str) -> Row {
        let mut row = Row::new();
        row.insert("abbr".into(), Value::from(abbr));
        row
    }

    #[test]
    fn test_put_and_read() {
        let store = test_store();
        let mut batch = WriteBatch::new();
        batch.put("group", 1, row("HRM"));
        store.apply(batch).unwrap();

        assert_eq!(store.read("group", 1).unwrap(), Some(row("HRM")));
        assert_eq!(store.read("group", 2).unwrap(), None);
        assert_eq!(store.read("company", 1).unwrap(), None);
    }

    #[test]
    fn test_scan_orders_by_id() {
        let store = test_store();
        let mut batch = WriteBatch::new();
        batch.put("group", 10, row("B"));
        batch.put("group", 2, row("A"));
        batch.put("group", 256, row("C"));
        store.apply(batch).unwrap();

        let ids: Vec<i64> = store.scan("group").unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![2, 10, 256]);
        assert_eq!(store.max_id("group").unwrap(), Some(256));
        assert_eq!(store.max_id("company").unwrap(), None);
    }

    #[test]
    fn test_delete() {
        let store = test_store();
        let mut batch = WriteBatch::new();
        batch.put("group", 1, row("HRM"));
        store.apply(batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete("group", 1);
        store.apply(batch).unwrap();
        assert!(store.read("group", 1).unwrap().is_none());
    }

    #[test]
    fn test_batch_is_atomic() {
        let store = test_store();
        let mut batch = WriteBatch::new();
        batch.put("group", 1, row("HRM"));
        batch.put("missing", 1, row("X"));

        let err = store.apply(batch).unwrap_err();
        assert!(matches!(err, PersistenceError::UnknownTable(t) if t == "missing"));
        assert!(store.read("group", 1).unwrap().is_none());
    }

    #[test]
    fn test_unknown_table() {
        let store = test_store();
        assert!(matches!(
            store.scan("user"),
            Err(PersistenceError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_drop_tables() {
        let store = test_store();
        let mut batch = WriteBatch::new();
        batch.put("group", 1, row("HRM"));
        batch.put("company", 1, row("ACME"));
        store.apply(batch).unwrap();

        store.drop_tables(&["group"]).unwrap();
        assert!(!store.has_table("group").unwrap());
        assert!(store.has_table("company").unwrap());

        store.create_tables(&["group"]).unwrap();
        assert!(store.scan("group").unwrap().is_empty());
        assert_eq!(store.scan("company").unwrap().len(), 1);
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(dir.path());
        {
            let store = SledStore::open(&config).unwrap();
            store.create_tables(&["group"]).unwrap();
            let mut batch = WriteBatch::new();
            batch.put("group", 1, row("HRM"));
            store.apply(batch).unwrap();
            store.flush().unwrap();
        }
        {
            let store = SledStore::open(&config).unwrap();
            assert_eq!(store.read("group", 1).unwrap(), Some(row("HRM")));
        }
    }
}
