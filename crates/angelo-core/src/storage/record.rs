//! Record type for stored rows.

use crate::error::PersistenceError;
use crate::value::Value;
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column values of one table row, keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// One stored column value.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct FieldValue {
    /// Column name.
    pub name: String,
    /// Stored value.
    pub value: Value,
}

/// A stored row with metadata.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Record {
    /// Column values.
    pub fields: Vec<FieldValue>,

    /// Write timestamp in microseconds since Unix epoch.
    pub created_at: u64,
}

impl Record {
    /// Create a record from a row with the current timestamp.
    pub fn from_row(row: &Row) -> Self {
        Self {
            fields: row
                .iter()
                .map(|(name, value)| FieldValue {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            created_at: current_timestamp(),
        }
    }

    /// Turn the record back into a row.
    pub fn into_row(self) -> Row {
        self.fields.into_iter().map(|f| (f.name, f.value)).collect()
    }

    /// Serialize the record to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| PersistenceError::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| PersistenceError::Deserialization(e.to_string()))
    }
}

/// Current time in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let mut row = Row::new();
        row.insert("id".into(), Value::Int64(7));
        row.insert("abbr".into(), Value::from("R&D"));
        row.insert("salary".into(), Value::decimal(250000, 2));
        row.insert("company_id".into(), Value::Null);

        let record = Record::from_row(&row);
        let decoded = Record::from_bytes(&record.to_bytes().unwrap()).unwrap();

        assert_eq!(record.created_at, decoded.created_at);
        assert_eq!(decoded.into_row(), row);
    }

    #[test]
    fn test_garbage_bytes() {
        assert!(matches!(
            Record::from_bytes(&[1, 2, 3]),
            Err(PersistenceError::Deserialization(_))
        ));
    }
}
