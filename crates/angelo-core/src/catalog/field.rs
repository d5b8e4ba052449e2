//! Field definitions for entities.

use super::types::FieldType;
use crate::value::Value;
use rkyv::{Archive, Deserialize, Serialize};

/// Name of the primary key every entity carries.
pub const PRIMARY_KEY: &str = "id";

/// A field (column) definition within an entity.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Whether the field must hold a non-null value.
    pub required: bool,
    /// Default value if not provided.
    pub default: Option<DefaultValue>,
    /// Whether this is the primary key.
    pub primary_key: bool,
    /// Foreign key target, if any.
    pub references: Option<ForeignKeyRef>,
}

/// Default value for a field.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum DefaultValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
}

/// Target of a foreign key: `<table>.<field>`.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced table.
    pub table: String,
    /// Referenced field (always the primary key).
    pub field: String,
}

impl DefaultValue {
    /// Materialize the default as a runtime value.
    pub fn to_value(&self) -> Value {
        match self {
            DefaultValue::Null => Value::Null,
            DefaultValue::Bool(b) => Value::Bool(*b),
            DefaultValue::Int(i) => Value::Int64(*i),
            DefaultValue::Float(f) => Value::Float64(*f),
            DefaultValue::String(s) => Value::String(s.clone()),
        }
    }
}

impl FieldDef {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            default: None,
            primary_key: false,
            references: None,
        }
    }

    /// Create an optional (nullable) field.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::new(name, field_type)
        }
    }

    /// The generated integer primary key.
    pub fn primary_key() -> Self {
        Self {
            primary_key: true,
            ..Self::new(PRIMARY_KEY, FieldType::integer())
        }
    }

    /// An integer column referencing `<table>.id`.
    pub fn foreign_key(name: impl Into<String>, table: impl Into<String>, nullable: bool) -> Self {
        Self {
            required: !nullable,
            references: Some(ForeignKeyRef {
                table: table.into(),
                field: PRIMARY_KEY.to_string(),
            }),
            ..Self::new(name, FieldType::integer())
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Check if this field has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Check if this field is a foreign key.
    pub fn is_foreign_key(&self) -> bool {
        self.references.is_some()
    }
}
