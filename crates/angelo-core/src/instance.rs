//! Runtime instances and keyword arguments.

use crate::catalog::PRIMARY_KEY;
use crate::storage::Row;
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;

/// A record bound to one entity.
///
/// Instances are detached values: reading one from a session copies the
/// stored columns, and changes only reach storage through the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    entity: String,
    values: Row,
    delay_save: bool,
}

impl Instance {
    /// Create an empty, unsaved instance of `entity`.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            values: Row::new(),
            delay_save: false,
        }
    }

    pub(crate) fn from_parts(entity: impl Into<String>, values: Row, delay_save: bool) -> Self {
        Self {
            entity: entity.into(),
            values,
            delay_save,
        }
    }

    /// Set an attribute, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Point `<name>_id` at another instance, builder style.
    pub fn with_ref(self, name: &str, target: &Instance) -> Self {
        self.with(format!("{name}_id"), target.id())
    }

    /// Concrete entity of the instance.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Primary key, once assigned.
    pub fn id(&self) -> Option<i64> {
        self.values.get(PRIMARY_KEY).and_then(Value::as_i64)
    }

    /// Get an attribute if it is set.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Get an attribute, null when unset.
    pub fn value(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Assign an attribute.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// All attributes.
    pub fn values(&self) -> &Row {
        &self.values
    }

    pub(crate) fn replace_values(&mut self, values: Row) {
        self.values = values;
    }

    /// Whether saving this instance is deferred to a later commit.
    pub fn delay_save(&self) -> bool {
        self.delay_save
    }

    /// Defer (or stop deferring) commits triggered by this instance.
    pub fn set_delay_save(&mut self, delay_save: bool) {
        self.delay_save = delay_save;
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "<{} {id}>", self.entity),
            None => write!(f, "<{} transient>", self.entity),
        }
    }
}

/// Ordered keyword arguments of a create or update call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kwargs(IndexMap<String, Value>);

impl Kwargs {
    /// Create empty arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Pass another instance's primary key as `<name>_id`.
    pub fn with_ref(self, name: &str, target: &Instance) -> Self {
        self.with(format!("{name}_id"), target.id())
    }

    /// Insert or replace an argument.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Get an argument.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Remove an argument, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.shift_remove(name)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Kwargs {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Kwargs {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Kwargs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name:?}: {value}")?;
        }
        f.write_str("}")
    }
}
