//! Keyword argument sanitization.

use crate::catalog::Schema;
use crate::error::{Error, Result};
use crate::instance::Kwargs;
use crate::logging::Logger;
use std::fmt;
use std::str::FromStr;

/// What to do with keyword arguments that name no attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SanitizePolicy {
    /// Drop them (logged on the debug channel).
    #[default]
    Lenient,
    /// Reject the call with [`Error::UnknownAttribute`].
    Strict,
}

impl FromStr for SanitizePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(SanitizePolicy::Lenient),
            "strict" => Ok(SanitizePolicy::Strict),
            other => Err(Error::Configuration(format!(
                "unknown sanitize policy {other:?} (expected lenient or strict)"
            ))),
        }
    }
}

impl fmt::Display for SanitizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanitizePolicy::Lenient => f.write_str("lenient"),
            SanitizePolicy::Strict => f.write_str("strict"),
        }
    }
}

/// Column a keyword argument stands for: `key`, `_key` or `key_id`.
pub fn resolve_attribute(schema: &Schema, entity: &str, key: &str) -> Result<Option<String>> {
    for candidate in [key.to_string(), format!("_{key}"), format!("{key}_id")] {
        if schema.field(entity, &candidate)?.is_some() {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Rewrite `kwargs` to resolved column names, applying `policy` to the rest.
pub fn sanitize(
    schema: &Schema,
    entity: &str,
    kwargs: Kwargs,
    policy: SanitizePolicy,
    logger: &dyn Logger,
) -> Result<Kwargs> {
    let mut clean = Kwargs::new();
    for (key, value) in kwargs {
        match resolve_attribute(schema, entity, &key)? {
            Some(column) => clean.insert(column, value),
            None if policy == SanitizePolicy::Strict => {
                return Err(Error::UnknownAttribute {
                    entity: entity.to_string(),
                    attribute: key,
                })
            }
            None => logger.log(&format!("Dropping argument {key} unknown to {entity}")),
        }
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ReferenceOptions, SchemaBuilder};
    use crate::catalog::{EntityDef, FieldDef, FieldType};
    use crate::logging::MemoryLogger;
    use crate::value::Value;

    fn schema() -> std::sync::Arc<Schema> {
        let mut builder = SchemaBuilder::new();
        builder
            .add_entity(
                EntityDef::new("Company").with_field(FieldDef::new("name", FieldType::text())),
            )
            .unwrap();
        builder
            .add_entity(
                EntityDef::new("Worker")
                    .with_field(FieldDef::new("name", FieldType::text()))
                    .with_field(FieldDef::optional("_badge", FieldType::text())),
            )
            .unwrap();
        builder
            .add_reference("Worker", "Company", ReferenceOptions::new())
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_resolution_order() {
        let schema = schema();
        let resolve = |key: &str| resolve_attribute(&schema, "Worker", key).unwrap();
        assert_eq!(resolve("name").as_deref(), Some("name"));
        assert_eq!(resolve("badge").as_deref(), Some("_badge"));
        assert_eq!(resolve("company").as_deref(), Some("company_id"));
        assert_eq!(resolve("motto"), None);
    }

    #[test]
    fn test_lenient_drops_unknown_keys() {
        let schema = schema();
        let logger = MemoryLogger::shared();
        let kwargs = Kwargs::new()
            .with("name", "Ann")
            .with("motto", "carpe diem")
            .with("company", 1i64);

        let clean = sanitize(&schema, "Worker", kwargs, SanitizePolicy::Lenient, &*logger)
            .unwrap();
        assert_eq!(clean.len(), 2);
        assert_eq!(clean.get("company_id"), Some(&Value::Int64(1)));
        assert_eq!(logger.logs(), vec!["Dropping argument motto unknown to Worker"]);
    }

    #[test]
    fn test_strict_rejects_unknown_keys() {
        let schema = schema();
        let logger = MemoryLogger::shared();
        let kwargs = Kwargs::new().with("motto", "carpe diem");
        let err = sanitize(&schema, "Worker", kwargs, SanitizePolicy::Strict, &*logger)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute { attribute, .. } if attribute == "motto"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("Strict".parse::<SanitizePolicy>().unwrap(), SanitizePolicy::Strict);
        assert!("loose".parse::<SanitizePolicy>().is_err());
        assert_eq!(SanitizePolicy::default().to_string(), "lenient");
    }
}
