//! Core error types.

use thiserror::Error;

/// Errors raised by the schema builder and the object lifecycle.
#[derive(Debug, Error)]
pub enum Error {
    /// A declaration refers to something that cannot be resolved.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A synthesized member collides with an existing one.
    #[error("ambiguous reference {entity}.{name}: {reason}")]
    AmbiguousReference {
        /// Entity that would receive the member.
        entity: String,
        /// Name of the colliding member.
        name: String,
        /// What it collides with.
        reason: String,
    },

    /// A polymorphic identity outside the root's permitted set.
    #[error("invalid identity {identity:?} for {root} (allowed: {allowed:?})")]
    InvalidIdentity {
        /// Root of the polymorphic hierarchy.
        root: String,
        /// Offending identity.
        identity: String,
        /// Identities the root permits.
        allowed: Vec<String>,
    },

    /// Entity not present in the schema.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Attribute not declared on the entity.
    #[error("unknown attribute {entity}.{attribute}")]
    UnknownAttribute {
        /// Entity name.
        entity: String,
        /// Attribute name.
        attribute: String,
    },

    /// Relationship accessor not declared on the entity.
    #[error("unknown relationship {entity}.{name}")]
    UnknownRelationship {
        /// Entity name.
        entity: String,
        /// Accessor name.
        name: String,
    },

    /// Failure raised by a lifecycle hook.
    #[error("hook failed: {0}")]
    Hook(String),

    /// Failure raised by the persistence engine.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors raised by the persistence engine. These pass through the lifecycle unchanged.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Table has not been created.
    #[error("no such table: {0}")]
    UnknownTable(String),

    /// Record not found.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity name.
        entity: String,
        /// Primary key.
        id: i64,
    },

    /// A lookup expecting exactly one row matched none.
    #[error("{entity}: no row with {field} = {value}")]
    NoResult {
        /// Entity name.
        entity: String,
        /// Field used for the lookup.
        field: String,
        /// Value looked for.
        value: String,
    },

    /// A lookup expecting at most one row matched several.
    #[error("{entity}: expected one row for {field}, found {count}")]
    MultipleResults {
        /// Entity name.
        entity: String,
        /// Field used for the lookup.
        field: String,
        /// Number of matching rows.
        count: usize,
    },

    /// Integrity constraint violated.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Cascade recursion went too deep.
    #[error("maximum cascade depth exceeded: {depth}")]
    CascadeDepthExceeded {
        /// Depth reached.
        depth: usize,
    },
}

impl Error {
    /// Build an [`Error::AmbiguousReference`].
    pub fn ambiguous(
        entity: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::AmbiguousReference {
            entity: entity.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error was raised while declaring the schema.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::AmbiguousReference { .. }
                | Error::InvalidIdentity { .. }
                | Error::UnknownEntity(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
