//! Relation definitions between entities.

use crate::error::Error;
use rkyv::{Archive, Deserialize, Serialize};
use std::fmt;

/// Cascade string applied to back-references unless the caller overrides it.
pub const DEFAULT_CASCADE: &str = "save-update, merge, delete";

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum Cardinality {
    /// Many owners point to one peer (foreign key on the owner).
    OneToMany,
    /// One owner points to one peer (foreign key on the owner).
    OneToOne,
    /// Many-to-many through an association entity.
    ManyToMany,
}

/// Behavior when a referenced entity is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum DeleteBehavior {
    /// Delete referencing rows.
    Cascade,
    /// Prevent deletion while referencing rows exist.
    Restrict,
    /// Set the foreign key to null on referencing rows.
    SetNull,
}

/// A single cascade directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum CascadeOption {
    /// `save-update`
    SaveUpdate,
    /// `merge`
    Merge,
    /// `refresh-expire`
    RefreshExpire,
    /// `expunge`
    Expunge,
    /// `delete`
    Delete,
    /// `delete-orphan`
    DeleteOrphan,
}

impl CascadeOption {
    fn token(self) -> &'static str {
        match self {
            CascadeOption::SaveUpdate => "save-update",
            CascadeOption::Merge => "merge",
            CascadeOption::RefreshExpire => "refresh-expire",
            CascadeOption::Expunge => "expunge",
            CascadeOption::Delete => "delete",
            CascadeOption::DeleteOrphan => "delete-orphan",
        }
    }
}

/// Parsed cascade string.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct CascadePolicy {
    options: Vec<CascadeOption>,
}

impl CascadePolicy {
    /// Parse a comma separated cascade string such as `"save-update, merge, delete"`.
    pub fn parse(spec: &str) -> Result<Self, Error> {
        let mut options = Vec::new();
        for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let expanded: &[CascadeOption] = match token {
                "save-update" => &[CascadeOption::SaveUpdate],
                "merge" => &[CascadeOption::Merge],
                "refresh-expire" => &[CascadeOption::RefreshExpire],
                "expunge" => &[CascadeOption::Expunge],
                "delete" => &[CascadeOption::Delete],
                "delete-orphan" => &[CascadeOption::DeleteOrphan],
                "all" => &[
                    CascadeOption::SaveUpdate,
                    CascadeOption::Merge,
                    CascadeOption::RefreshExpire,
                    CascadeOption::Expunge,
                    CascadeOption::Delete,
                ],
                other => {
                    return Err(Error::Configuration(format!(
                        "unknown cascade option {other:?} in {spec:?}"
                    )))
                }
            };
            for option in expanded {
                if !options.contains(option) {
                    options.push(*option);
                }
            }
        }
        Ok(Self { options })
    }

    /// A policy without any directive.
    pub fn none() -> Self {
        Self {
            options: Vec::new(),
        }
    }

    /// Check whether a directive is present.
    pub fn contains(&self, option: CascadeOption) -> bool {
        self.options.contains(&option)
    }

    /// Deleting the parent deletes its children.
    pub fn deletes(&self) -> bool {
        self.contains(CascadeOption::Delete)
    }

    /// Detaching a child from its parent deletes the child.
    pub fn deletes_orphans(&self) -> bool {
        self.contains(CascadeOption::DeleteOrphan)
    }
}

impl Default for CascadePolicy {
    fn default() -> Self {
        Self {
            options: vec![
                CascadeOption::SaveUpdate,
                CascadeOption::Merge,
                CascadeOption::Delete,
            ],
        }
    }
}

impl fmt::Display for CascadePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<&str> = self.options.iter().map(|o| o.token()).collect();
        f.write_str(&tokens.join(", "))
    }
}

/// A column reference: `<table>.<column>`.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Table name.
    pub table: String,
    /// Column name.
    pub column: String,
}

/// Equality join between two columns.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct JoinCondition {
    /// Column on the entity side.
    pub left: ColumnRef,
    /// Column on the association side.
    pub right: ColumnRef,
}

impl JoinCondition {
    /// Join `<table>.id` to `<association>.<key>`.
    pub fn new(
        table: impl Into<String>,
        association: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            left: ColumnRef {
                table: table.into(),
                column: super::field::PRIMARY_KEY.to_string(),
            },
            right: ColumnRef {
                table: association.into(),
                column: key.into(),
            },
        }
    }
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}=={}.{}",
            self.left.table, self.left.column, self.right.table, self.right.column
        )
    }
}

/// The association entity behind a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct AssociationDef {
    /// Association entity name.
    pub entity: String,
    /// Foreign key on the association pointing at the owner.
    pub owner_key: String,
    /// Foreign key on the association pointing at the peer.
    pub peer_key: String,
    /// Join from the owner to the association.
    pub primary_join: JoinCondition,
    /// Join from the association to the peer.
    pub secondary_join: JoinCondition,
    /// What happens to association rows when either side is deleted.
    pub on_delete: DeleteBehavior,
}

/// A relation between two entities.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relation identifier: `<owner>.<forward>`.
    pub id: String,
    /// Relation cardinality.
    pub cardinality: Cardinality,
    /// Entity holding the foreign key (left side for many-to-many).
    pub owner: String,
    /// Entity being referenced (right side for many-to-many).
    pub peer: String,
    /// Foreign key field on the owner. `None` for many-to-many.
    pub foreign_key: Option<String>,
    /// Accessor on the owner.
    pub forward: String,
    /// Accessor on the peer, if a back-reference was requested.
    pub backref: Option<String>,
    /// Whether the foreign key may be null.
    pub nullable: bool,
    /// Default value of the foreign key.
    pub default: Option<i64>,
    /// Cascade directives on the back-reference.
    pub cascade: CascadePolicy,
    /// Delete behavior for owners when the peer goes away.
    pub on_delete: DeleteBehavior,
    /// Association entity for many-to-many relations.
    pub association: Option<AssociationDef>,
}

impl RelationDef {
    /// Create a foreign key relation (one-to-many or one-to-one).
    pub fn reference(
        cardinality: Cardinality,
        owner: impl Into<String>,
        peer: impl Into<String>,
        foreign_key: impl Into<String>,
        forward: impl Into<String>,
    ) -> Self {
        let owner = owner.into();
        let forward = forward.into();
        Self {
            id: format!("{owner}.{forward}"),
            cardinality,
            owner,
            peer: peer.into(),
            foreign_key: Some(foreign_key.into()),
            forward,
            backref: None,
            nullable: false,
            default: None,
            cascade: CascadePolicy::default(),
            on_delete: DeleteBehavior::Restrict,
            association: None,
        }
    }

    /// Create a many-to-many relation.
    pub fn many_to_many(
        owner: impl Into<String>,
        peer: impl Into<String>,
        forward: impl Into<String>,
        backref: impl Into<String>,
        association: AssociationDef,
    ) -> Self {
        let owner = owner.into();
        let forward = forward.into();
        Self {
            id: format!("{owner}.{forward}"),
            cardinality: Cardinality::ManyToMany,
            owner,
            peer: peer.into(),
            foreign_key: None,
            forward,
            backref: Some(backref.into()),
            nullable: true,
            default: None,
            cascade: CascadePolicy::none(),
            on_delete: association.on_delete,
            association: Some(association),
        }
    }

    /// Set the back-reference accessor.
    pub fn with_backref(mut self, name: impl Into<String>, cascade: CascadePolicy) -> Self {
        self.backref = Some(name.into());
        self.cascade = cascade;
        self
    }

    /// Set nullability and default of the foreign key.
    pub fn with_key_options(mut self, nullable: bool, default: Option<i64>) -> Self {
        self.nullable = nullable;
        self.default = default;
        self
    }

    /// Set delete behavior.
    pub fn with_on_delete(mut self, on_delete: DeleteBehavior) -> Self {
        self.on_delete = on_delete;
        self
    }

    /// Check if this is a many-to-many relation.
    pub fn is_many_to_many(&self) -> bool {
        self.cardinality == Cardinality::ManyToMany
    }

    /// Entity reached by navigating from `side`.
    pub fn target(&self, side: Side) -> &str {
        match side {
            Side::Owner => &self.peer,
            Side::Peer => &self.owner,
        }
    }

    /// Whether the accessor on `side` yields a collection.
    pub fn is_collection(&self, side: Side) -> bool {
        match (self.cardinality, side) {
            (Cardinality::ManyToMany, _) => true,
            (Cardinality::OneToMany, Side::Peer) => true,
            _ => false,
        }
    }

    /// Name of the accessor on `side`, if one exists.
    pub fn accessor(&self, side: Side) -> Option<&str> {
        match side {
            Side::Owner => Some(&self.forward),
            Side::Peer => self.backref.as_deref(),
        }
    }
}

/// Which end of a relation an accessor lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum Side {
    /// Accessor on the owner (forward).
    Owner,
    /// Accessor on the peer (back-reference).
    Peer,
}

/// A named, navigable relationship handle declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct AccessorDef {
    /// Accessor name.
    pub name: String,
    /// Relation identifier.
    pub relation: String,
    /// End of the relation this accessor belongs to.
    pub side: Side,
}
