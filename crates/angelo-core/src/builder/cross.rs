//! Many-to-many references through association entities.

use super::{ReferenceOptions, SchemaBuilder};
use crate::catalog::{
    AccessorDef, AssociationDef, Cardinality, DeleteBehavior, EntityDef, JoinCondition,
    RelationDef, Side,
};
use crate::error::{Error, Result};

/// Optional arguments of [`SchemaBuilder::add_cross_reference`].
#[derive(Debug, Clone)]
pub struct CrossReferenceOptions {
    names: Option<(String, String)>,
    x_names: Option<(String, String)>,
    x_cls: Option<String>,
    on_delete: DeleteBehavior,
}

impl CrossReferenceOptions {
    /// Defaults: names from the table names, a synthesized association,
    /// association rows deleted along with either side.
    pub fn new() -> Self {
        Self {
            names: None,
            x_names: None,
            x_cls: None,
            on_delete: DeleteBehavior::Cascade,
        }
    }

    /// Names of the association's references to each side (`<name>_id` keys).
    pub fn with_names(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.names = Some((left.into(), right.into()));
        self
    }

    /// Collection accessor names on the left and right entity.
    pub fn with_x_names(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.x_names = Some((left.into(), right.into()));
        self
    }

    /// Use an already registered entity as the association.
    pub fn with_association(mut self, entity: impl Into<String>) -> Self {
        self.x_cls = Some(entity.into());
        self
    }

    /// What happens to association rows when either side is deleted.
    pub fn with_on_delete(mut self, on_delete: DeleteBehavior) -> Self {
        self.on_delete = on_delete;
        self
    }
}

impl Default for CrossReferenceOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Link `cls` and `peer` many-to-many and return the association.
    ///
    /// `cls` gains the collection `plural(names.1)` and `peer` the collection
    /// `plural(names.0)`; appending to one side shows up on the other. Unless an
    /// association entity is supplied, one named `<cls><peer>` is created once
    /// per pair of entities.
    pub fn add_cross_reference(
        &mut self,
        cls: &str,
        peer: &str,
        options: CrossReferenceOptions,
    ) -> Result<AssociationDef> {
        if options.on_delete == DeleteBehavior::SetNull {
            return Err(Error::Configuration(format!(
                "association rows between {cls} and {peer} cannot outlive either side"
            )));
        }
        let cls_def = self.require(cls)?;
        let peer_def = self.require(peer)?;

        let names = options
            .names
            .clone()
            .unwrap_or_else(|| (cls_def.table.clone(), peer_def.table.clone()));
        let x_names = options.x_names.clone().unwrap_or_else(|| {
            (
                self.naming.pluralize(&names.1),
                self.naming.pluralize(&names.0),
            )
        });
        let (cls_table, peer_table) = (cls_def.table.clone(), peer_def.table.clone());

        let id = format!("{cls}.{}", x_names.0);
        if let Some(existing) = self.relations.get(&id) {
            let same = existing.peer == peer
                && existing.backref.as_deref() == Some(x_names.1.as_str())
                && options
                    .x_cls
                    .as_ref()
                    .map_or(true, |x| {
                        existing
                            .association
                            .as_ref()
                            .is_some_and(|a| &a.entity == x)
                    });
            return match (&existing.association, same) {
                (Some(association), true) => {
                    self.logger
                        .log(&format!("Cross reference {id} already declared"));
                    Ok(association.clone())
                }
                _ => Err(Error::ambiguous(
                    cls,
                    &x_names.0,
                    format!("already declared towards {}", existing.peer),
                )),
            };
        }

        if names.0 == names.1 {
            return Err(Error::ambiguous(
                cls,
                &names.0,
                "both sides of the association would share one foreign key",
            ));
        }
        if cls == peer && x_names.0 == x_names.1 {
            return Err(Error::ambiguous(
                cls,
                &x_names.0,
                "both directions of a self reference need distinct names",
            ));
        }
        self.ensure_member_free(cls, &x_names.0)?;
        self.ensure_member_free(peer, &x_names.1)?;

        let pair = if cls <= peer {
            (cls.to_string(), peer.to_string())
        } else {
            (peer.to_string(), cls.to_string())
        };
        let x_cls = match &options.x_cls {
            Some(x_cls) => {
                let entity = self.require_mut(x_cls)?;
                entity.association = true;
                x_cls.clone()
            }
            None => match self.associations.get(&pair) {
                Some(existing) => {
                    return Err(Error::ambiguous(
                        cls,
                        &x_names.0,
                        format!(
                            "{cls} and {peer} are already associated through {existing}; \
                             supply a distinct association entity"
                        ),
                    ))
                }
                None => {
                    let mut entity = self.base.bind(EntityDef::new(format!("{cls}{peer}")));
                    entity.association = true;
                    self.register(entity)?.name.clone()
                }
            },
        };

        let owner_key = format!("{}_id", names.0);
        let peer_key = format!("{}_id", names.1);
        let x_table = self.require(&x_cls)?.table.clone();

        for (side, name) in [(cls, &names.0), (peer, &names.1)] {
            self.add_foreign_key_reference(
                Cardinality::OneToMany,
                &x_cls,
                side,
                ReferenceOptions::new()
                    .with_name(name.clone())
                    .without_backref()
                    .with_on_delete(options.on_delete),
            )?;
        }

        let association = AssociationDef {
            entity: x_cls.clone(),
            owner_key: owner_key.clone(),
            peer_key: peer_key.clone(),
            primary_join: JoinCondition::new(cls_table, &x_table, owner_key),
            secondary_join: JoinCondition::new(peer_table, &x_table, peer_key),
            on_delete: options.on_delete,
        };
        let relation =
            RelationDef::many_to_many(cls, peer, &x_names.0, &x_names.1, association.clone());

        self.require_mut(cls)?.accessors.push(AccessorDef {
            name: x_names.0.clone(),
            relation: id.clone(),
            side: Side::Owner,
        });
        self.require_mut(peer)?.accessors.push(AccessorDef {
            name: x_names.1.clone(),
            relation: id.clone(),
            side: Side::Peer,
        });
        self.relations.insert(id, relation);
        if options.x_cls.is_none() {
            self.associations.insert(pair, x_cls.clone());
        }

        self.logger.log(&format!(
            "Cross reference: {cls}.{} <-> {peer}.{} via {x_cls} ({} / {})",
            x_names.0, x_names.1, association.primary_join, association.secondary_join
        ));
        Ok(association)
    }
}
