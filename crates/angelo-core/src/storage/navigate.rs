//! Relationship navigation through accessor names.

use super::Session;
use crate::catalog::{AssociationDef, RelationDef, Side};
use crate::error::{Error, PersistenceError, Result};
use crate::instance::Instance;
use crate::value::Value;

/// What an accessor resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// A reference or one-to-one back-reference.
    One(Option<Instance>),
    /// A collection.
    Many(Vec<Instance>),
}

impl Session {
    /// Resolve accessor `name` on `instance`.
    pub fn related(&self, instance: &Instance, name: &str) -> Result<Related> {
        let (accessor, relation) = self.schema().accessor(instance.entity(), name)?;
        let side = accessor.side;

        if let Some(association) = &relation.association {
            let Some(id) = instance.id() else {
                return Ok(Related::Many(Vec::new()));
            };
            let (near_key, far_key) = keys(association, side);
            let mut related = Vec::new();
            for link in self.all_by(&association.entity, near_key, &Value::Int64(id))? {
                if let Some(far_id) = link.value(far_key).as_i64() {
                    related.extend(self.get(relation.target(side), far_id)?);
                }
            }
            return Ok(Related::Many(related));
        }

        let foreign_key = foreign_key(relation)?;
        match side {
            Side::Owner => match instance.value(foreign_key).as_i64() {
                Some(target) => Ok(Related::One(self.get(&relation.peer, target)?)),
                None => Ok(Related::One(None)),
            },
            Side::Peer => {
                let referencing = match instance.id() {
                    Some(id) => self.all_by(&relation.owner, foreign_key, &Value::Int64(id))?,
                    None => Vec::new(),
                };
                if relation.is_collection(side) {
                    Ok(Related::Many(referencing))
                } else {
                    Ok(Related::One(referencing.into_iter().next()))
                }
            }
        }
    }

    /// Resolve a single-valued accessor.
    pub fn one(&self, instance: &Instance, name: &str) -> Result<Option<Instance>> {
        match self.related(instance, name)? {
            Related::One(found) => Ok(found),
            Related::Many(_) => Err(Error::Configuration(format!(
                "{}.{name} is a collection",
                instance.entity()
            ))),
        }
    }

    /// Resolve a collection accessor.
    pub fn many(&self, instance: &Instance, name: &str) -> Result<Vec<Instance>> {
        match self.related(instance, name)? {
            Related::Many(found) => Ok(found),
            Related::One(_) => Err(Error::Configuration(format!(
                "{}.{name} is not a collection",
                instance.entity()
            ))),
        }
    }

    /// Add `item` to the collection `name` of `instance`.
    ///
    /// An unsaved item is added to the session first. For many-to-many
    /// collections the association row is created unless the link exists.
    pub fn append(&mut self, instance: &Instance, name: &str, item: &mut Instance) -> Result<()> {
        let (side, relation) = self.collection(instance, name, item)?;
        let id = saved_id(instance)?;
        if item.id().is_none() {
            self.add(item)?;
        }
        let item_id = saved_id(item)?;

        if let Some(association) = &relation.association {
            if !self.links(association, side, id, item_id)?.is_empty() {
                return Ok(());
            }
            let (near_key, far_key) = keys(association, side);
            let mut link = Instance::new(&association.entity)
                .with(near_key, id)
                .with(far_key, item_id);
            self.add(&mut link)?;
            return Ok(());
        }

        item.set(foreign_key(&relation)?, id);
        self.add(item)?;
        Ok(())
    }

    /// Take `item` out of the collection `name` of `instance`.
    ///
    /// Many-to-many links are deleted. A detached child is deleted when the
    /// collection cascades `delete-orphan`, gets a null key when the key is
    /// nullable, and is refused otherwise. Returns whether anything changed.
    pub fn remove(&mut self, instance: &Instance, name: &str, item: &mut Instance) -> Result<bool> {
        let (side, relation) = self.collection(instance, name, item)?;
        let (Some(id), Some(item_id)) = (instance.id(), item.id()) else {
            return Ok(false);
        };

        if let Some(association) = &relation.association {
            let links = self.links(association, side, id, item_id)?;
            for link in &links {
                self.delete(link)?;
            }
            return Ok(!links.is_empty());
        }

        let foreign_key = foreign_key(&relation)?;
        if !item.value(foreign_key).same_as(&Value::Int64(id)) {
            return Ok(false);
        }
        if relation.cascade.deletes_orphans() {
            self.delete(item)?;
        } else if relation.nullable {
            item.set(foreign_key, Value::Null);
            self.add(item)?;
        } else {
            return Err(PersistenceError::Constraint(format!(
                "{}.{foreign_key} may not be null; removing it from {}.{name} needs delete-orphan",
                relation.owner,
                instance.entity()
            ))
            .into());
        }
        Ok(true)
    }

    /// Point reference `name` of `instance` at `target`, or clear it.
    pub fn assign(
        &mut self,
        instance: &mut Instance,
        name: &str,
        target: Option<&Instance>,
    ) -> Result<()> {
        let (accessor, relation) = self.schema().accessor(instance.entity(), name)?;
        if accessor.side != Side::Owner || relation.association.is_some() {
            return Err(Error::Configuration(format!(
                "{}.{name} can only be changed from {}",
                instance.entity(),
                relation.owner
            )));
        }
        let foreign_key = foreign_key(relation)?.to_string();
        let value = match target {
            Some(target) => {
                if !self.schema().is_a(target.entity(), &relation.peer) {
                    return Err(mismatch(instance, name, target));
                }
                Value::Int64(saved_id(target)?)
            }
            None => Value::Null,
        };
        instance.set(foreign_key, value);
        self.add(instance)?;
        Ok(())
    }

    /// Check that `name` is a collection of `instance` that can hold `item`.
    fn collection(
        &self,
        instance: &Instance,
        name: &str,
        item: &Instance,
    ) -> Result<(Side, RelationDef)> {
        let (accessor, relation) = self.schema().accessor(instance.entity(), name)?;
        if !relation.is_collection(accessor.side) {
            return Err(Error::Configuration(format!(
                "{}.{name} is not a collection",
                instance.entity()
            )));
        }
        if !self
            .schema()
            .is_a(item.entity(), relation.target(accessor.side))
        {
            return Err(mismatch(instance, name, item));
        }
        Ok((accessor.side, relation.clone()))
    }

    /// Association rows linking `id` (on `side`) to `far_id`.
    fn links(
        &self,
        association: &AssociationDef,
        side: Side,
        id: i64,
        far_id: i64,
    ) -> Result<Vec<Instance>> {
        let (near_key, far_key) = keys(association, side);
        Ok(self
            .all_by(&association.entity, near_key, &Value::Int64(id))?
            .into_iter()
            .filter(|link| link.value(far_key).same_as(&Value::Int64(far_id)))
            .collect())
    }
}

/// Association keys as seen from `side`: `(near, far)`.
fn keys(association: &AssociationDef, side: Side) -> (&str, &str) {
    match side {
        Side::Owner => (&association.owner_key, &association.peer_key),
        Side::Peer => (&association.peer_key, &association.owner_key),
    }
}

fn foreign_key(relation: &RelationDef) -> Result<&str> {
    relation
        .foreign_key
        .as_deref()
        .ok_or_else(|| Error::Configuration(format!("{} has no foreign key", relation.id)))
}

fn saved_id(instance: &Instance) -> Result<i64> {
    instance.id().ok_or_else(|| {
        PersistenceError::Constraint(format!("{instance} has never been added")).into()
    })
}

fn mismatch(instance: &Instance, name: &str, item: &Instance) -> Error {
    PersistenceError::Constraint(format!(
        "{item} does not belong in {}.{name}",
        instance.entity()
    ))
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BaseModel, CrossReferenceOptions, ReferenceOptions, SchemaBuilder};
    use crate::catalog::{EntityDef, FieldDef, FieldType, StorageStrategy};
    use crate::logging::SilentLogger;
    use crate::storage::{SledStore, StorageConfig};
    use std::sync::Arc;

    fn session() -> Session {
        let mut builder = SchemaBuilder::new();
        let base = BaseModel::new();
        builder
            .add_entity(
                EntityDef::new("Group").with_field(FieldDef::new("abbr", FieldType::string(6))),
            )
            .unwrap();
        builder
            .add_entity(
                EntityDef::new("Company").with_field(FieldDef::new("name", FieldType::string(30))),
            )
            .unwrap();
        builder
            .add_entity(EntityDef::new("Desk").with_field(FieldDef::new("spot", FieldType::text())))
            .unwrap();
        builder
            .make_polymorphic_top(
                &base,
                EntityDef::new("User").with_field(FieldDef::new("email", FieldType::string(30))),
                ["User", "Employee"],
            )
            .unwrap();
        builder
            .derive_model("User", EntityDef::new("Employee"), None, StorageStrategy::SingleTable)
            .unwrap();
        builder
            .add_cross_reference("User", "Group", CrossReferenceOptions::new())
            .unwrap();
        builder
            .add_reference(
                "Employee",
                "Company",
                ReferenceOptions::new()
                    .with_nullable(true)
                    .with_rev_cascade("save-update, merge"),
            )
            .unwrap();
        builder
            .add_single_reference("Desk", "Employee", ReferenceOptions::new())
            .unwrap();
        let schema = builder.build().unwrap();

        let store = SledStore::open(&StorageConfig::temporary()).unwrap();
        let session = Session::new(schema, Arc::new(store), Arc::new(SilentLogger));
        session.create_all().unwrap();
        session
    }

    fn add(session: &mut Session, instance: Instance) -> Instance {
        let mut instance = instance;
        session.add(&mut instance).unwrap();
        instance
    }

    #[test]
    fn test_many_to_many_is_mutual() {
        let mut session = session();
        let mut hrm = add(&mut session, Instance::new("Group").with("abbr", "HRM"));
        let ann = add(&mut session, Instance::new("Employee").with("email", "ann@acme.com"));

        session.append(&ann, "groups", &mut hrm).unwrap();
        session.append(&ann, "groups", &mut hrm).unwrap();

        assert_eq!(session.many(&ann, "groups").unwrap(), vec![hrm.clone()]);
        assert_eq!(session.many(&hrm, "users").unwrap(), vec![ann.clone()]);
        assert_eq!(session.all("UserGroup").unwrap().len(), 1);

        let mut ann_again = ann.clone();
        assert!(session.remove(&hrm, "users", &mut ann_again).unwrap());
        assert!(session.many(&ann, "groups").unwrap().is_empty());
    }

    #[test]
    fn test_self_reference_uses_both_keys() {
        let mut builder = SchemaBuilder::new();
        builder
            .add_entity(
                EntityDef::new("Person").with_field(FieldDef::new("name", FieldType::text())),
            )
            .unwrap();
        builder
            .add_cross_reference(
                "Person",
                "Person",
                CrossReferenceOptions::new().with_names("follower", "followee"),
            )
            .unwrap();
        let store = SledStore::open(&StorageConfig::temporary()).unwrap();
        let mut session = Session::new(
            builder.build().unwrap(),
            Arc::new(store),
            Arc::new(SilentLogger),
        );
        session.create_all().unwrap();

        let ann = add(&mut session, Instance::new("Person").with("name", "Ann"));
        let mut bob = add(&mut session, Instance::new("Person").with("name", "Bob"));
        session.append(&ann, "followees", &mut bob).unwrap();

        let ids = |people: Vec<Instance>| {
            people.iter().filter_map(Instance::id).collect::<Vec<_>>()
        };
        assert_eq!(ids(session.many(&ann, "followees").unwrap()), vec![2]);
        assert_eq!(ids(session.many(&bob, "followers").unwrap()), vec![1]);
        assert!(session.many(&ann, "followers").unwrap().is_empty());
        assert!(session.many(&bob, "followees").unwrap().is_empty());

        let link = session.require("PersonPerson", 1).unwrap();
        assert_eq!(link.value("follower_id"), Value::Int64(1));
        assert_eq!(link.value("followee_id"), Value::Int64(2));
    }

    #[test]
    fn test_append_adds_unsaved_items() {
        let mut session = session();
        let ann = add(&mut session, Instance::new("Employee").with("email", "ann@acme.com"));
        let mut rnd = Instance::new("Group").with("abbr", "R&D");

        session.append(&ann, "groups", &mut rnd).unwrap();
        assert_eq!(rnd.id(), Some(1));
        assert_eq!(session.many(&ann, "groups").unwrap().len(), 1);
    }

    #[test]
    fn test_reference_and_back_reference() {
        let mut session = session();
        let acme = add(&mut session, Instance::new("Company").with("name", "ACME"));
        let mut ann = add(&mut session, Instance::new("Employee").with("email", "ann@acme.com"));

        assert_eq!(session.one(&ann, "company").unwrap(), None);
        session.assign(&mut ann, "company", Some(&acme)).unwrap();
        assert_eq!(session.one(&ann, "company").unwrap(), Some(acme.clone()));
        assert_eq!(session.many(&acme, "employees").unwrap(), vec![ann.clone()]);

        assert!(session.remove(&acme, "employees", &mut ann).unwrap());
        assert_eq!(ann.value("company_id"), Value::Null);
        assert!(session.many(&acme, "employees").unwrap().is_empty());
    }

    #[test]
    fn test_single_back_reference() {
        let mut session = session();
        let ann = add(&mut session, Instance::new("Employee").with("email", "ann@acme.com"));
        let desk = add(
            &mut session,
            Instance::new("Desk").with("spot", "A1").with_ref("employee", &ann),
        );

        assert_eq!(session.one(&ann, "desk").unwrap(), Some(desk));
        assert!(session.many(&ann, "desk").is_err());

        let mut second = Instance::new("Desk").with("spot", "B2").with_ref("employee", &ann);
        assert!(session.add(&mut second).is_err());
    }

    #[test]
    fn test_type_checks() {
        let mut session = session();
        let acme = add(&mut session, Instance::new("Company").with("name", "ACME"));
        let mut hrm = add(&mut session, Instance::new("Group").with("abbr", "HRM"));
        let mut user = add(&mut session, Instance::new("User").with("email", "u@acme.com"));

        assert!(session.append(&acme, "employees", &mut hrm).is_err());
        assert!(matches!(
            session.assign(&mut user, "company", Some(&acme)),
            Err(Error::UnknownRelationship { .. })
        ));
        assert!(session.one(&acme, "employees").is_err());
    }
}
