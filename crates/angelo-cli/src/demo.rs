//! The demo model and its seed data.

use angelo_core::{
    AngeloConfig, BaseModel, CrossReferenceOptions, Database, EntityDef, FieldDef, FieldType,
    Instance, Introspectable, Kwargs, ReferenceOptions, Result, Schema, Session, StorageStrategy,
};
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;

/// Group, Company and the polymorphic User / Employee hierarchy.
pub fn build_schema(config: &AngeloConfig) -> Result<Arc<Schema>> {
    let mut builder = config.schema_builder()?;
    let base = BaseModel::new();

    builder.add_entity(
        EntityDef::new("Group").with_field(FieldDef::new("abbr", FieldType::string(6))),
    )?;
    builder.make_polymorphic_top(
        &base,
        EntityDef::new("User").with_field(FieldDef::new("email", FieldType::string(30))),
        "User Employee".split_whitespace(),
    )?;
    builder.add_cross_reference("User", "Group", CrossReferenceOptions::new())?;
    builder.add_entity(
        EntityDef::new("Company").with_field(FieldDef::new("name", FieldType::string(30))),
    )?;
    builder.derive_model(
        "User",
        EntityDef::new("Employee").with_field(FieldDef::optional("salary", FieldType::money())),
        None,
        StorageStrategy::SingleTable,
    )?;
    builder.add_reference("Employee", "Company", ReferenceOptions::new())?;
    builder.build()
}

/// Recreate the tables, insert the demo rows and describe the company.
pub fn seed(db: &Database) -> Result<String> {
    db.drop_all()?;
    db.create_all()?;

    let mut session = db.session();
    let lifecycle = db.lifecycle();

    let mut groups = Vec::new();
    for abbr in ["HRM", "R&D"] {
        groups.push(lifecycle.create(&mut session, "Group", Kwargs::new().with("abbr", abbr))?);
    }
    let company = lifecycle.create(
        &mut session,
        "Company",
        Kwargs::new().with("name", "Acme Corporation"),
    )?;
    for (email, group) in ["anna@acme.example", "bert@acme.example"]
        .into_iter()
        .zip(groups.iter_mut())
    {
        let employee = lifecycle.create(
            &mut session,
            "Employee",
            Kwargs::new().with("email", email).with("company", company.id()),
        )?;
        session.append(&employee, "groups", group)?;
    }
    session.commit()?;

    describe_company(&session, &company)
}

/// `<name>: <email> (<groups>), ...`
fn describe_company(session: &Session, company: &Instance) -> Result<String> {
    let mut employees = Vec::new();
    for employee in session.many(company, "employees")? {
        let groups: Vec<String> = session
            .many(&employee, "groups")?
            .iter()
            .map(|g| text(g, "abbr"))
            .collect();
        employees.push(format!("{} ({})", text(&employee, "email"), groups.join(", ")));
    }
    Ok(format!("{}: {}", text(company, "name"), employees.join(", ")))
}

fn text(instance: &Instance, field: &str) -> String {
    instance
        .value(field)
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// Instances of one entity.
#[derive(Debug, Serialize)]
pub struct EntityDump {
    pub entity: String,
    pub count: usize,
    pub instances: Vec<serde_json::Value>,
}

/// Every instance of every entity, as JSON objects.
pub fn dump(db: &Database) -> Result<Vec<EntityDump>> {
    let session = db.session();
    let mut dumps = Vec::new();
    for entity in db.schema().entity_names() {
        let instances = session
            .all(entity)?
            .iter()
            .map(|instance| instance.to_json(db.schema(), ""))
            .collect::<Result<Vec<_>>>()?;
        dumps.push(EntityDump {
            entity: entity.to_string(),
            count: instances.len(),
            instances,
        });
    }
    Ok(dumps)
}

/// One block per entity listing its table, columns and relationships.
pub fn describe(db: &Database) -> Result<String> {
    let mut out = String::new();
    for entity in db.schema().entity_names() {
        let view = db.view(entity)?;
        let join = |names: std::collections::BTreeSet<String>| {
            names.into_iter().collect::<Vec<_>>().join(", ")
        };
        let _ = writeln!(out, "{entity} (table {})", view.entity().table);
        let _ = writeln!(out, "  columns: {}", join(view.columns(false, "")));
        let _ = writeln!(out, "  relationships: {}", join(view.relationships("")));
    }
    Ok(out)
}
