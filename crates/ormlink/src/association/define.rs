//! Association declaration.
//!
//! Declaring an association adds the storage it needs (foreign-key columns,
//! constraints, join tables) to the models involved and registers the
//! descriptors. Every check runs before anything is mutated, so a rejected
//! declaration leaves both models untouched.

use ormlink_core::{
    AssociationInfo, AssociationKind, Error, ForeignKey, JoinTableInfo, Linkage, Property,
    PropertyType, ReferentialAction, Result, TableSchema,
};

use super::{Association, AssociationOptions};
use crate::model::Model;

fn ensure_free(model: &Model, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::definition(format!(
            "{}: association name must not be empty",
            model.name()
        )));
    }
    if model.name_taken(name) {
        return Err(Error::definition(format!(
            "{}: {name} is already a property or association",
            model.name()
        )));
    }
    Ok(())
}

/// Column types referencing `model`'s key, positionally.
fn key_reference_types(model: &Model) -> Vec<PropertyType> {
    model
        .key()
        .iter()
        .map(|k| {
            model
                .property(k)
                .map_or(PropertyType::Integer, |p| p.kind.reference_type())
        })
        .collect()
}

fn check_width(context: &str, columns: &[String], key: &[String]) -> Result<()> {
    if columns.len() != key.len() {
        return Err(Error::definition(format!(
            "{context}: {} link column(s) for a {}-column key",
            columns.len(),
            key.len()
        )));
    }
    Ok(())
}

/// Add `columns` to `model` unless already declared; declared columns must
/// have the referencing type.
fn add_link_columns(model: &Model, columns: &[String], types: &[PropertyType]) -> Result<()> {
    for (column, kind) in columns.iter().zip(types) {
        if let Some(existing) = model.property(column) {
            if existing.kind.reference_type() != *kind {
                return Err(Error::definition(format!(
                    "{}: column {column} is {:?}, link needs {kind:?}",
                    model.name(),
                    existing.kind
                )));
            }
        }
    }
    for (column, kind) in columns.iter().zip(types) {
        if !model.has_property(column) {
            model.add_property(Property::new(column, *kind));
        }
    }
    Ok(())
}

/// `source.has_one(name, target)`: the source row stores the target key.
///
/// The reverse side, if named, is many-valued: many sources may point at one
/// target.
pub(crate) fn has_one(
    source: &Model,
    name: &str,
    target: &Model,
    options: AssociationOptions,
) -> Result<()> {
    ensure_free(source, name)?;
    let settings = &source.ctx().settings;
    let columns = options.field.clone().unwrap_or_else(|| {
        target
            .key()
            .iter()
            .map(|k| settings.foreign_key(name, k))
            .collect()
    });
    let context = format!("{}.{name}", source.name());
    check_width(&context, &columns, target.key())?;
    if let Some(reverse) = &options.reverse {
        ensure_free(target, reverse)?;
        if source == target && reverse == name {
            return Err(Error::definition(format!(
                "{context}: reverse must differ from the association name"
            )));
        }
    }

    add_link_columns(source, &columns, &key_reference_types(target))?;
    if options.unique {
        source.add_unique(columns.clone());
    }
    source.add_foreign_key(
        ForeignKey::new(columns.clone(), target.table(), target.key().to_vec())
            .on_delete(options.on_delete.unwrap_or(ReferentialAction::SetNull)),
    );

    let mut forward = AssociationInfo::new(
        name,
        AssociationKind::HasOne,
        source.table(),
        target.table(),
        Linkage::LocalKey {
            columns: columns.clone(),
        },
    )
    .required(options.required);
    if let Some(reverse) = &options.reverse {
        forward = forward.reverse(reverse);
    }
    source.add_association(Association::new(forward, target, options.hooks.clone()));

    if let Some(reverse) = &options.reverse {
        let back = AssociationInfo::new(
            reverse,
            AssociationKind::HasOne,
            target.table(),
            source.table(),
            Linkage::RemoteKey {
                columns: columns.clone(),
                owned: false,
            },
        )
        .reversed(true)
        .reverse(name);
        target.add_association(Association::new(back, source, options.hooks.clone()));
    }

    tracing::info!(
        source = source.name(),
        target = target.name(),
        association = name,
        reverse = ?options.reverse,
        columns = ?columns,
        "Defined hasOne association"
    );
    Ok(())
}

/// `source.has_many(name, target)`: a join table holds (source key, target
/// key) pairs. The reverse side is many-valued as well.
pub(crate) fn has_many(
    source: &Model,
    name: &str,
    target: &Model,
    options: AssociationOptions,
) -> Result<()> {
    ensure_free(source, name)?;
    let settings = &source.ctx().settings;
    let source_table = source.table();
    let table = options
        .merge_table
        .clone()
        .unwrap_or_else(|| settings.join_table(&source_table, name));
    let source_columns = options.merge_id.clone().unwrap_or_else(|| {
        source
            .key()
            .iter()
            .map(|k| format!("{source_table}_{k}"))
            .collect()
    });
    let target_columns = options.field.clone().unwrap_or_else(|| {
        target
            .key()
            .iter()
            .map(|k| settings.foreign_key(name, k))
            .collect()
    });
    let context = format!("{}.{name}", source.name());
    check_width(&context, &source_columns, source.key())?;
    check_width(&context, &target_columns, target.key())?;
    if source_columns.iter().any(|c| target_columns.contains(c)) {
        return Err(Error::definition(format!(
            "{context}: join columns overlap: {source_columns:?} / {target_columns:?}"
        )));
    }
    if source.join_tables().iter().any(|j| j.name == table) {
        return Err(Error::definition(format!(
            "{context}: join table {table} already exists"
        )));
    }
    if let Some(reverse) = &options.reverse {
        ensure_free(target, reverse)?;
    }

    let mut join = TableSchema::new(&table);
    for (column, kind) in source_columns.iter().zip(key_reference_types(source)) {
        join.add_column(Property::new(column, kind).required());
    }
    for (column, kind) in target_columns.iter().zip(key_reference_types(target)) {
        join.add_column(Property::new(column, kind).required());
    }
    join.key = source_columns
        .iter()
        .chain(&target_columns)
        .cloned()
        .collect();
    let join = join
        .foreign_key(
            ForeignKey::new(source_columns.clone(), &source_table, source.key().to_vec())
                .on_delete(ReferentialAction::Cascade),
        )
        .foreign_key(
            ForeignKey::new(target_columns.clone(), target.table(), target.key().to_vec())
                .on_delete(ReferentialAction::Cascade),
        );
    source.add_join_table(join);

    let info = JoinTableInfo::new(&table, source_columns, target_columns);
    let mut forward = AssociationInfo::new(
        name,
        AssociationKind::HasMany,
        &source_table,
        target.table(),
        Linkage::JoinTable(info.clone()),
    )
    .required(options.required);
    if let Some(reverse) = &options.reverse {
        forward = forward.reverse(reverse);
    }
    source.add_association(Association::new(forward, target, options.hooks.clone()));

    if let Some(reverse) = &options.reverse {
        let back = AssociationInfo::new(
            reverse,
            AssociationKind::HasMany,
            target.table(),
            &source_table,
            Linkage::JoinTable(info.flipped()),
        )
        .reversed(true)
        .reverse(name);
        target.add_association(Association::new(back, source, options.hooks.clone()));
    }

    tracing::info!(
        source = source.name(),
        target = target.name(),
        association = name,
        join_table = %table,
        "Defined hasMany association"
    );
    Ok(())
}

/// `source.extends_to(name, target)`: the target's key is the source key, so
/// an extension row shares its source row's identity and dies with it.
///
/// Driver-generated target key columns are retyped to reference the source
/// key; declared ones must already have the referencing type.
pub(crate) fn extends_to(
    source: &Model,
    name: &str,
    target: &Model,
    options: AssociationOptions,
) -> Result<()> {
    ensure_free(source, name)?;
    let context = format!("{}.{name}", source.name());
    if source == target {
        return Err(Error::definition(format!(
            "{context}: a model cannot extend itself"
        )));
    }
    let columns = target.key().to_vec();
    if let Some(field) = &options.field {
        if *field != columns {
            return Err(Error::definition(format!(
                "{context}: extension rows are keyed by {columns:?}, not {field:?}"
            )));
        }
    }
    check_width(&context, &columns, source.key())?;
    if target
        .schema()
        .foreign_keys
        .iter()
        .any(|fk| fk.columns == columns)
    {
        return Err(Error::definition(format!(
            "{context}: {} already extends another model",
            target.name()
        )));
    }
    let types = key_reference_types(source);
    let mut retype = Vec::new();
    for (column, kind) in columns.iter().zip(&types) {
        let existing = target
            .property(column)
            .map_or(PropertyType::Serial, |p| p.kind);
        if existing == PropertyType::Serial && *kind != PropertyType::Serial {
            retype.push((column.clone(), *kind));
        } else if existing.reference_type() != *kind {
            return Err(Error::definition(format!(
                "{}: key column {column} is {existing:?}, extension needs {kind:?}",
                target.name()
            )));
        }
    }
    if let Some(reverse) = &options.reverse {
        ensure_free(target, reverse)?;
    }

    for (column, kind) in retype {
        target.retype_property(&column, kind);
    }
    target.add_foreign_key(
        ForeignKey::new(columns.clone(), source.table(), source.key().to_vec())
            .on_delete(options.on_delete.unwrap_or(ReferentialAction::Cascade)),
    );

    let mut forward = AssociationInfo::new(
        name,
        AssociationKind::ExtendsTo,
        source.table(),
        target.table(),
        Linkage::RemoteKey {
            columns: columns.clone(),
            owned: true,
        },
    )
    .required(true);
    if let Some(reverse) = &options.reverse {
        forward = forward.reverse(reverse);
    }
    source.add_association(Association::new(forward, target, options.hooks.clone()));

    if let Some(reverse) = &options.reverse {
        let back = AssociationInfo::new(
            reverse,
            AssociationKind::ExtendsTo,
            target.table(),
            source.table(),
            Linkage::LocalKey {
                columns: columns.clone(),
            },
        )
        .reversed(true)
        .reverse(name)
        .required(options.required)
        .read_only();
        target.add_association(Association::new(back, source, options.hooks.clone()));
    }

    tracing::info!(
        source = source.name(),
        target = target.name(),
        association = name,
        columns = ?columns,
        "Defined extendsTo association"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ormlink_core::{AccessorKind, Cardinality};
    use ormlink_memory::MemoryDriver;

    use super::*;
    use crate::model::ModelOptions;
    use crate::registry::Registry;

    fn models() -> (Registry, Model, Model) {
        let registry = Registry::new(Arc::new(MemoryDriver::relational()));
        let person = registry
            .define(
                "person",
                vec![Property::new("name", PropertyType::Text)],
                ModelOptions::new(),
            )
            .unwrap();
        let pet = registry
            .define(
                "pet",
                vec![Property::new("name", PropertyType::Text)],
                ModelOptions::new(),
            )
            .unwrap();
        (registry, person, pet)
    }

    #[test]
    fn test_has_one_adds_foreign_key_and_reverse() {
        let (_registry, person, pet) = models();
        person
            .has_one("pet", &pet, AssociationOptions::new().reverse("owners"))
            .unwrap();

        let fk = person.property("pet_id").unwrap();
        assert_eq!(fk.kind, PropertyType::Integer);
        let schema = person.schema();
        assert_eq!(schema.foreign_keys[0].references, "pet");
        assert_eq!(schema.foreign_keys[0].on_delete, ReferentialAction::SetNull);

        let owners = pet.association("owners").unwrap();
        assert!(owners.info.reversed);
        assert_eq!(owners.info.cardinality, Cardinality::Many);
        assert!(pet.has_accessor("setOwnersAsync"));
        assert!(pet.has_accessor("addOwners"));
        assert!(person.has_accessor("getPet"));
        assert!(!person.has_accessor("addPet"));
    }

    #[test]
    fn test_has_one_rejects_conflicts_without_changes() {
        let (_registry, person, pet) = models();
        assert!(matches!(
            person.has_one("name", &pet, AssociationOptions::new()),
            Err(Error::Definition(_))
        ));
        assert!(matches!(
            person.has_one("pet", &pet, AssociationOptions::new().reverse("name")),
            Err(Error::Definition(_))
        ));
        assert!(matches!(
            person.has_one("pet", &pet, AssociationOptions::new().field(["a", "b"])),
            Err(Error::Definition(_))
        ));
        assert!(!person.has_property("pet_id"));
        assert!(person.associations().is_empty());
    }

    #[test]
    fn test_has_many_builds_join_table() {
        let (_registry, person, pet) = models();
        person
            .has_many("pets", &pet, AssociationOptions::new().reverse("keepers"))
            .unwrap();

        let joins = person.join_tables();
        assert_eq!(joins.len(), 1);
        let join = &joins[0];
        assert_eq!(join.name, "person_pets");
        assert_eq!(join.key, vec!["person_id".to_string(), "pets_id".to_string()]);
        assert_eq!(join.foreign_keys.len(), 2);

        let keepers = pet.association("keepers").unwrap();
        match &keepers.info.linkage {
            Linkage::JoinTable(info) => {
                assert_eq!(info.source_columns, vec!["pets_id".to_string()]);
            }
            other => panic!("unexpected linkage {other:?}"),
        }
    }

    #[test]
    fn test_extends_to_links_through_the_target_key() {
        let (registry, person, _pet) = models();
        let address = registry
            .define(
                "address",
                vec![Property::new("city", PropertyType::Text)],
                ModelOptions::new(),
            )
            .unwrap();
        person
            .extends_to("address", &address, AssociationOptions::new().reverse("resident"))
            .unwrap();

        assert!(!address.has_property("person_id"));
        let schema = address.schema();
        assert!(!schema.has_generated_key());
        assert_eq!(address.property("id").unwrap().kind, PropertyType::Integer);
        assert_eq!(schema.foreign_keys[0].columns, vec!["id".to_string()]);
        assert_eq!(schema.foreign_keys[0].on_delete, ReferentialAction::Cascade);

        let forward = person.association("address").unwrap();
        assert!(forward.is_strict(&person));
        assert!(forward.info.accessors.method(AccessorKind::Add).is_none());
        let resident = address.association("resident").unwrap();
        assert!(!resident.is_strict(&address));
        assert!(address.has_accessor("getResident"));
        assert!(!address.has_accessor("setResident"));
        assert!(!address.has_accessor("removeResident"));
    }

    #[test]
    fn test_extends_to_rejects_incompatible_targets() {
        let (registry, person, pet) = models();
        let tag = registry
            .define(
                "tag",
                vec![Property::new("label", PropertyType::Text).key()],
                ModelOptions::new(),
            )
            .unwrap();
        assert!(matches!(
            person.extends_to("tag", &tag, AssociationOptions::new()),
            Err(Error::Definition(_))
        ));
        assert!(matches!(
            person.extends_to("pet", &pet, AssociationOptions::new().field(["person_id"])),
            Err(Error::Definition(_))
        ));
        assert_eq!(pet.property("id").unwrap().kind, PropertyType::Serial);

        let (registry, person, pet) = models();
        let badge = registry.define("badge", Vec::new(), ModelOptions::new()).unwrap();
        person.extends_to("badge", &badge, AssociationOptions::new()).unwrap();
        assert!(matches!(
            pet.extends_to("badge", &badge, AssociationOptions::new()),
            Err(Error::Definition(_))
        ));
    }
}
