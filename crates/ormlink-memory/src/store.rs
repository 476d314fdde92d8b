//! Table storage and operation evaluation.
//!
//! Every write is validated against a staged copy before it becomes visible,
//! so a rejected operation leaves the store untouched.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use ormlink_core::{
    ConstraintError, ConstraintKind, DriverError, Error, PropertyType, ReferentialAction, Row,
    TableSchema, Value,
};
use ormlink_query::{Delete, Direction, Filter, Insert, Join, OrderBy, Select, Update};

use crate::config::{MemoryConfig, RowOrder};

pub(crate) const DRIVER_NAME: &str = "memory";

#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub(crate) schema: TableSchema,
    pub(crate) rows: Vec<Row>,
    next_id: i64,
}

impl Table {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            next_id: 1,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Store {
    tables: HashMap<String, Table>,
    next_object_id: u64,
}

fn no_such_table(name: &str) -> Error {
    Error::Driver(
        DriverError::new(DRIVER_NAME, format!("no such table: {name}"))
            .with_payload(serde_json::json!({ "code": "ENOTABLE", "table": name })),
    )
}

fn same_values(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
}

fn compare_columns(a: &Row, b: &Row, columns: &[String]) -> Ordering {
    columns
        .iter()
        .map(|c| a.value(c).sort_cmp(&b.value(c)))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn compare_order(a: &Row, b: &Row, order: &[OrderBy]) -> Ordering {
    for term in order {
        let ord = a.value(&term.column).sort_cmp(&b.value(&term.column));
        let ord = match term.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Key columns of a table: declared, or the configured default.
pub(crate) fn key_columns(config: &MemoryConfig, schema: &TableSchema) -> Vec<String> {
    if schema.key.is_empty() {
        vec![config.key_column.clone()]
    } else {
        schema.key.clone()
    }
}

impl Store {
    fn table(&self, name: &str) -> Result<&Table, Error> {
        self.tables.get(name).ok_or_else(|| no_such_table(name))
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub(crate) fn row_count(&self, name: &str) -> Option<usize> {
        self.tables.get(name).map(|t| t.rows.len())
    }

    /// Create the table, or replace its definition and keep its rows.
    pub(crate) fn sync(&mut self, schema: &TableSchema) {
        match self.tables.get_mut(&schema.name) {
            Some(table) => table.schema = schema.clone(),
            None => {
                self.tables
                    .insert(schema.name.clone(), Table::new(schema.clone()));
            }
        }
    }

    pub(crate) fn drop_table(&mut self, name: &str) -> bool {
        self.tables.remove(name).is_some()
    }

    fn joins_hold(&self, row: &Row, joins: &[Join]) -> Result<bool, Error> {
        for join in joins {
            let other = self.table(&join.table)?;
            let linked = other.rows.iter().any(|candidate| {
                join.filter.matches(candidate)
                    && join
                        .on
                        .iter()
                        .all(|(jc, rc)| candidate.value(jc).loose_eq(&row.value(rc)))
            });
            if !linked {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matching(&self, config: &MemoryConfig, select: &Select) -> Result<Vec<&Row>, Error> {
        if !select.joins.is_empty() && !config.supports_join() {
            return Err(Error::Driver(DriverError::new(
                DRIVER_NAME,
                "joins are not supported by document collections",
            )));
        }
        let table = self.table(&select.table)?;
        let mut rows = Vec::new();
        for row in &table.rows {
            if select.filter.matches(row) && self.joins_hold(row, &select.joins)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    pub(crate) fn select(&self, config: &MemoryConfig, select: &Select) -> Result<Vec<Row>, Error> {
        let mut rows = self.matching(config, select)?;
        if select.order.is_empty() {
            match config.row_order {
                RowOrder::Insertion => {}
                RowOrder::Reverse => rows.reverse(),
                RowOrder::Key => {
                    let key = key_columns(config, &self.table(&select.table)?.schema);
                    rows.sort_by(|a, b| compare_columns(a, b, &key));
                }
            }
        } else {
            rows.sort_by(|a, b| compare_order(a, b, &select.order));
        }
        Ok(rows
            .into_iter()
            .skip(select.offset.unwrap_or(0))
            .take(select.limit.unwrap_or(usize::MAX))
            .map(|row| match &select.columns {
                Some(columns) => row.project(columns),
                None => row.clone(),
            })
            .collect())
    }

    pub(crate) fn count(&self, config: &MemoryConfig, select: &Select) -> Result<u64, Error> {
        Ok(self.matching(config, select)?.len() as u64)
    }

    pub(crate) fn insert(&mut self, config: &MemoryConfig, insert: &Insert) -> Result<Row, Error> {
        let table = self.table(&insert.table)?;
        let key = key_columns(config, &table.schema);
        let key_kind = table.schema.column_def(&key[0]).map(|c| c.kind);
        let mut next_id = table.next_id;
        let mut row = insert.values.clone();

        if key.len() == 1 && row.value(&key[0]).is_null() {
            let generated = match key_kind {
                Some(PropertyType::Serial) => {
                    let id = next_id;
                    next_id += 1;
                    Value::BigInt(id)
                }
                Some(PropertyType::Text) | None if key[0] == config.key_column => {
                    self.next_object_id += 1;
                    Value::Text(format!("{:024x}", self.next_object_id))
                }
                _ => {
                    return Err(ConstraintError::new(
                        ConstraintKind::NotNull,
                        &insert.table,
                        key.clone(),
                        "key value missing",
                    )
                    .into());
                }
            };
            row.set(key[0].clone(), generated);
        } else if let Some(id) = row.value(&key[0]).as_i64() {
            if key_kind == Some(PropertyType::Serial) {
                next_id = next_id.max(id + 1);
            }
        }

        let table = self.table(&insert.table)?;
        self.check_row(config, table, &row, table.rows.iter())?;

        let table = self
            .tables
            .get_mut(&insert.table)
            .ok_or_else(|| no_such_table(&insert.table))?;
        table.next_id = next_id;
        table.rows.push(row.clone());
        Ok(row)
    }

    pub(crate) fn update(&mut self, config: &MemoryConfig, update: &Update) -> Result<u64, Error> {
        let table = self.table(&update.table)?;
        let mut staged = table.rows.clone();
        let mut changed = Vec::new();
        for (idx, row) in staged.iter_mut().enumerate() {
            if update.filter.matches(row) {
                row.merge(&update.set);
                changed.push(idx);
            }
        }
        for &idx in &changed {
            let others = staged
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != idx)
                .map(|(_, r)| r);
            self.check_row(config, table, &staged[idx], others)?;
        }

        let table = self
            .tables
            .get_mut(&update.table)
            .ok_or_else(|| no_such_table(&update.table))?;
        table.rows = staged;
        Ok(changed.len() as u64)
    }

    pub(crate) fn delete(&mut self, config: &MemoryConfig, delete: &Delete) -> Result<u64, Error> {
        let mut staged = self.tables.clone();
        let affected = delete_cascading(&mut staged, config, &delete.table, &delete.filter)?;
        self.tables = staged;
        Ok(affected)
    }

    /// Enforce not-null, unique and foreign-key rules for one row.
    fn check_row<'r>(
        &self,
        config: &MemoryConfig,
        table: &Table,
        row: &Row,
        others: impl Iterator<Item = &'r Row> + Clone,
    ) -> Result<(), Error> {
        let schema = &table.schema;
        for column in &schema.columns {
            if column.required
                && column.kind != PropertyType::Serial
                && row.value(&column.name).is_null()
            {
                return Err(ConstraintError::new(
                    ConstraintKind::NotNull,
                    &schema.name,
                    vec![column.name.clone()],
                    format!("{} may not be null", column.name),
                )
                .into());
            }
        }

        let key = key_columns(config, schema);
        for set in std::iter::once(&key).chain(schema.unique.iter()) {
            let values = row.values_for(set);
            if values.iter().any(Value::is_null) {
                continue;
            }
            if others
                .clone()
                .any(|other| same_values(&values, &other.values_for(set)))
            {
                return Err(ConstraintError::new(
                    ConstraintKind::Unique,
                    &schema.name,
                    set.clone(),
                    format!("duplicate value for ({})", set.join(", ")),
                )
                .into());
            }
        }

        if !config.checks_foreign_keys() {
            return Ok(());
        }
        for fk in &schema.foreign_keys {
            let values = row.values_for(&fk.columns);
            if values.iter().any(Value::is_null) {
                continue;
            }
            let found = self.tables.get(&fk.references).is_some_and(|target| {
                target
                    .rows
                    .iter()
                    .any(|r| same_values(&values, &r.values_for(&fk.referenced_columns)))
            });
            if !found {
                return Err(ConstraintError::new(
                    ConstraintKind::ForeignKey,
                    &schema.name,
                    fk.columns.clone(),
                    format!(
                        "no {} row with ({}) = ({})",
                        fk.references,
                        fk.referenced_columns.join(", "),
                        values
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )
                .into());
            }
        }
        Ok(())
    }
}

/// Delete matching rows and apply referential actions to rows that point at
/// them, following cascades until nothing else is affected.
fn delete_cascading(
    tables: &mut HashMap<String, Table>,
    config: &MemoryConfig,
    table_name: &str,
    filter: &Filter,
) -> Result<u64, Error> {
    let table = tables
        .get_mut(table_name)
        .ok_or_else(|| no_such_table(table_name))?;
    let (removed, kept): (Vec<Row>, Vec<Row>) =
        table.rows.drain(..).partition(|row| filter.matches(row));
    table.rows = kept;
    let affected = removed.len() as u64;

    if !config.checks_foreign_keys() {
        return Ok(affected);
    }

    let mut pending = VecDeque::from([(table_name.to_string(), removed)]);
    while let Some((parent, rows)) = pending.pop_front() {
        let parent_name: &str = &parent;
        let referencing: Vec<_> = tables
            .values()
            .flat_map(|t| {
                t.schema
                    .foreign_keys
                    .iter()
                    .filter(move |fk| fk.references == parent_name)
                    .map(move |fk| (t.schema.name.clone(), fk.clone()))
            })
            .collect();

        for (child, fk) in referencing {
            let keys: Vec<Vec<Value>> = rows
                .iter()
                .map(|r| r.values_for(&fk.referenced_columns))
                .filter(|k| !k.iter().any(Value::is_null))
                .collect();
            if keys.is_empty() {
                continue;
            }
            let points_at_parent = Filter::key_match(&fk.columns, &keys);
            let Some(child_table) = tables.get_mut(&child) else {
                continue;
            };
            match fk.on_delete {
                ReferentialAction::NoAction | ReferentialAction::Restrict => {
                    if child_table.rows.iter().any(|r| points_at_parent.matches(r)) {
                        return Err(ConstraintError::new(
                            ConstraintKind::ForeignKey,
                            &parent,
                            fk.referenced_columns.clone(),
                            format!("still referenced by {child}({})", fk.columns.join(", ")),
                        )
                        .into());
                    }
                }
                ReferentialAction::Cascade => {
                    let (gone, kept): (Vec<Row>, Vec<Row>) = child_table
                        .rows
                        .drain(..)
                        .partition(|r| points_at_parent.matches(r));
                    child_table.rows = kept;
                    if !gone.is_empty() {
                        tracing::debug!(table = %child, rows = gone.len(), "Cascading delete");
                        pending.push_back((child, gone));
                    }
                }
                ReferentialAction::SetNull => {
                    for row in child_table
                        .rows
                        .iter_mut()
                        .filter(|r| points_at_parent.matches(r))
                    {
                        for column in &fk.columns {
                            row.set(column.clone(), Value::Null);
                        }
                    }
                }
            }
        }
    }
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlink_core::{ForeignKey, Property};

    fn person_pet(store: &mut Store, action: ReferentialAction) {
        store.sync(
            &TableSchema::new("pet")
                .column(Property::new("id", PropertyType::Serial).key())
                .column(Property::new("name", PropertyType::Text))
                .key(vec!["id".into()]),
        );
        store.sync(
            &TableSchema::new("person")
                .column(Property::new("id", PropertyType::Serial).key())
                .column(Property::new("name", PropertyType::Text).unique())
                .column(Property::new("pet_id", PropertyType::Integer))
                .key(vec!["id".into()])
                .foreign_key(
                    ForeignKey::new(vec!["pet_id".into()], "pet", vec!["id".into()])
                        .on_delete(action),
                ),
        );
    }

    fn insert(store: &mut Store, table: &str, row: Row) -> Result<Row, Error> {
        store.insert(
            &MemoryConfig::relational(),
            &Insert {
                table: table.into(),
                values: row,
            },
        )
    }

    #[test]
    fn test_serial_keys_increment() {
        let mut store = Store::default();
        person_pet(&mut store, ReferentialAction::SetNull);
        let a = insert(&mut store, "pet", Row::new().with("name", "Deco")).unwrap();
        let b = insert(&mut store, "pet", Row::new().with("name", "Fido")).unwrap();
        assert_eq!(a.value("id"), Value::BigInt(1));
        assert_eq!(b.value("id"), Value::BigInt(2));
    }

    #[test]
    fn test_unique_and_foreign_key_rejected_without_change() {
        let mut store = Store::default();
        person_pet(&mut store, ReferentialAction::SetNull);
        insert(&mut store, "person", Row::new().with("name", "John")).unwrap();

        let dup = insert(&mut store, "person", Row::new().with("name", "John")).unwrap_err();
        assert!(matches!(dup, Error::Constraint(ref c) if c.kind == ConstraintKind::Unique));

        let dangling = insert(
            &mut store,
            "person",
            Row::new().with("name", "Jane").with("pet_id", 99),
        )
        .unwrap_err();
        assert!(matches!(dangling, Error::Constraint(ref c) if c.kind == ConstraintKind::ForeignKey));
        assert_eq!(store.row_count("person"), Some(1));
    }

    #[test]
    fn test_delete_set_null() {
        let mut store = Store::default();
        person_pet(&mut store, ReferentialAction::SetNull);
        insert(&mut store, "pet", Row::new().with("name", "Deco")).unwrap();
        insert(&mut store, "person", Row::new().with("name", "John").with("pet_id", 1)).unwrap();

        let config = MemoryConfig::relational();
        let n = store
            .delete(
                &config,
                &Delete {
                    table: "pet".into(),
                    filter: Filter::new().eq("id", 1),
                },
            )
            .unwrap();
        assert_eq!(n, 1);
        let people = store.select(&config, &Select::from("person")).unwrap();
        assert!(people[0].value("pet_id").is_null());
    }

    #[test]
    fn test_delete_restrict_and_cascade() {
        let config = MemoryConfig::relational();
        let delete_pet = Delete {
            table: "pet".into(),
            filter: Filter::new(),
        };

        let mut store = Store::default();
        person_pet(&mut store, ReferentialAction::Restrict);
        insert(&mut store, "pet", Row::new().with("name", "Deco")).unwrap();
        insert(&mut store, "person", Row::new().with("name", "John").with("pet_id", 1)).unwrap();
        assert!(store.delete(&config, &delete_pet).is_err());
        assert_eq!(store.row_count("pet"), Some(1));

        let mut store = Store::default();
        person_pet(&mut store, ReferentialAction::Cascade);
        insert(&mut store, "pet", Row::new().with("name", "Deco")).unwrap();
        insert(&mut store, "person", Row::new().with("name", "John").with("pet_id", 1)).unwrap();
        assert_eq!(store.delete(&config, &delete_pet).unwrap(), 1);
        assert_eq!(store.row_count("person"), Some(0));
    }

    #[test]
    fn test_update_rejects_duplicate_atomically() {
        let config = MemoryConfig::relational();
        let mut store = Store::default();
        person_pet(&mut store, ReferentialAction::SetNull);
        insert(&mut store, "person", Row::new().with("name", "John")).unwrap();
        insert(&mut store, "person", Row::new().with("name", "Jane")).unwrap();

        let err = store
            .update(
                &config,
                &Update {
                    table: "person".into(),
                    set: Row::new().with("name", "Same"),
                    filter: Filter::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        let names: Vec<_> = store
            .select(&config, &Select::from("person"))
            .unwrap()
            .iter()
            .map(|r| r.value("name"))
            .collect();
        assert_eq!(names, vec![Value::from("John"), Value::from("Jane")]);
    }

    #[test]
    fn test_select_order_limit_and_join() {
        let config = MemoryConfig::relational();
        let mut store = Store::default();
        person_pet(&mut store, ReferentialAction::SetNull);
        for name in ["Deco", "Fido", "Axel"] {
            insert(&mut store, "pet", Row::new().with("name", name)).unwrap();
        }
        insert(&mut store, "person", Row::new().with("name", "John").with("pet_id", 2)).unwrap();

        let names: Vec<_> = store
            .select(
                &config,
                &Select::from("pet")
                    .order(vec![OrderBy::asc("name")])
                    .limit(Some(2)),
            )
            .unwrap()
            .iter()
            .map(|r| r.value("name"))
            .collect();
        assert_eq!(names, vec![Value::from("Axel"), Value::from("Deco")]);

        let owned = store
            .select(
                &config,
                &Select::from("pet").join(Join {
                    table: "person".into(),
                    on: vec![("pet_id".into(), "id".into())],
                    filter: Filter::new().eq("name", "John"),
                }),
            )
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].value("name"), Value::from("Fido"));
    }

    #[test]
    fn test_document_keys_and_no_joins() {
        let config = MemoryConfig::document();
        let mut store = Store::default();
        store.sync(&TableSchema::new("pet").column(Property::new("_id", PropertyType::Text)));
        let row = store
            .insert(
                &config,
                &Insert {
                    table: "pet".into(),
                    values: Row::new().with("name", "Deco"),
                },
            )
            .unwrap();
        assert_eq!(row.value("_id").as_str().map(str::len), Some(24));

        let err = store
            .select(
                &config,
                &Select::from("pet").join(Join {
                    table: "pet".into(),
                    on: vec![],
                    filter: Filter::new(),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Driver(_)));
    }

    #[test]
    fn test_missing_table_is_driver_error() {
        let store = Store::default();
        let err = store
            .select(&MemoryConfig::relational(), &Select::from("nope"))
            .unwrap_err();
        match err {
            Error::Driver(d) => assert!(d.payload.is_some()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
