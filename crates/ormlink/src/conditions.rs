//! Find conditions.
//!
//! Conditions are written against a model's properties and associations:
//!
//! - a plain value means equality, an array value means membership;
//! - a [`Comparator`] is passed through as is;
//! - instances given for an association name match rows linked to any of
//!   them, whatever the linkage.
//!
//! Resolution turns them into a storage [`Filter`], issuing pre-queries
//! where the driver cannot join.

use ormlink_core::{Cx, Error, Linkage, Outcome, Row, ValidationErrorKind, Value, try_outcome};
use ormlink_query::{Comparator, Filter, Join, Operation, Select};

use crate::association::Targets;
use crate::instance::{Instance, InstanceStatus};
use crate::model::Model;

/// The right-hand side of one condition.
#[derive(Debug, Clone)]
pub enum CondValue {
    /// Equality, or membership for arrays.
    Value(Value),
    /// Explicit comparison.
    Compare(Comparator),
    /// Rows linked to any of these instances.
    Related(Targets),
}

/// A conjunction of conditions plus optional or-groups.
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    terms: Vec<(String, CondValue)>,
    any_of: Vec<Vec<Conditions>>,
}

impl Conditions {
    /// No conditions; matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `name` equals `value` (or is one of its elements for arrays).
    #[must_use]
    pub fn eq(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms
            .push((name.into(), CondValue::Value(value.into())));
        self
    }

    /// `name` satisfies `cmp`.
    #[must_use]
    pub fn compare(mut self, name: impl Into<String>, cmp: Comparator) -> Self {
        self.terms.push((name.into(), CondValue::Compare(cmp)));
        self
    }

    /// Association `name` links to any of `targets`.
    #[must_use]
    pub fn related(mut self, name: impl Into<String>, targets: impl Into<Targets>) -> Self {
        self.terms
            .push((name.into(), CondValue::Related(targets.into())));
        self
    }

    /// At least one of `alternatives` holds.
    #[must_use]
    pub fn or(mut self, alternatives: Vec<Conditions>) -> Self {
        self.any_of.push(alternatives);
        self
    }

    /// Add every condition of `other`.
    #[must_use]
    pub fn merge(mut self, other: Conditions) -> Self {
        self.terms.extend(other.terms);
        self.any_of.extend(other.any_of);
        self
    }

    /// True when nothing is constrained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.any_of.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Conditions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Conditions::new(), |c, (k, v)| c.eq(k, v))
    }
}

impl From<Row> for Conditions {
    fn from(row: Row) -> Self {
        row.iter()
            .fold(Conditions::new(), |c, (k, v)| c.eq(k, v.clone()))
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Conditions lowered to storage terms.
#[derive(Debug, Default)]
pub(crate) struct Resolved {
    pub(crate) filter: Filter,
    pub(crate) joins: Vec<Join>,
}

impl Resolved {
    pub(crate) fn into_select(self, table: impl Into<String>) -> Select {
        let mut select = Select::from(table).filter(self.filter);
        select.joins = self.joins;
        select
    }
}

fn unknown(model: &Model, name: &str) -> Error {
    Error::validation(
        name,
        ValidationErrorKind::UnknownProperty,
        format!("{} has no property or association {name}", model.name()),
    )
}

/// Key values named by an association condition.
fn related_keys(name: &str, target: &Model, value: &CondValue) -> Result<Vec<Vec<Value>>, Error> {
    let keys_of = |instances: &[Instance]| -> Result<Vec<Vec<Value>>, Error> {
        instances
            .iter()
            .map(|instance| {
                if instance.model() != target {
                    return Err(Error::validation(
                        name,
                        ValidationErrorKind::Type,
                        format!(
                            "expected {} instance, got {}",
                            target.name(),
                            instance.model().name()
                        ),
                    ));
                }
                match (instance.status(), instance.key()) {
                    (InstanceStatus::Persistent, Some(key)) => Ok(key),
                    _ => Err(Error::validation(
                        name,
                        ValidationErrorKind::State,
                        format!("{} instance is not saved", target.name()),
                    )),
                }
            })
            .collect()
    };
    match value {
        CondValue::Related(targets) => keys_of(targets.instances()),
        CondValue::Value(Value::Array(items)) if target.key().len() == 1 => {
            Ok(items.iter().map(|v| vec![v.clone()]).collect())
        }
        CondValue::Value(key) => target.key_values(key.clone()).map(|k| vec![k]),
        CondValue::Compare(_) => Err(Error::validation(
            name,
            ValidationErrorKind::Type,
            "association conditions take instances or key values",
        )),
    }
}

/// Lower `conditions` on `model` to a filter plus joins. Joins are only
/// produced when `allow_join` is set and the driver supports them; otherwise
/// join tables are read up front.
pub(crate) async fn resolve(
    model: &Model,
    cx: &Cx,
    conditions: &Conditions,
    allow_join: bool,
) -> Outcome<Resolved, Error> {
    let ctx = model.ctx();
    let join = allow_join && ctx.driver.supports_join();
    let mut resolved = Resolved::default();

    for (name, value) in &conditions.terms {
        if model.has_property(name) {
            match value {
                CondValue::Value(Value::Array(items)) => {
                    resolved.filter.push(name.clone(), Comparator::In(items.clone()));
                }
                CondValue::Value(v) => resolved.filter.push(name.clone(), Comparator::Eq(v.clone())),
                CondValue::Compare(cmp) => resolved.filter.push(name.clone(), cmp.clone()),
                CondValue::Related(_) => {
                    return Outcome::Err(Error::validation(
                        name,
                        ValidationErrorKind::Type,
                        format!("{name} is a property, not an association"),
                    ));
                }
            }
            continue;
        }

        let Some(association) = model.association(name) else {
            return Outcome::Err(unknown(model, name));
        };
        let target = match association.target() {
            Ok(target) => target,
            Err(e) => return Outcome::Err(e),
        };
        let keys = match related_keys(name, &target, value) {
            Ok(keys) => keys,
            Err(e) => return Outcome::Err(e),
        };

        match &association.info.linkage {
            Linkage::LocalKey { columns } => {
                resolved.filter.extend(Filter::key_match(columns, &keys));
            }
            Linkage::RemoteKey { columns, .. } => {
                let select = Select::from(target.table())
                    .filter(target.key_filter(&keys))
                    .columns(Some(columns.clone()));
                let rows = try_outcome!(ctx.execute(cx, Operation::Select(select)).await);
                let linked: Vec<Vec<Value>> = rows
                    .iter()
                    .map(|row| row.values_for(columns))
                    .filter(|k| !k.iter().any(Value::is_null))
                    .collect();
                resolved.filter.extend(model.key_filter(&linked));
            }
            Linkage::JoinTable(info) if join => {
                resolved.joins.push(Join {
                    table: info.table.clone(),
                    on: info
                        .source_columns
                        .iter()
                        .cloned()
                        .zip(model.key().iter().cloned())
                        .collect(),
                    filter: Filter::key_match(&info.target_columns, &keys),
                });
            }
            Linkage::JoinTable(info) => {
                let select = Select::from(&info.table)
                    .filter(Filter::key_match(&info.target_columns, &keys))
                    .columns(Some(info.source_columns.clone()));
                let rows = try_outcome!(ctx.execute(cx, Operation::Select(select)).await);
                let linked: Vec<Vec<Value>> = rows
                    .iter()
                    .map(|row| row.values_for(&info.source_columns))
                    .collect();
                resolved.filter.extend(model.key_filter(&linked));
            }
        }
    }

    for group in &conditions.any_of {
        let mut alternatives = Vec::with_capacity(group.len());
        for alternative in group {
            let inner = try_outcome!(Box::pin(resolve(model, cx, alternative, false)).await);
            alternatives.push(inner.filter);
        }
        resolved.filter = resolved.filter.or(alternatives);
    }

    Outcome::Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let c = Conditions::new()
            .eq("name", "Deco")
            .compare("age", Comparator::Gt(Value::from(3)));
        assert!(!c.is_empty());
        assert_eq!(c.terms.len(), 2);

        let from_pairs: Conditions = [("name", "Fido"), ("kind", "dog")].into_iter().collect();
        assert_eq!(from_pairs.terms.len(), 2);
        assert!(Conditions::new().is_empty());
    }

    #[test]
    fn test_from_row() {
        let c = Conditions::from(Row::new().with("pet_id", 1));
        match &c.terms[0] {
            (name, CondValue::Value(v)) => {
                assert_eq!(name, "pet_id");
                assert_eq!(v, &Value::from(1));
            }
            other => panic!("unexpected term {other:?}"),
        }
    }
}
