//! Row filters.
//!
//! A [`Filter`] is a conjunction of [`Clause`]s. It is both the wire format
//! handed to drivers and, through [`Filter::matches`], a reference evaluator
//! drivers without a native query language can use directly.

use serde::{Deserialize, Serialize};

use ormlink_core::{Row, Value, matches_pattern};

/// Comparison applied to a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Comparator {
    /// Equal; `Eq(Null)` means IS NULL.
    Eq(Value),
    /// Not equal; `Ne(Null)` means IS NOT NULL.
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// Inclusive range.
    Between(Value, Value),
    /// Member of the list.
    In(Vec<Value>),
    /// Not a member of the list.
    NotIn(Vec<Value>),
    /// SQL LIKE with `%` and `_` wildcards.
    Like(String),
    IsNull,
    NotNull,
}

impl Comparator {
    /// Evaluate against a column value.
    #[must_use]
    pub fn test(&self, value: &Value) -> bool {
        use std::cmp::Ordering;

        let ordered = |other: &Value, accept: &[Ordering]| {
            !value.is_null() && !other.is_null() && accept.contains(&value.sort_cmp(other))
        };

        match self {
            Comparator::Eq(Value::Null) | Comparator::IsNull => value.is_null(),
            Comparator::Ne(Value::Null) | Comparator::NotNull => !value.is_null(),
            Comparator::Eq(other) => value.loose_eq(other),
            Comparator::Ne(other) => !value.is_null() && !value.loose_eq(other),
            Comparator::Gt(other) => ordered(other, &[Ordering::Greater]),
            Comparator::Gte(other) => ordered(other, &[Ordering::Greater, Ordering::Equal]),
            Comparator::Lt(other) => ordered(other, &[Ordering::Less]),
            Comparator::Lte(other) => ordered(other, &[Ordering::Less, Ordering::Equal]),
            Comparator::Between(low, high) => {
                ordered(low, &[Ordering::Greater, Ordering::Equal])
                    && ordered(high, &[Ordering::Less, Ordering::Equal])
            }
            Comparator::In(list) => list.iter().any(|v| value.loose_eq(v)),
            Comparator::NotIn(list) => !value.is_null() && !list.iter().any(|v| value.loose_eq(v)),
            Comparator::Like(pattern) => match value {
                Value::Text(s) => matches_pattern(s, &like_to_regex(pattern)),
                _ => false,
            },
        }
    }
}

/// Translate a LIKE pattern into an anchored regex.
#[must_use]
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if ch == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    out.push_str(&regex::escape(&literal));
    out.push('$');
    out
}

/// One element of a conjunction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    /// Compare a column.
    Compare {
        /// Column name.
        column: String,
        /// Comparison.
        cmp: Comparator,
    },
    /// At least one of the nested filters holds.
    Or(Vec<Filter>),
    /// The nested filter does not hold.
    Not(Filter),
}

/// A conjunction of clauses; the empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// The match-everything filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column comparison.
    #[must_use]
    pub fn and(mut self, column: impl Into<String>, cmp: Comparator) -> Self {
        self.push(column, cmp);
        self
    }

    /// Add a column equality.
    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(column, Comparator::Eq(value.into()))
    }

    /// Add an IN list.
    #[must_use]
    pub fn is_in(self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.and(column, Comparator::In(values))
    }

    /// Add a disjunction.
    #[must_use]
    pub fn or(mut self, alternatives: Vec<Filter>) -> Self {
        self.clauses.push(Clause::Or(alternatives));
        self
    }

    /// Add a negated filter.
    #[must_use]
    pub fn not(mut self, filter: Filter) -> Self {
        self.clauses.push(Clause::Not(filter));
        self
    }

    /// Add a column comparison in place.
    pub fn push(&mut self, column: impl Into<String>, cmp: Comparator) {
        self.clauses.push(Clause::Compare {
            column: column.into(),
            cmp,
        });
    }

    /// Append every clause of `other`.
    pub fn extend(&mut self, other: Filter) {
        self.clauses.extend(other.clauses);
    }

    /// Equality on several columns at once (composite keys).
    ///
    /// With a single value set this is a plain conjunction of equalities; with
    /// several it is a single-column IN or, for composite columns, a
    /// disjunction of conjunctions.
    #[must_use]
    pub fn key_match(columns: &[String], keys: &[Vec<Value>]) -> Filter {
        match (columns.len(), keys.len()) {
            (_, 0) => Filter::new().and(
                columns.first().cloned().unwrap_or_default(),
                Comparator::In(Vec::new()),
            ),
            (_, 1) => columns
                .iter()
                .zip(&keys[0])
                .fold(Filter::new(), |f, (c, v)| f.eq(c.clone(), v.clone())),
            (1, _) => Filter::new().is_in(
                columns[0].clone(),
                keys.iter().map(|k| k[0].clone()).collect(),
            ),
            _ => Filter::new().or(keys
                .iter()
                .map(|key| {
                    columns
                        .iter()
                        .zip(key)
                        .fold(Filter::new(), |f, (c, v)| f.eq(c.clone(), v.clone()))
                })
                .collect()),
        }
    }

    /// Clauses in order.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// True when this filter has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate against a row; absent columns read as `Null`.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Compare { column, cmp } => cmp.test(row.get(column).unwrap_or(&Value::Null)),
            Clause::Or(alternatives) => alternatives.iter().any(|f| f.matches(row)),
            Clause::Not(inner) => !inner.matches(row),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Row {
        Row::new()
            .with("id", 1)
            .with("name", "John Doe")
            .with("pet_id", Value::Null)
    }

    #[test]
    fn test_eq_null_means_is_null() {
        assert!(Filter::new().eq("pet_id", Value::Null).matches(&person()));
        assert!(!Filter::new().eq("name", Value::Null).matches(&person()));
    }

    #[test]
    fn test_in_and_not_in() {
        let row = person();
        assert!(
            Filter::new()
                .is_in("name", vec!["John Doe".into(), "Jane Doe".into()])
                .matches(&row)
        );
        assert!(
            !Filter::new()
                .and("name", Comparator::NotIn(vec!["John Doe".into()]))
                .matches(&row)
        );
        assert!(!Filter::new().is_in("name", vec![]).matches(&row));
    }

    #[test]
    fn test_like() {
        let row = person();
        assert!(Filter::new().and("name", Comparator::Like("John%".into())).matches(&row));
        assert!(Filter::new().and("name", Comparator::Like("J_hn Doe".into())).matches(&row));
        assert!(!Filter::new().and("name", Comparator::Like("Jane%".into())).matches(&row));
        assert_eq!(like_to_regex("a.b%"), r"(?s)^a\.b.*$");
    }

    #[test]
    fn test_ordering_comparators_skip_null() {
        let row = person();
        assert!(Filter::new().and("id", Comparator::Gte(1.into())).matches(&row));
        assert!(!Filter::new().and("pet_id", Comparator::Lt(5.into())).matches(&row));
        assert!(
            Filter::new()
                .and("id", Comparator::Between(0.into(), 2.into()))
                .matches(&row)
        );
    }

    #[test]
    fn test_or_and_not() {
        let row = person();
        let f = Filter::new().or(vec![
            Filter::new().eq("name", "Jane Doe"),
            Filter::new().eq("id", 1),
        ]);
        assert!(f.matches(&row));
        assert!(!Filter::new().not(f).matches(&row));
    }

    #[test]
    fn test_key_match_composite() {
        let cols = vec!["a".to_string(), "b".to_string()];
        let f = Filter::key_match(
            &cols,
            &[vec![1.into(), 2.into()], vec![3.into(), 4.into()]],
        );
        assert!(f.matches(&Row::new().with("a", 3).with("b", 4)));
        assert!(!f.matches(&Row::new().with("a", 1).with("b", 4)));
    }
}
