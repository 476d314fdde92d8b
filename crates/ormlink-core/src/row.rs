//! Raw rows exchanged with drivers.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// An ordered set of column/value pairs.
///
/// Relational drivers return one `Row` per result row; document drivers
/// return one per document with nested data flattened into `Value::Json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from column/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut row = Self::new();
        for (k, v) in pairs {
            row.set(k, v);
        }
        row
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Insert or replace a column value, keeping the original position.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(c, _)| *c == column) {
            slot.1 = value;
        } else {
            self.entries.push((column, value));
        }
    }

    /// Value for a column, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    /// Value for a column, `Null` when absent.
    #[must_use]
    pub fn value(&self, column: &str) -> Value {
        self.get(column).cloned().unwrap_or(Value::Null)
    }

    /// Remove a column, returning its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(c, _)| c == column)?;
        Some(self.entries.remove(idx).1)
    }

    /// True when the column is present (even if `Null`).
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|(c, _)| c == column)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    /// Column/value pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Values for the given columns, `Null` where absent.
    #[must_use]
    pub fn values_for(&self, columns: &[String]) -> Vec<Value> {
        columns.iter().map(|c| self.value(c)).collect()
    }

    /// Keep only the listed columns.
    #[must_use]
    pub fn project(&self, columns: &[String]) -> Row {
        Row {
            entries: self
                .entries
                .iter()
                .filter(|(c, _)| columns.contains(c))
                .cloned()
                .collect(),
        }
    }

    /// Copy every column of `other` into this row.
    pub fn merge(&mut self, other: &Row) {
        for (c, v) in other.iter() {
            self.set(c, v.clone());
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .entries
            .iter()
            .map(|(c, v)| (c.clone(), serde_json::to_value(v).unwrap_or_default()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row::from_pairs(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let mut row = Row::new().with("id", 1).with("name", "Deco");
        row.set("id", 2);
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(row.value("id"), Value::BigInt(2));
    }

    #[test]
    fn test_missing_column_is_null() {
        let row = Row::new().with("id", 1);
        assert_eq!(row.value("pet_id"), Value::Null);
        assert!(!row.contains("pet_id"));
    }

    #[test]
    fn test_project_and_json() {
        let row = Row::new().with("id", 1).with("name", "Fido");
        let projected = row.project(&["name".to_string()]);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected.to_json(), serde_json::json!({"name": "Fido"}));
    }
}
