//! Property and table definitions.

use serde::{Deserialize, Serialize};

use crate::error::{FieldValidationError, ValidationErrorKind};
use crate::value::Value;

/// Declared type of a model property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    /// UTF-8 text.
    #[default]
    Text,
    /// Signed integer.
    Integer,
    /// Integer or float.
    Number,
    /// Boolean.
    Boolean,
    /// Timestamp in milliseconds.
    Date,
    /// Arbitrary JSON.
    Object,
    /// Raw bytes.
    Binary,
    /// Driver-generated integer key.
    Serial,
}

impl PropertyType {
    /// Whether `value` is acceptable for this type. `Null` is always accepted
    /// here; required-ness is checked separately.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (PropertyType::Text, Value::Text(_))
            | (PropertyType::Integer | PropertyType::Serial, Value::BigInt(_))
            | (PropertyType::Number, Value::BigInt(_) | Value::Double(_))
            | (PropertyType::Boolean, Value::Bool(_))
            | (PropertyType::Date, Value::Timestamp(_) | Value::BigInt(_))
            | (PropertyType::Object, _)
            | (PropertyType::Binary, Value::Bytes(_)) => true,
            (PropertyType::Integer | PropertyType::Serial, Value::Double(f)) => f.fract() == 0.0,
            _ => false,
        }
    }

    /// Type a column referencing a key of this type should have.
    #[must_use]
    pub const fn reference_type(self) -> PropertyType {
        match self {
            PropertyType::Serial => PropertyType::Integer,
            other => other,
        }
    }
}

/// Referential action for a foreign key when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// Reject the delete while references exist.
    #[default]
    NoAction,
    /// Same as `NoAction`.
    Restrict,
    /// Delete referencing rows too.
    Cascade,
    /// Null out the referencing columns.
    SetNull,
}

impl ReferentialAction {
    /// SQL spelling of this action.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
        }
    }

    /// Parse a referential action (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NO ACTION" | "NOACTION" | "NO_ACTION" => Some(ReferentialAction::NoAction),
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" | "SETNULL" | "SET_NULL" => Some(ReferentialAction::SetNull),
            _ => None,
        }
    }
}

/// A model property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property (and column) name.
    pub name: String,
    /// Declared type.
    pub kind: PropertyType,
    /// Whether the value must be present on save.
    pub required: bool,
    /// Whether the column carries a unique constraint.
    pub unique: bool,
    /// Whether this property is part of the key.
    pub key: bool,
    /// Value assigned to new instances when none is given.
    pub default: Option<Value>,
}

impl Property {
    /// Create an optional property of the given type.
    pub fn new(name: impl Into<String>, kind: PropertyType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            unique: false,
            key: false,
            default: None,
        }
    }

    /// Mark as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark as (part of) the key.
    #[must_use]
    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    /// Set the default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Check the type and required-ness of `value`.
    pub fn check(&self, value: &Value) -> Result<(), FieldValidationError> {
        if value.is_null() {
            if self.required && self.kind != PropertyType::Serial {
                return Err(FieldValidationError::new(
                    &self.name,
                    ValidationErrorKind::Required,
                    "is required",
                ));
            }
            return Ok(());
        }
        if !self.kind.accepts(value) {
            return Err(FieldValidationError::new(
                &self.name,
                ValidationErrorKind::Type,
                format!("expected {:?}, got {}", self.kind, value.type_name()),
            )
            .with_value(value.clone()));
        }
        Ok(())
    }
}

/// A foreign key from one table's columns to another table's columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referencing columns on the owning table.
    pub columns: Vec<String>,
    /// Referenced table.
    pub references: String,
    /// Referenced columns, positionally matched with `columns`.
    pub referenced_columns: Vec<String>,
    /// What happens to referencing rows when the referenced row is deleted.
    pub on_delete: ReferentialAction,
}

impl ForeignKey {
    /// Create a foreign key with `NoAction` on delete.
    pub fn new(
        columns: Vec<String>,
        references: impl Into<String>,
        referenced_columns: Vec<String>,
    ) -> Self {
        Self {
            columns,
            references: references.into(),
            referenced_columns,
            on_delete: ReferentialAction::NoAction,
        }
    }

    /// Set the delete action.
    #[must_use]
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }
}

/// Storage-level description of a table (or collection).
///
/// Models produce one for their own table; hasMany associations produce one
/// for each join table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<Property>,
    /// Key columns, in order.
    pub key: Vec<String>,
    /// Unique column sets (each set is one constraint).
    pub unique: Vec<Vec<String>>,
    /// Outgoing foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            key: Vec::new(),
            unique: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Add (or replace) a column.
    #[must_use]
    pub fn column(mut self, property: Property) -> Self {
        self.add_column(property);
        self
    }

    /// Add (or replace) a column in place.
    pub fn add_column(&mut self, property: Property) {
        if property.unique && !self.unique.iter().any(|u| u == &[property.name.clone()]) {
            self.unique.push(vec![property.name.clone()]);
        }
        if let Some(existing) = self.columns.iter_mut().find(|c| c.name == property.name) {
            *existing = property;
        } else {
            self.columns.push(property);
        }
    }

    /// Set the key columns.
    #[must_use]
    pub fn key(mut self, columns: Vec<String>) -> Self {
        self.key = columns;
        self
    }

    /// Add a unique constraint over several columns.
    #[must_use]
    pub fn unique(mut self, columns: Vec<String>) -> Self {
        if !self.unique.contains(&columns) {
            self.unique.push(columns);
        }
        self
    }

    /// Add a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Look up a column.
    #[must_use]
    pub fn column_def(&self, name: &str) -> Option<&Property> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// True when the key is a single driver-generated column.
    #[must_use]
    pub fn has_generated_key(&self) -> bool {
        self.key.len() == 1
            && self
                .column_def(&self.key[0])
                .is_some_and(|c| c.kind == PropertyType::Serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_accepts() {
        assert!(PropertyType::Integer.accepts(&Value::BigInt(3)));
        assert!(PropertyType::Integer.accepts(&Value::Double(3.0)));
        assert!(!PropertyType::Integer.accepts(&Value::Double(3.5)));
        assert!(PropertyType::Number.accepts(&Value::Double(3.5)));
        assert!(!PropertyType::Text.accepts(&Value::BigInt(1)));
        assert!(PropertyType::Object.accepts(&Value::from("anything")));
    }

    #[test]
    fn test_required_property_rejects_null() {
        let prop = Property::new("name", PropertyType::Text).required();
        let err = prop.check(&Value::Null).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Required);
        assert!(prop.check(&Value::from("John")).is_ok());
    }

    #[test]
    fn test_unique_column_registers_constraint() {
        let schema = TableSchema::new("person")
            .column(Property::new("email", PropertyType::Text).unique())
            .column(Property::new("email", PropertyType::Text).unique());
        assert_eq!(schema.columns.len(), 1);
        assert_eq!(schema.unique, vec![vec!["email".to_string()]]);
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!(
            ReferentialAction::parse("set null"),
            Some(ReferentialAction::SetNull)
        );
        assert_eq!(ReferentialAction::parse("explode"), None);
        assert_eq!(ReferentialAction::Cascade.as_sql(), "CASCADE");
    }

    #[test]
    fn test_generated_key_detection() {
        let schema = TableSchema::new("pet")
            .column(Property::new("id", PropertyType::Serial).key())
            .key(vec!["id".to_string()]);
        assert!(schema.has_generated_key());
    }
}
