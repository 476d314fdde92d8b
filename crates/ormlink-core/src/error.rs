//! Error taxonomy shared by the engine and drivers.
//!
//! Every failure surfaced to callers is one of these variants. Drivers map
//! their native failures into [`Error::Constraint`] or [`Error::Driver`];
//! the engine produces [`Error::Validation`], [`Error::NotFound`] and
//! [`Error::Definition`] itself.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Result alias used by synchronous helpers.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type for all ormlink operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A schema constraint was violated before the driver was reached.
    #[error("{0}")]
    Validation(ValidationError),

    /// The driver rejected a write because of a uniqueness or reference rule.
    #[error("{0}")]
    Constraint(ConstraintError),

    /// An expected related row does not exist.
    #[error("{model} not found: {message}")]
    NotFound {
        /// Model (or association target) that was looked up.
        model: String,
        /// What was being looked for.
        message: String,
    },

    /// Transport or backend failure; the payload is passed through untouched.
    #[error("{0}")]
    Driver(DriverError),

    /// A model or association definition is invalid, or an accessor is unknown.
    #[error("definition error: {0}")]
    Definition(String),

    /// The surrounding task was cancelled before the operation completed.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// The operation panicked.
    #[error("operation panicked: {0}")]
    Panicked(String),
}

/// Coarse classification of [`Error`], stable for matching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Constraint,
    NotFound,
    Driver,
    Definition,
    Cancelled,
    Panicked,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Constraint(_) => ErrorKind::Constraint,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Driver(_) => ErrorKind::Driver,
            Error::Definition(_) => ErrorKind::Definition,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Panicked(_) => ErrorKind::Panicked,
        }
    }

    /// Build a not-found error.
    pub fn not_found(model: impl Into<String>, message: impl Into<String>) -> Self {
        Error::NotFound {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Build a definition error.
    pub fn definition(message: impl Into<String>) -> Self {
        Error::Definition(message.into())
    }

    /// Build a single-field validation error.
    pub fn validation(
        property: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Error::Validation(ValidationError::single(FieldValidationError::new(
            property, kind, message,
        )))
    }

    /// True for [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<ConstraintError> for Error {
    fn from(err: ConstraintError) -> Self {
        Error::Constraint(err)
    }
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Self {
        Error::Driver(err)
    }
}

/// What kind of rule a property value broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// Value missing for a required property.
    Required,
    /// Value has the wrong type for the property.
    Type,
    /// Value did not match a pattern.
    Pattern,
    /// Numeric value out of range.
    Range,
    /// Text or array length out of range.
    Length,
    /// Value not in the allowed set.
    OneOf,
    /// Property is not part of the model.
    UnknownProperty,
    /// Instance state does not allow the operation (no key, detached, ...).
    State,
    /// More instances than a single-valued association accepts.
    Cardinality,
    /// Custom validator failure.
    Custom,
}

/// A single property validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValidationError {
    /// Property that failed.
    pub property: String,
    /// Rule category.
    pub kind: ValidationErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Offending value, when there is one.
    pub value: Option<Value>,
}

impl FieldValidationError {
    /// Create a failure without a captured value.
    pub fn new(
        property: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            kind,
            message: message.into(),
            value: None,
        }
    }

    /// Attach the offending value.
    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

impl fmt::Display for FieldValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.message)
    }
}

/// One or more validation failures for an instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationError {
    /// Individual failures, in property order.
    pub errors: Vec<FieldValidationError>,
}

impl ValidationError {
    /// Wrap a single failure.
    #[must_use]
    pub fn single(error: FieldValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// True when no failures were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record a failure.
    pub fn push(&mut self, error: FieldValidationError) {
        self.errors.push(error);
    }

    /// First failure, if any.
    #[must_use]
    pub fn first(&self) -> Option<&FieldValidationError> {
        self.errors.first()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation failed")?;
        for (i, err) in self.errors.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Which storage rule a write broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Duplicate value on a unique column set.
    Unique,
    /// Reference to a missing row, or delete of a referenced row.
    ForeignKey,
    /// Null written to a non-nullable column.
    NotNull,
}

/// A driver-reported constraint violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintError {
    /// Rule category.
    pub kind: ConstraintKind,
    /// Table the write targeted.
    pub table: String,
    /// Columns involved.
    pub columns: Vec<String>,
    /// Driver message.
    pub message: String,
}

impl ConstraintError {
    /// Create a constraint error.
    pub fn new(
        kind: ConstraintKind,
        table: impl Into<String>,
        columns: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            columns,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConstraintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} constraint violated on {}({}): {}",
            self.kind,
            self.table,
            self.columns.join(", "),
            self.message
        )
    }
}

/// An opaque backend failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverError {
    /// Driver name.
    pub driver: String,
    /// Driver message.
    pub message: String,
    /// Backend-specific payload, preserved as-is.
    pub payload: Option<serde_json::Value>,
}

impl DriverError {
    /// Create a driver error without payload.
    pub fn new(driver: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            message: message.into(),
            payload: None,
        }
    }

    /// Attach a backend payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} driver error: {}", self.driver, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            Error::not_found("pet", "key 1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::from(DriverError::new("memory", "boom")).kind(),
            ErrorKind::Driver
        );
        assert!(Error::not_found("pet", "x").is_not_found());
    }

    #[test]
    fn test_validation_display_lists_all_failures() {
        let mut err = ValidationError::default();
        err.push(FieldValidationError::new(
            "name",
            ValidationErrorKind::Required,
            "is required",
        ));
        err.push(FieldValidationError::new(
            "age",
            ValidationErrorKind::Range,
            "must be >= 0",
        ));
        assert_eq!(
            err.to_string(),
            "validation failed: name: is required; age: must be >= 0"
        );
    }

    #[test]
    fn test_driver_payload_preserved() {
        let err = DriverError::new("memory", "disk full")
            .with_payload(serde_json::json!({"errno": 28}));
        let wrapped = Error::from(err.clone());
        match wrapped {
            Error::Driver(inner) => assert_eq!(inner, err),
            other => panic!("unexpected {other:?}"),
        }
    }
}
