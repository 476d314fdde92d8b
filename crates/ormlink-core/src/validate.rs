//! Property validators.
//!
//! Validators run on the instance layer before any write reaches a driver.
//! A model attaches any number of validators per property; the built-in ones
//! cover the common rules and [`Validator`] is open for custom checks.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use regex::Regex;

use crate::error::{FieldValidationError, ValidationErrorKind};
use crate::value::Value;

/// Thread-safe cache of compiled patterns.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check if a string matches a regex pattern, compiling it at most once.
///
/// Invalid patterns never match; the failure is logged.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}

/// Validate a regex pattern up front.
///
/// Returns an error message if the pattern is invalid.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    match Regex::new(pattern) {
        Ok(_) => None,
        Err(e) => Some(format!("invalid regex pattern: {e}")),
    }
}

/// A rule applied to one property value.
pub trait Validator: Send + Sync + fmt::Debug {
    /// Check `value` for `property`.
    ///
    /// `Null` values reach validators only when the property is present;
    /// most rules let `Null` through and leave it to [`Required`].
    fn validate(&self, property: &str, value: &Value) -> Result<(), FieldValidationError>;
}

/// Shared validator handle.
pub type SharedValidator = Arc<dyn Validator>;

/// Value must be present and non-empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct Required;

impl Validator for Required {
    fn validate(&self, property: &str, value: &Value) -> Result<(), FieldValidationError> {
        let empty = match value {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        };
        if empty {
            return Err(FieldValidationError::new(
                property,
                ValidationErrorKind::Required,
                "is required",
            ));
        }
        Ok(())
    }
}

/// Text value must match a regex.
#[derive(Debug, Clone)]
pub struct Pattern {
    pattern: String,
}

impl Pattern {
    /// Create a pattern validator; the pattern is checked eagerly.
    pub fn new(pattern: impl Into<String>) -> Result<Self, String> {
        let pattern = pattern.into();
        if let Some(msg) = validate_pattern(&pattern) {
            return Err(msg);
        }
        Ok(Self { pattern })
    }
}

impl Validator for Pattern {
    fn validate(&self, property: &str, value: &Value) -> Result<(), FieldValidationError> {
        match value {
            Value::Null => Ok(()),
            Value::Text(s) if matches_pattern(s, &self.pattern) => Ok(()),
            other => Err(FieldValidationError::new(
                property,
                ValidationErrorKind::Pattern,
                format!("does not match {}", self.pattern),
            )
            .with_value(other.clone())),
        }
    }
}

/// Numeric value must lie within bounds (inclusive).
#[derive(Debug, Clone, Copy, Default)]
pub struct Range {
    /// Lower bound.
    pub min: Option<f64>,
    /// Upper bound.
    pub max: Option<f64>,
}

impl Range {
    /// Create a range; either side may be open.
    #[must_use]
    pub const fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }
}

impl Validator for Range {
    fn validate(&self, property: &str, value: &Value) -> Result<(), FieldValidationError> {
        if value.is_null() {
            return Ok(());
        }
        let Some(n) = value.as_f64() else {
            return Err(FieldValidationError::new(
                property,
                ValidationErrorKind::Type,
                "expected a number",
            )
            .with_value(value.clone()));
        };
        if self.min.is_some_and(|min| n < min) || self.max.is_some_and(|max| n > max) {
            return Err(FieldValidationError::new(
                property,
                ValidationErrorKind::Range,
                format!("out of range [{:?}, {:?}]", self.min, self.max),
            )
            .with_value(value.clone()));
        }
        Ok(())
    }
}

/// Text (chars) or array length must lie within bounds (inclusive).
#[derive(Debug, Clone, Copy, Default)]
pub struct Length {
    /// Minimum length.
    pub min: Option<usize>,
    /// Maximum length.
    pub max: Option<usize>,
}

impl Length {
    /// Create a length rule.
    #[must_use]
    pub const fn new(min: Option<usize>, max: Option<usize>) -> Self {
        Self { min, max }
    }
}

impl Validator for Length {
    fn validate(&self, property: &str, value: &Value) -> Result<(), FieldValidationError> {
        let len = match value {
            Value::Null => return Ok(()),
            Value::Text(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Bytes(b) => b.len(),
            other => {
                return Err(FieldValidationError::new(
                    property,
                    ValidationErrorKind::Type,
                    "length applies to text, arrays and bytes",
                )
                .with_value(other.clone()));
            }
        };
        if self.min.is_some_and(|min| len < min) || self.max.is_some_and(|max| len > max) {
            return Err(FieldValidationError::new(
                property,
                ValidationErrorKind::Length,
                format!("length {len} out of range [{:?}, {:?}]", self.min, self.max),
            )
            .with_value(value.clone()));
        }
        Ok(())
    }
}

/// Value must be one of a fixed set.
#[derive(Debug, Clone)]
pub struct OneOf {
    allowed: Vec<Value>,
}

impl OneOf {
    /// Create a set-membership rule.
    pub fn new(allowed: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Validator for OneOf {
    fn validate(&self, property: &str, value: &Value) -> Result<(), FieldValidationError> {
        if value.is_null() || self.allowed.iter().any(|a| a.loose_eq(value)) {
            return Ok(());
        }
        Err(FieldValidationError::new(
            property,
            ValidationErrorKind::OneOf,
            "is not an allowed value",
        )
        .with_value(value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_email_pattern() {
        let email_pattern = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

        assert!(matches_pattern("test@example.com", email_pattern));
        assert!(!matches_pattern("invalid", email_pattern));
        assert!(!matches_pattern("test@", email_pattern));
    }

    #[test]
    fn test_invalid_pattern_returns_false() {
        assert!(!matches_pattern("anything", r"[unclosed"));
        assert!(Pattern::new(r"[unclosed").is_err());
    }

    #[test]
    fn test_validate_pattern_invalid() {
        let result = validate_pattern(r"[unclosed");
        assert!(result.unwrap().contains("invalid regex pattern"));
        assert!(validate_pattern(r"^\d{4}-\d{2}-\d{2}$").is_none());
    }

    #[test]
    fn test_required_rejects_empty_text() {
        assert!(Required.validate("name", &Value::from("")).is_err());
        assert!(Required.validate("name", &Value::Null).is_err());
        assert!(Required.validate("name", &Value::from("Deco")).is_ok());
    }

    #[test]
    fn test_pattern_validator_lets_null_through() {
        let v = Pattern::new(r"^[A-Z]").unwrap();
        assert!(v.validate("name", &Value::Null).is_ok());
        assert!(v.validate("name", &Value::from("Fido")).is_ok());
        let err = v.validate("name", &Value::from("fido")).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Pattern);
    }

    #[test]
    fn test_range_and_length() {
        let age = Range::new(Some(0.0), Some(150.0));
        assert!(age.validate("age", &Value::from(42)).is_ok());
        assert_eq!(
            age.validate("age", &Value::from(-1)).unwrap_err().kind,
            ValidationErrorKind::Range
        );

        let name = Length::new(Some(2), Some(4));
        assert!(name.validate("name", &Value::from("Deco")).is_ok());
        assert_eq!(
            name.validate("name", &Value::from("D")).unwrap_err().kind,
            ValidationErrorKind::Length
        );
    }

    #[test]
    fn test_one_of() {
        let v = OneOf::new(["cat", "dog"]);
        assert!(v.validate("species", &Value::from("dog")).is_ok());
        assert!(v.validate("species", &Value::from("cow")).is_err());
    }
}
