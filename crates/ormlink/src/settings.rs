//! Registry-wide settings.

use serde::{Deserialize, Serialize};

use ormlink_core::{Error, Result};

/// Behavior shared by every model of a registry.
///
/// Deserializes from JSON with every field optional:
///
/// ```rust
/// use ormlink::Settings;
///
/// let settings = Settings::from_json(r#"{ "strict_get": true }"#).unwrap();
/// assert!(settings.strict_get);
/// assert_eq!(settings.foreign_key_template, "{name}_{key}");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Key column for models that declare none; `None` defers to the driver.
    pub key_column: Option<String>,
    /// Foreign-key column naming; `{name}` is the association name and
    /// `{key}` the referenced key column.
    pub foreign_key_template: String,
    /// Join-table naming for hasMany; `{source}` is the source table and
    /// `{name}` the association name.
    pub join_table_template: String,
    /// Collect every validation failure instead of stopping at the first.
    pub return_all_errors: bool,
    /// `get` accessors fail with not-found when nothing is linked.
    pub strict_get: bool,
    /// Rows with the same key inside one retrieval collapse into one instance.
    pub instance_cache: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            key_column: None,
            foreign_key_template: "{name}_{key}".to_string(),
            join_table_template: "{source}_{name}".to_string(),
            return_all_errors: false,
            strict_get: false,
            instance_cache: true,
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::definition(format!("invalid settings: {e}")))
    }

    /// Foreign-key column name for association `name` referencing `key`.
    #[must_use]
    pub fn foreign_key(&self, name: &str, key: &str) -> String {
        self.foreign_key_template
            .replace("{name}", name)
            .replace("{key}", key)
    }

    /// Join-table name for association `name` on `source`.
    #[must_use]
    pub fn join_table(&self, source: &str, name: &str) -> String {
        self.join_table_template
            .replace("{source}", source)
            .replace("{name}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_templates() {
        let s = Settings::default();
        assert_eq!(s.foreign_key("pet", "id"), "pet_id");
        assert_eq!(s.join_table("person", "pets"), "person_pets");
        assert!(s.instance_cache);
    }

    #[test]
    fn test_from_json_partial() {
        let s = Settings::from_json(r#"{"key_column": "_id", "return_all_errors": true}"#).unwrap();
        assert_eq!(s.key_column.as_deref(), Some("_id"));
        assert!(s.return_all_errors);
        assert!(!s.strict_get);
        assert!(matches!(
            Settings::from_json("{nope"),
            Err(Error::Definition(_))
        ));
    }
}
