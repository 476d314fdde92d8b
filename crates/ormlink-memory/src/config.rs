//! Configuration for [`MemoryDriver`](crate::MemoryDriver).

use ormlink_core::PropertyType;

/// Storage model the driver emulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flavor {
    /// Tables with serial keys, joins and enforced foreign keys.
    #[default]
    Relational,
    /// Collections with generated text `_id` keys and no joins.
    Document,
}

/// Order rows come back in when a select carries no explicit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// Insertion order.
    #[default]
    Insertion,
    /// Ascending key order.
    Key,
    /// Most recently inserted first.
    Reverse,
}

/// In-memory driver configuration.
///
/// # Example
///
/// ```rust
/// use ormlink_memory::{MemoryConfig, RowOrder};
///
/// let config = MemoryConfig::document().row_order(RowOrder::Reverse);
/// assert_eq!(config.key_column, "_id");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Storage model.
    pub flavor: Flavor,
    /// Key column used for tables that declare none.
    pub key_column: String,
    /// Default row order.
    pub row_order: RowOrder,
    /// Check foreign keys on writes and apply referential actions on delete.
    pub enforce_foreign_keys: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::relational()
    }
}

impl MemoryConfig {
    /// Relational defaults: `id` serial keys, enforced foreign keys.
    #[must_use]
    pub fn relational() -> Self {
        Self {
            flavor: Flavor::Relational,
            key_column: "id".to_string(),
            row_order: RowOrder::Insertion,
            enforce_foreign_keys: true,
        }
    }

    /// Document defaults: `_id` text keys, key order, no foreign keys.
    #[must_use]
    pub fn document() -> Self {
        Self {
            flavor: Flavor::Document,
            key_column: "_id".to_string(),
            row_order: RowOrder::Key,
            enforce_foreign_keys: false,
        }
    }

    /// Set the default key column.
    #[must_use]
    pub fn key_column(mut self, name: impl Into<String>) -> Self {
        self.key_column = name.into();
        self
    }

    /// Set the default row order.
    #[must_use]
    pub fn row_order(mut self, order: RowOrder) -> Self {
        self.row_order = order;
        self
    }

    /// Enable or disable foreign-key enforcement.
    ///
    /// Ignored for the document flavor.
    #[must_use]
    pub fn enforce_foreign_keys(mut self, enforce: bool) -> Self {
        self.enforce_foreign_keys = enforce;
        self
    }

    /// Whether selects may carry joins.
    #[must_use]
    pub const fn supports_join(&self) -> bool {
        matches!(self.flavor, Flavor::Relational)
    }

    /// Whether foreign keys are checked.
    #[must_use]
    pub const fn checks_foreign_keys(&self) -> bool {
        self.enforce_foreign_keys && matches!(self.flavor, Flavor::Relational)
    }

    /// Key type generated for tables without a declared key.
    #[must_use]
    pub const fn generated_key_type(&self) -> PropertyType {
        match self.flavor {
            Flavor::Relational => PropertyType::Serial,
            Flavor::Document => PropertyType::Text,
        }
    }
}
