//! The driver contract.
//!
//! A driver executes primitive [`Operation`]s against one backend and reports
//! the capabilities the association engine needs to choose a strategy. The
//! engine shares one driver across every model of a registry, so drivers are
//! `Send + Sync` and hold their own interior state.

use std::future::Future;
use std::pin::Pin;

use ormlink_core::{Cx, Error, Outcome, PropertyType, Row, TableSchema};

use crate::operation::Operation;

/// Boxed future returned by [`Driver`] methods.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Outcome<T, Error>> + Send + 'a>>;

/// A storage backend.
///
/// Result shapes per operation:
///
/// | Operation | Rows returned |
/// |-----------|---------------|
/// | `Sync`, `Drop` | none |
/// | `Select` | matching rows |
/// | `Count` | one row, column `count` |
/// | `Insert` | the stored row, generated keys filled in |
/// | `Update`, `Delete` | one row, column `affected` |
///
/// Uniqueness and reference violations must be reported as
/// [`Error::Constraint`]; anything else the backend raises goes through
/// [`Error::Driver`] with its payload preserved.
pub trait Driver: Send + Sync {
    /// Short backend name used in logs and error payloads.
    fn name(&self) -> &str;

    /// Execute one operation.
    fn execute<'a>(&'a self, cx: &'a Cx, op: &'a Operation) -> DriverFuture<'a, Vec<Row>>;

    /// Whether selects may carry [`Join`](crate::operation::Join) restrictions.
    ///
    /// Drivers returning `false` get two-step queries instead.
    fn supports_join(&self) -> bool;

    /// Ordered key columns for a table.
    ///
    /// Defaults to the declared key, or `["id"]` when none is declared.
    fn key_columns(&self, table: &TableSchema) -> Vec<String> {
        if table.key.is_empty() {
            vec!["id".to_string()]
        } else {
            table.key.clone()
        }
    }

    /// Type of keys the backend generates for models without a declared key.
    fn generated_key_type(&self) -> PropertyType {
        PropertyType::Serial
    }
}

impl std::fmt::Debug for dyn Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver").field("name", &self.name()).finish()
    }
}
