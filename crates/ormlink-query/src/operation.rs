//! Operation descriptors handed to drivers.
//!
//! The engine never builds backend-specific query text. It describes what it
//! wants as an [`Operation`] and the driver decides how to run it: a SQL
//! driver renders its own dialect, a document driver maps it onto collection
//! calls, the in-memory driver evaluates it directly.

use serde::{Deserialize, Serialize};

use ormlink_core::{Row, TableSchema, Value};

use crate::filter::Filter;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Column name.
    pub column: String,
    /// Direction.
    pub direction: Direction,
}

impl OrderBy {
    /// Ascending order on `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    /// Descending order on `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }

    /// Parse `"name"` / `"-name"` (leading dash means descending).
    #[must_use]
    pub fn parse(term: &str) -> Self {
        match term.strip_prefix('-') {
            Some(column) => Self::desc(column),
            None => Self::asc(term),
        }
    }
}

/// Restrict a select to rows that have a partner in another table.
///
/// Semantically `EXISTS (SELECT 1 FROM table WHERE table.on[i].0 =
/// row.on[i].1 AND filter)`. Only drivers reporting `supports_join` receive
/// selects carrying joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    /// Joined table.
    pub table: String,
    /// `(joined column, selected column)` pairs.
    pub on: Vec<(String, String)>,
    /// Filter applied to joined rows.
    pub filter: Filter,
}

/// Read rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Select {
    /// Table to read.
    pub table: String,
    /// Columns to return; `None` returns every column.
    pub columns: Option<Vec<String>>,
    /// Row filter.
    pub filter: Filter,
    /// Join restrictions.
    pub joins: Vec<Join>,
    /// Sort terms.
    pub order: Vec<OrderBy>,
    /// Maximum rows returned.
    pub limit: Option<usize>,
    /// Rows skipped before returning.
    pub offset: Option<usize>,
}

impl Select {
    /// Select every row of `table`.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Set the filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Add a join restriction.
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Set sort terms.
    #[must_use]
    pub fn order(mut self, order: Vec<OrderBy>) -> Self {
        self.order = order;
        self
    }

    /// Set the limit.
    #[must_use]
    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Set the offset.
    #[must_use]
    pub fn offset(mut self, offset: Option<usize>) -> Self {
        self.offset = offset;
        self
    }

    /// Restrict returned columns.
    #[must_use]
    pub fn columns(mut self, columns: Option<Vec<String>>) -> Self {
        self.columns = columns;
        self
    }
}

/// Insert one row; the driver returns the stored row with generated keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    /// Target table.
    pub table: String,
    /// Column values.
    pub values: Row,
}

/// Update matching rows; the driver returns one `affected` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Target table.
    pub table: String,
    /// New column values.
    pub set: Row,
    /// Which rows.
    pub filter: Filter,
}

/// Delete matching rows; the driver returns one `affected` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    /// Target table.
    pub table: String,
    /// Which rows.
    pub filter: Filter,
}

/// Discriminant of [`Operation`], for logging and fault matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Sync,
    Drop,
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

/// A primitive storage operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create the table if absent, or bring its definition up to date.
    Sync(TableSchema),
    /// Remove the table and its rows.
    Drop {
        /// Table name.
        table: String,
    },
    /// Read rows.
    Select(Select),
    /// Count rows a select would return (ignores limit/offset/order);
    /// the driver returns one `count` row.
    Count(Select),
    /// Insert a row.
    Insert(Insert),
    /// Update rows.
    Update(Update),
    /// Delete rows.
    Delete(Delete),
}

/// Column name of the single row returned by [`Operation::Count`].
pub const COUNT_COLUMN: &str = "count";

/// Column name of the single row returned by updates and deletes.
pub const AFFECTED_COLUMN: &str = "affected";

impl Operation {
    /// Discriminant.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Operation::Sync(_) => OperationKind::Sync,
            Operation::Drop { .. } => OperationKind::Drop,
            Operation::Select(_) => OperationKind::Select,
            Operation::Count(_) => OperationKind::Count,
            Operation::Insert(_) => OperationKind::Insert,
            Operation::Update(_) => OperationKind::Update,
            Operation::Delete(_) => OperationKind::Delete,
        }
    }

    /// Table the operation targets.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Operation::Sync(schema) => &schema.name,
            Operation::Drop { table } => table,
            Operation::Select(s) | Operation::Count(s) => &s.table,
            Operation::Insert(i) => &i.table,
            Operation::Update(u) => &u.table,
            Operation::Delete(d) => &d.table,
        }
    }

    /// True for operations that change stored rows.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Insert(_) | Operation::Update(_) | Operation::Delete(_)
        )
    }

    /// Shorthand for an equality update.
    pub fn update(table: impl Into<String>, set: Row, filter: Filter) -> Self {
        Operation::Update(Update {
            table: table.into(),
            set,
            filter,
        })
    }

    /// Shorthand for a delete.
    pub fn delete(table: impl Into<String>, filter: Filter) -> Self {
        Operation::Delete(Delete {
            table: table.into(),
            filter,
        })
    }

    /// Shorthand for an insert.
    pub fn insert(table: impl Into<String>, values: Row) -> Self {
        Operation::Insert(Insert {
            table: table.into(),
            values,
        })
    }
}

/// Read the single numeric column of a count/affected result.
#[must_use]
pub fn scalar(rows: &[Row], column: &str) -> u64 {
    rows.first()
        .and_then(|row| row.get(column))
        .and_then(Value::as_i64)
        .map_or(0, |n| u64::try_from(n).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_parse() {
        assert_eq!(OrderBy::parse("-name"), OrderBy::desc("name"));
        assert_eq!(OrderBy::parse("name"), OrderBy::asc("name"));
    }

    #[test]
    fn test_operation_table_and_kind() {
        let op = Operation::Count(Select::from("pet"));
        assert_eq!(op.table(), "pet");
        assert_eq!(op.kind(), OperationKind::Count);
        assert!(!op.is_write());
        assert!(Operation::delete("pet", Filter::new()).is_write());
    }

    #[test]
    fn test_scalar() {
        let rows = vec![Row::new().with(COUNT_COLUMN, 3)];
        assert_eq!(scalar(&rows, COUNT_COLUMN), 3);
        assert_eq!(scalar(&[], COUNT_COLUMN), 0);
    }
}
