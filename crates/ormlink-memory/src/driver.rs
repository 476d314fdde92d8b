//! The in-memory [`Driver`] implementation.

use std::sync::{Mutex, PoisonError};

use ormlink_core::{Cx, Error, Outcome, PropertyType, Row, TableSchema};
use ormlink_query::{
    AFFECTED_COLUMN, COUNT_COLUMN, Driver, DriverFuture, Operation, OperationKind,
};

use crate::config::MemoryConfig;
use crate::store::{DRIVER_NAME, Store, key_columns};

/// A failure queued by [`MemoryDriver::fail_next`].
#[derive(Debug, Clone)]
struct Fault {
    kind: OperationKind,
    table: Option<String>,
    error: Error,
}

impl Fault {
    fn matches(&self, op: &Operation) -> bool {
        self.kind == op.kind() && self.table.as_deref().is_none_or(|t| t == op.table())
    }
}

/// A driver keeping every table in process memory.
///
/// Operations complete synchronously; the returned future is already
/// resolved. One driver may be shared by any number of registries.
///
/// # Example
///
/// ```rust
/// use ormlink_memory::{MemoryConfig, MemoryDriver};
/// use ormlink_query::Driver;
///
/// let driver = MemoryDriver::new(MemoryConfig::document());
/// assert!(!driver.supports_join());
/// ```
#[derive(Debug, Default)]
pub struct MemoryDriver {
    config: MemoryConfig,
    store: Mutex<Store>,
    faults: Mutex<Vec<Fault>>,
    history: Mutex<Vec<(OperationKind, String)>>,
}

impl MemoryDriver {
    /// Create a driver with the given configuration.
    #[must_use]
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Relational driver with default settings.
    #[must_use]
    pub fn relational() -> Self {
        Self::new(MemoryConfig::relational())
    }

    /// Document driver with default settings.
    #[must_use]
    pub fn document() -> Self {
        Self::new(MemoryConfig::document())
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Make the next operation of `kind` (on `table`, if given) fail with
    /// `error` instead of running. Queued failures fire in order.
    pub fn fail_next(&self, kind: OperationKind, table: Option<&str>, error: Error) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Fault {
                kind,
                table: table.map(str::to_string),
                error,
            });
    }

    /// Kinds and tables of every operation executed so far, including
    /// failed ones.
    #[must_use]
    pub fn history(&self) -> Vec<(OperationKind, String)> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of operations executed so far.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether a table exists.
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// Number of stored rows in a table.
    #[must_use]
    pub fn row_count(&self, name: &str) -> Option<usize> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .row_count(name)
    }

    fn take_fault(&self, op: &Operation) -> Option<Error> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        let idx = faults.iter().position(|f| f.matches(op))?;
        Some(faults.remove(idx).error)
    }

    #[tracing::instrument(level = "debug", skip(self, op), fields(kind = ?op.kind(), table = op.table()))]
    fn run(&self, op: &Operation) -> Result<Vec<Row>, Error> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((op.kind(), op.table().to_string()));

        if let Some(error) = self.take_fault(op) {
            tracing::debug!(error = %error, "Injected failure");
            return Err(error);
        }

        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let config = &self.config;
        match op {
            Operation::Sync(schema) => {
                store.sync(schema);
                Ok(Vec::new())
            }
            Operation::Drop { table } => {
                store.drop_table(table);
                Ok(Vec::new())
            }
            Operation::Select(select) => store.select(config, select),
            Operation::Count(select) => {
                let n = store.count(config, select)?;
                Ok(vec![Row::new().with(COUNT_COLUMN, counted(n))])
            }
            Operation::Insert(insert) => Ok(vec![store.insert(config, insert)?]),
            Operation::Update(update) => {
                let n = store.update(config, update)?;
                Ok(vec![Row::new().with(AFFECTED_COLUMN, counted(n))])
            }
            Operation::Delete(delete) => {
                let n = store.delete(config, delete)?;
                Ok(vec![Row::new().with(AFFECTED_COLUMN, counted(n))])
            }
        }
    }
}

fn counted(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn execute<'a>(&'a self, _cx: &'a Cx, op: &'a Operation) -> DriverFuture<'a, Vec<Row>> {
        let outcome = match self.run(op) {
            Ok(rows) => Outcome::Ok(rows),
            Err(e) => Outcome::Err(e),
        };
        Box::pin(std::future::ready(outcome))
    }

    fn supports_join(&self) -> bool {
        self.config.supports_join()
    }

    fn key_columns(&self, table: &TableSchema) -> Vec<String> {
        key_columns(&self.config, table)
    }

    fn generated_key_type(&self) -> PropertyType {
        self.config.generated_key_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use ormlink_core::{DriverError, Property, Value};
    use ormlink_query::{Filter, Insert, Select, scalar};

    fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> Result<T, String> {
        match outcome {
            Outcome::Ok(v) => Ok(v),
            Outcome::Err(e) => Err(format!("unexpected error: {e}")),
            Outcome::Cancelled(r) => Err(format!("cancelled: {r:?}")),
            Outcome::Panicked(p) => Err(format!("panicked: {p:?}")),
        }
    }

    fn pets() -> TableSchema {
        TableSchema::new("pet")
            .column(Property::new("id", PropertyType::Serial).key())
            .column(Property::new("name", PropertyType::Text))
            .key(vec!["id".into()])
    }

    #[test]
    fn test_execute_round() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let driver = MemoryDriver::relational();

        rt.block_on(async {
            unwrap_outcome(driver.execute(&cx, &Operation::Sync(pets())).await).expect("sync");
            let inserted = unwrap_outcome(
                driver
                    .execute(&cx, &Operation::insert("pet", Row::new().with("name", "Deco")))
                    .await,
            )
            .expect("insert");
            assert_eq!(inserted[0].value("id"), Value::BigInt(1));

            let count = unwrap_outcome(
                driver
                    .execute(&cx, &Operation::Count(Select::from("pet")))
                    .await,
            )
            .expect("count");
            assert_eq!(scalar(&count, COUNT_COLUMN), 1);

            let deleted = unwrap_outcome(
                driver
                    .execute(&cx, &Operation::delete("pet", Filter::new().eq("id", 1)))
                    .await,
            )
            .expect("delete");
            assert_eq!(scalar(&deleted, AFFECTED_COLUMN), 1);
        });
        assert_eq!(driver.operation_count(), 4);
    }

    #[test]
    fn test_fail_next_fires_once() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let driver = MemoryDriver::relational();
        let injected = Error::Driver(
            DriverError::new("memory", "connection reset")
                .with_payload(serde_json::json!({"errno": 104})),
        );
        driver.fail_next(OperationKind::Insert, Some("pet"), injected.clone());

        rt.block_on(async {
            unwrap_outcome(driver.execute(&cx, &Operation::Sync(pets())).await).expect("sync");
            let op = Operation::Insert(Insert {
                table: "pet".into(),
                values: Row::new().with("name", "Deco"),
            });
            match driver.execute(&cx, &op).await {
                Outcome::Err(e) => assert_eq!(e, injected),
                _ => panic!("expected injected failure"),
            }
            unwrap_outcome(driver.execute(&cx, &op).await).expect("second insert runs");
        });
        assert_eq!(driver.row_count("pet"), Some(1));
    }

    #[test]
    fn test_document_key_columns() {
        let driver = MemoryDriver::document();
        assert_eq!(driver.key_columns(&TableSchema::new("pet")), vec!["_id".to_string()]);
        assert_eq!(driver.generated_key_type(), PropertyType::Text);
    }
}
