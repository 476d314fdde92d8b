//! The model registry and the connection context it shares with models.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use ormlink_core::{Cx, Error, Outcome, Property, Result, Row, TableSchema, try_outcome};
use ormlink_query::{COUNT_COLUMN, AFFECTED_COLUMN, Driver, Operation, Select, scalar};

use crate::facade::promise_and_callback;
use crate::model::{Model, ModelInner, ModelOptions};
use crate::settings::Settings;

// ============================================================================
// Context
// ============================================================================

/// Driver plus settings, owned by a registry and injected into every model
/// it defines.
pub(crate) struct Context {
    pub(crate) driver: Arc<dyn Driver>,
    pub(crate) settings: Settings,
}

impl Context {
    /// Run one operation through the driver.
    pub(crate) async fn execute(&self, cx: &Cx, op: Operation) -> Outcome<Vec<Row>, Error> {
        tracing::debug!(
            driver = self.driver.name(),
            kind = ?op.kind(),
            table = op.table(),
            "Executing operation"
        );
        self.driver.execute(cx, &op).await
    }

    /// Count rows matching a select.
    pub(crate) async fn count(&self, cx: &Cx, select: Select) -> Outcome<u64, Error> {
        let rows = try_outcome!(self.execute(cx, Operation::Count(select)).await);
        Outcome::Ok(scalar(&rows, COUNT_COLUMN))
    }

    /// Run an update or delete and return the number of affected rows.
    pub(crate) async fn affected(&self, cx: &Cx, op: Operation) -> Outcome<u64, Error> {
        let rows = try_outcome!(self.execute(cx, op).await);
        Outcome::Ok(scalar(&rows, AFFECTED_COLUMN))
    }
}

// ============================================================================
// Registry
// ============================================================================

struct RegistryInner {
    ctx: Arc<Context>,
    models: RwLock<Vec<Model>>,
}

/// Maps model names to definitions over one shared driver.
///
/// Cloning a registry is cheap; clones share models and driver.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::new(Arc::new(MemoryDriver::relational()));
/// let person = registry.define(
///     "person",
///     vec![Property::new("name", PropertyType::Text)],
///     ModelOptions::new(),
/// )?;
/// registry.sync(&cx).await;
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("driver", &self.inner.ctx.driver.name())
            .field("models", &self.model_names())
            .finish()
    }
}

impl Registry {
    /// Create a registry with default settings.
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_settings(driver, Settings::default())
    }

    /// Create a registry with explicit settings.
    pub fn with_settings(driver: Arc<dyn Driver>, settings: Settings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                ctx: Arc::new(Context { driver, settings }),
                models: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.inner.ctx.settings
    }

    /// The shared driver.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.inner.ctx.driver
    }

    /// Look up a model by name.
    #[must_use]
    pub fn model(&self, name: &str) -> Option<Model> {
        self.inner
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    /// Every model, in definition order.
    #[must_use]
    pub fn models(&self) -> Vec<Model> {
        self.inner
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn model_names(&self) -> Vec<String> {
        self.models().iter().map(|m| m.name().to_string()).collect()
    }

    /// Define a model.
    ///
    /// Properties flagged as key form the key; otherwise `options.key` names
    /// it; otherwise the settings' or driver's default key column is added
    /// with the driver's generated key type.
    pub fn define(
        &self,
        name: &str,
        properties: Vec<Property>,
        options: ModelOptions,
    ) -> Result<Model> {
        if name.is_empty() {
            return Err(Error::definition("model name must not be empty"));
        }
        if self.model(name).is_some() {
            return Err(Error::definition(format!("model {name} is already defined")));
        }

        let ctx = &self.inner.ctx;
        let table = options.table.clone().unwrap_or_else(|| name.to_string());
        let mut schema = TableSchema::new(&table);
        let mut seen = HashSet::new();
        for property in properties {
            if !seen.insert(property.name.clone()) {
                return Err(Error::definition(format!(
                    "{name}: property {} declared twice",
                    property.name
                )));
            }
            schema.add_column(property);
        }

        let mut key: Vec<String> = schema
            .columns
            .iter()
            .filter(|c| c.key)
            .map(|c| c.name.clone())
            .collect();
        if key.is_empty() {
            key.clone_from(&options.key);
        }
        if key.is_empty() {
            key = match &ctx.settings.key_column {
                Some(column) => vec![column.clone()],
                None => ctx.driver.key_columns(&schema),
            };
            for column in key.iter().rev() {
                if schema.column_def(column).is_none() {
                    schema.columns.insert(
                        0,
                        Property::new(column, ctx.driver.generated_key_type()).key(),
                    );
                }
            }
        }
        for column in &key {
            match schema.columns.iter_mut().find(|c| &c.name == column) {
                Some(c) => c.key = true,
                None => {
                    return Err(Error::definition(format!(
                        "{name}: key column {column} is not a property"
                    )));
                }
            }
        }
        schema.key.clone_from(&key);

        for (property, _) in &options.validators {
            if schema.column_def(property).is_none() {
                return Err(Error::definition(format!(
                    "{name}: validator for unknown property {property}"
                )));
            }
        }

        let model = Model::from_inner(Arc::new(ModelInner::new(
            name.to_string(),
            key,
            Arc::clone(ctx),
            schema,
            options,
        )));
        self.inner
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(model.clone());

        tracing::info!(
            model = name,
            table = %table,
            key = ?model.key(),
            "Defined model"
        );
        Ok(model)
    }

    /// Create or update every model table and join table, in definition order.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn sync(&self, cx: &Cx) -> Outcome<(), Error> {
        for model in self.models() {
            try_outcome!(model.sync(cx).await);
        }
        Outcome::Ok(())
    }

    /// Drop every model table and join table, in reverse definition order.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn drop(&self, cx: &Cx) -> Outcome<(), Error> {
        for model in self.models().iter().rev() {
            try_outcome!(model.drop(cx).await);
        }
        Outcome::Ok(())
    }

    promise_and_callback! {
        sync => sync_async, sync_cb () -> ();
        drop => drop_async, drop_cb () -> ();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlink_core::PropertyType;
    use ormlink_memory::MemoryDriver;

    #[test]
    fn test_define_adds_driver_key() {
        let registry = Registry::new(Arc::new(MemoryDriver::relational()));
        let pet = registry
            .define(
                "pet",
                vec![Property::new("name", PropertyType::Text)],
                ModelOptions::new(),
            )
            .unwrap();
        assert_eq!(pet.key(), ["id".to_string()]);
        assert_eq!(
            pet.property("id").map(|p| p.kind),
            Some(PropertyType::Serial)
        );

        let doc = Registry::new(Arc::new(MemoryDriver::document()));
        let pet = doc
            .define("pet", vec![], ModelOptions::new())
            .unwrap();
        assert_eq!(pet.key(), ["_id".to_string()]);
        assert_eq!(pet.property("_id").map(|p| p.kind), Some(PropertyType::Text));
    }

    #[test]
    fn test_define_rejects_bad_definitions() {
        let registry = Registry::new(Arc::new(MemoryDriver::relational()));
        registry.define("pet", vec![], ModelOptions::new()).unwrap();
        assert!(matches!(
            registry.define("pet", vec![], ModelOptions::new()),
            Err(Error::Definition(_))
        ));
        assert!(matches!(
            registry.define(
                "person",
                vec![
                    Property::new("name", PropertyType::Text),
                    Property::new("name", PropertyType::Text),
                ],
                ModelOptions::new(),
            ),
            Err(Error::Definition(_))
        ));
        assert!(matches!(
            registry.define("car", vec![], ModelOptions::new().key(["vin"])),
            Err(Error::Definition(_))
        ));
    }

    #[test]
    fn test_declared_key_is_kept() {
        let registry = Registry::new(Arc::new(MemoryDriver::relational()));
        let car = registry
            .define(
                "car",
                vec![Property::new("vin", PropertyType::Text).key()],
                ModelOptions::new(),
            )
            .unwrap();
        assert_eq!(car.key(), ["vin".to_string()]);
        assert!(registry.model("car").is_some());
        assert!(registry.model("boat").is_none());
    }
}
