//! Models: named schemas bound to a registry's driver.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use ormlink_core::{
    AccessorKind, AssociationInfo, Cx, Error, ForeignKey, Outcome, Property, PropertyType, Result,
    Row, SharedValidator, TableSchema, ValidationError, ValidationErrorKind, Validator, Value,
    hash_key, try_ok, try_outcome,
};
use ormlink_query::{Filter, Operation, Select};

use crate::association::{Association, AssociationOptions, define};
use crate::conditions::Conditions;
use crate::facade::promise_and_callback;
use crate::find::ChainFind;
use crate::hooks::Hooks;
use crate::instance::{Instance, InstanceStatus};
use crate::registry::Context;

/// Per-model definition options.
#[derive(Debug, Clone, Default)]
pub struct ModelOptions {
    pub(crate) table: Option<String>,
    pub(crate) key: Vec<String>,
    pub(crate) hooks: Hooks,
    pub(crate) validators: Vec<(String, SharedValidator)>,
}

impl ModelOptions {
    /// Default options: table named after the model, driver-chosen key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the model in `table` instead of a table named after it.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Use these properties as the key.
    #[must_use]
    pub fn key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Hooks around `save` and `remove`.
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Attach a validator to a property.
    #[must_use]
    pub fn validate(mut self, property: impl Into<String>, validator: impl Validator + 'static) -> Self {
        self.validators.push((property.into(), Arc::new(validator)));
        self
    }
}

pub(crate) struct ModelInner {
    name: String,
    key: Vec<String>,
    ctx: Arc<Context>,
    schema: RwLock<TableSchema>,
    join_tables: RwLock<Vec<TableSchema>>,
    associations: RwLock<Vec<Arc<Association>>>,
    hooks: Hooks,
    validators: Vec<(String, SharedValidator)>,
}

impl ModelInner {
    pub(crate) fn new(
        name: String,
        key: Vec<String>,
        ctx: Arc<Context>,
        schema: TableSchema,
        options: ModelOptions,
    ) -> Self {
        Self {
            name,
            key,
            ctx,
            schema: RwLock::new(schema),
            join_tables: RwLock::new(Vec::new()),
            associations: RwLock::new(Vec::new()),
            hooks: options.hooks,
            validators: options.validators,
        }
    }
}

/// A defined model.
///
/// Cheap to clone; clones refer to the same definition. Two handles are
/// equal when they refer to the same definition.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("table", &self.table())
            .field("key", &self.inner.key)
            .finish()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Model {}

impl Model {
    pub(crate) fn from_inner(inner: Arc<ModelInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ModelInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn ctx(&self) -> &Context {
        &self.inner.ctx
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    pub(crate) fn validators(&self) -> &[(String, SharedValidator)] {
        &self.inner.validators
    }

    // ------------------------------------------------------------------------
    // Definition
    // ------------------------------------------------------------------------

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Storage table name.
    #[must_use]
    pub fn table(&self) -> String {
        self.read_schema().name.clone()
    }

    /// Key columns.
    #[must_use]
    pub fn key(&self) -> &[String] {
        &self.inner.key
    }

    /// Current table schema, including foreign keys added by associations.
    #[must_use]
    pub fn schema(&self) -> TableSchema {
        self.read_schema().clone()
    }

    /// Join tables owned by this model's hasMany associations.
    #[must_use]
    pub fn join_tables(&self) -> Vec<TableSchema> {
        self.inner
            .join_tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Properties in declaration order.
    #[must_use]
    pub fn properties(&self) -> Vec<Property> {
        self.read_schema().columns.clone()
    }

    /// One property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<Property> {
        self.read_schema().column_def(name).cloned()
    }

    /// Whether `name` is a property.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.read_schema().column_def(name).is_some()
    }

    pub(crate) fn property_index(&self, name: &str) -> Option<usize> {
        self.read_schema().columns.iter().position(|c| c.name == name)
    }

    fn read_schema(&self) -> std::sync::RwLockReadGuard<'_, TableSchema> {
        self.inner.schema.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_schema(&self) -> std::sync::RwLockWriteGuard<'_, TableSchema> {
        self.inner
            .schema
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add_property(&self, property: Property) {
        self.write_schema().add_column(property);
    }

    /// Change a declared column's type, keeping its other attributes.
    pub(crate) fn retype_property(&self, name: &str, kind: PropertyType) {
        let mut schema = self.write_schema();
        if let Some(column) = schema.columns.iter_mut().find(|c| c.name == name) {
            column.kind = kind;
        }
    }

    pub(crate) fn add_foreign_key(&self, fk: ForeignKey) {
        self.write_schema().foreign_keys.push(fk);
    }

    pub(crate) fn add_unique(&self, columns: Vec<String>) {
        let mut schema = self.write_schema();
        if !schema.unique.contains(&columns) {
            schema.unique.push(columns);
        }
    }

    pub(crate) fn add_join_table(&self, schema: TableSchema) {
        self.inner
            .join_tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(schema);
    }

    pub(crate) fn add_association(&self, association: Association) {
        self.inner
            .associations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(association));
    }

    pub(crate) fn association(&self, name: &str) -> Option<Arc<Association>> {
        self.inner
            .associations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.info.name == name)
            .cloned()
    }

    /// Descriptors of every association, forward and reverse.
    #[must_use]
    pub fn associations(&self) -> Vec<AssociationInfo> {
        self.inner
            .associations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|a| a.info.clone())
            .collect()
    }

    /// Whether `name` is already taken by a property or association.
    pub(crate) fn name_taken(&self, name: &str) -> bool {
        self.has_property(name) || self.association(name).is_some()
    }

    /// Every synthesized accessor method name (`getPet`, `getPetAsync`, ...).
    #[must_use]
    pub fn accessor_names(&self) -> Vec<String> {
        self.inner
            .associations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(|a| a.info.accessors.all())
            .collect()
    }

    /// Whether instances of this model expose `method`.
    #[must_use]
    pub fn has_accessor(&self, method: &str) -> bool {
        self.resolve_accessor(method).is_some()
    }

    pub(crate) fn resolve_accessor(
        &self,
        method: &str,
    ) -> Option<(Arc<Association>, AccessorKind, bool)> {
        self.inner
            .associations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find_map(|a| {
                a.info
                    .accessors
                    .resolve(method)
                    .map(|(kind, promise)| (Arc::clone(a), kind, promise))
            })
    }

    /// Declare a hasOne association: this model stores the target's key.
    pub fn has_one(&self, name: &str, target: &Model, options: AssociationOptions) -> Result<()> {
        define::has_one(self, name, target, options)
    }

    /// Declare a hasMany association through a join table.
    pub fn has_many(&self, name: &str, target: &Model, options: AssociationOptions) -> Result<()> {
        define::has_many(self, name, target, options)
    }

    /// Declare an extendsTo association: `target` rows are keyed by this
    /// model's key and exist only alongside their source row.
    pub fn extends_to(&self, name: &str, target: &Model, options: AssociationOptions) -> Result<()> {
        define::extends_to(self, name, target, options)
    }

    // ------------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------------

    /// Build an unsaved instance, applying property defaults.
    pub fn new_instance(&self, data: Row) -> Result<Instance> {
        let schema = self.schema();
        let mut errors = ValidationError::default();
        for (column, _) in data.iter() {
            if schema.column_def(column).is_none() {
                errors.push(ormlink_core::FieldValidationError::new(
                    column,
                    ValidationErrorKind::UnknownProperty,
                    format!("{} has no property {column}", self.name()),
                ));
            }
        }
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let mut row = Row::new();
        for column in &schema.columns {
            match data.get(&column.name) {
                Some(value) => row.set(column.name.clone(), value.clone()),
                None => row.set(
                    column.name.clone(),
                    column.default.clone().unwrap_or(Value::Null),
                ),
            }
        }
        Ok(Instance::new(self.clone(), row, InstanceStatus::New))
    }

    /// An instance standing for the stored row with this key, without
    /// loading it.
    pub fn reference(&self, key: impl Into<Value>) -> Result<Instance> {
        let values = self.key_values(key.into())?;
        let row = self.key().iter().cloned().zip(values).collect();
        Ok(Instance::new(self.clone(), row, InstanceStatus::Persistent))
    }

    /// Split a key argument into one value per key column.
    pub(crate) fn key_values(&self, key: Value) -> Result<Vec<Value>> {
        let width = self.key().len();
        let values = match key {
            Value::Array(items) if width > 1 || items.len() == 1 => items,
            other => vec![other],
        };
        if values.len() != width || values.iter().any(Value::is_null) {
            return Err(Error::validation(
                self.key().join(","),
                ValidationErrorKind::Type,
                format!("{} key has {width} column(s)", self.name()),
            ));
        }
        Ok(values)
    }

    /// Filter selecting rows by key.
    pub(crate) fn key_filter(&self, keys: &[Vec<Value>]) -> Filter {
        Filter::key_match(self.key(), keys)
    }

    /// Wrap driver rows. Rows repeated by a join collapse into the first one.
    pub(crate) fn wrap(&self, rows: Vec<Row>) -> Vec<Instance> {
        if !self.ctx().settings.instance_cache {
            return rows
                .into_iter()
                .map(|row| Instance::new(self.clone(), row, InstanceStatus::Persistent))
                .collect();
        }
        let mut seen: HashSet<u64> = HashSet::new();
        rows.into_iter()
            .filter(|row| {
                let key = row.values_for(self.key());
                key.iter().any(Value::is_null) || seen.insert(hash_key(&key))
            })
            .map(|row| Instance::new(self.clone(), row, InstanceStatus::Persistent))
            .collect()
    }

    /// Run a select against this model's table and wrap the rows.
    pub(crate) async fn select(&self, cx: &Cx, select: Select) -> Outcome<Vec<Instance>, Error> {
        let rows = try_outcome!(self.ctx().execute(cx, Operation::Select(select)).await);
        Outcome::Ok(self.wrap(rows))
    }

    /// A lazy query over this model.
    #[must_use]
    pub fn find(&self, conditions: Conditions) -> ChainFind {
        ChainFind::new(self.clone(), conditions)
    }

    /// A lazy query over every row.
    #[must_use]
    pub fn all(&self) -> ChainFind {
        self.find(Conditions::new())
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Create and save one instance.
    #[tracing::instrument(level = "debug", skip(self, cx, data), fields(model = %self.inner.name))]
    pub async fn create(&self, cx: &Cx, data: Row) -> Outcome<Instance, Error> {
        let instance = try_ok!(self.new_instance(data));
        try_outcome!(instance.save(cx).await);
        Outcome::Ok(instance)
    }

    /// Create and save several instances in order; stops at the first failure.
    pub async fn create_many(&self, cx: &Cx, data: Vec<Row>) -> Outcome<Vec<Instance>, Error> {
        let mut created = Vec::with_capacity(data.len());
        for row in data {
            created.push(try_outcome!(self.create(cx, row).await));
        }
        Outcome::Ok(created)
    }

    /// Load one instance by key; not-found when absent.
    pub async fn get(&self, cx: &Cx, key: Value) -> Outcome<Instance, Error> {
        let values = try_ok!(self.key_values(key));
        let select = Select::from(self.table())
            .filter(self.key_filter(std::slice::from_ref(&values)))
            .limit(Some(1));
        let found = try_outcome!(self.select(cx, select).await);
        match found.into_iter().next() {
            Some(instance) => Outcome::Ok(instance),
            None => Outcome::Err(Error::not_found(
                self.name(),
                format!("no row with key {}", Value::Array(values)),
            )),
        }
    }

    /// First instance matching `conditions`, if any.
    pub async fn one(&self, cx: &Cx, conditions: Conditions) -> Outcome<Option<Instance>, Error> {
        self.find(conditions).first(cx).await
    }

    /// Number of instances matching `conditions`.
    pub async fn count(&self, cx: &Cx, conditions: Conditions) -> Outcome<u64, Error> {
        self.find(conditions).count(cx).await
    }

    /// Whether any instance matches `conditions`.
    pub async fn exists(&self, cx: &Cx, conditions: Conditions) -> Outcome<bool, Error> {
        let n = try_outcome!(self.count(cx, conditions).await);
        Outcome::Ok(n > 0)
    }

    /// Delete every row of this model; returns the number removed.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = %self.inner.name))]
    pub async fn clear(&self, cx: &Cx) -> Outcome<u64, Error> {
        let n = try_outcome!(
            self.ctx()
                .affected(cx, Operation::delete(self.table(), Filter::new()))
                .await
        );
        tracing::info!(model = self.name(), rows = n, "Cleared model");
        Outcome::Ok(n)
    }

    /// Create or update this model's table and its join tables.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = %self.inner.name))]
    pub async fn sync(&self, cx: &Cx) -> Outcome<(), Error> {
        try_outcome!(self.ctx().execute(cx, Operation::Sync(self.schema())).await);
        for join in self.join_tables() {
            try_outcome!(self.ctx().execute(cx, Operation::Sync(join)).await);
        }
        Outcome::Ok(())
    }

    /// Drop this model's join tables and table.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = %self.inner.name))]
    pub async fn drop(&self, cx: &Cx) -> Outcome<(), Error> {
        for join in self.join_tables() {
            try_outcome!(
                self.ctx()
                    .execute(cx, Operation::Drop { table: join.name })
                    .await
            );
        }
        try_outcome!(
            self.ctx()
                .execute(cx, Operation::Drop { table: self.table() })
                .await
        );
        Outcome::Ok(())
    }

    promise_and_callback! {
        create => create_async, create_cb (data: Row) -> Instance;
        create_many => create_many_async, create_many_cb (data: Vec<Row>) -> Vec<Instance>;
        get => get_async, get_cb (key: Value) -> Instance;
        one => one_async, one_cb (conditions: Conditions) -> Option<Instance>;
        count => count_async, count_cb (conditions: Conditions) -> u64;
        exists => exists_async, exists_cb (conditions: Conditions) -> bool;
        clear => clear_async, clear_cb () -> u64;
        sync => sync_async, sync_cb () -> ();
        drop => drop_async, drop_cb () -> ();
    }
}
