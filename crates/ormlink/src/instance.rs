//! Live instances wrapping stored rows.
//!
//! An [`Instance`] is a shared handle: clones see the same row, dirty flags
//! and status. Instances returned by one retrieval share handles for equal
//! keys; separate retrievals produce separate handles.
//!
//! State is only ever updated after the driver reported success, and no lock
//! is held across a driver call.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ormlink_core::{
    AccessorKind, Cx, Error, FieldValidationError, FieldsSet, Outcome, Result, Row,
    ValidationError, ValidationErrorKind, Value, try_ok, try_outcome,
};
use ormlink_query::Operation;

use crate::association::{Accessor, AccessorArgs, AccessorValue};
use crate::facade::promise_and_callback;
use crate::hooks::HookEvent;
use crate::model::Model;

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// Not yet stored; `save` inserts it.
    New,
    /// Backed by a stored row; `save` updates dirty properties.
    Persistent,
    /// Removed from storage.
    Detached,
}

struct InstanceState {
    row: Row,
    dirty: FieldsSet,
    status: InstanceStatus,
    cache: HashMap<String, Vec<Instance>>,
}

/// A model instance.
#[derive(Clone)]
pub struct Instance {
    model: Model,
    state: Arc<RwLock<InstanceState>>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Instance")
            .field("model", &self.model.name())
            .field("status", &state.status)
            .field("row", &state.row)
            .finish()
    }
}

impl PartialEq for Instance {
    /// Same model and same key; unsaved instances are only equal to
    /// themselves.
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.state, &other.state) {
            return true;
        }
        if self.model != other.model {
            return false;
        }
        match (self.key(), other.key()) {
            (Some(a), Some(b)) => a.iter().zip(&b).all(|(x, y)| x.loose_eq(y)),
            _ => false,
        }
    }
}

impl Instance {
    pub(crate) fn new(model: Model, row: Row, status: InstanceStatus) -> Self {
        let dirty = match status {
            InstanceStatus::New => FieldsSet::all(model.properties().len()),
            InstanceStatus::Persistent | InstanceStatus::Detached => FieldsSet::empty(0),
        };
        Self {
            model,
            state: Arc::new(RwLock::new(InstanceState {
                row,
                dirty,
                status,
                cache: HashMap::new(),
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, InstanceState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InstanceState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Owning model.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Lifecycle state.
    #[must_use]
    pub fn status(&self) -> InstanceStatus {
        self.read().status
    }

    /// True until the first successful save.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.status() == InstanceStatus::New
    }

    /// True when both handles point at the same instance state.
    #[must_use]
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Property value, `Null` when unset.
    #[must_use]
    pub fn get(&self, property: &str) -> Value {
        self.read().row.value(property)
    }

    /// Assign a property and mark it dirty.
    pub fn set(&self, property: &str, value: impl Into<Value>) -> Result<()> {
        let Some(idx) = self.model.property_index(property) else {
            return Err(Error::validation(
                property,
                ValidationErrorKind::UnknownProperty,
                format!("{} has no property {property}", self.model.name()),
            ));
        };
        let mut state = self.write();
        state.row.set(property, value);
        state.dirty.set(idx);
        Ok(())
    }

    /// Snapshot of the backing row.
    #[must_use]
    pub fn row(&self) -> Row {
        self.read().row.clone()
    }

    /// The backing row as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.read().row.to_json()
    }

    /// Key values, or `None` while any key column is unset.
    #[must_use]
    pub fn key(&self) -> Option<Vec<Value>> {
        let key = self.read().row.values_for(self.model.key());
        (!key.iter().any(Value::is_null)).then_some(key)
    }

    /// Key values or a state error naming `action`.
    pub(crate) fn require_key(&self, action: &str) -> Result<Vec<Value>> {
        if self.status() == InstanceStatus::Detached {
            return Err(Error::validation(
                self.model.key().join(","),
                ValidationErrorKind::State,
                format!("cannot {action}: {} instance was removed", self.model.name()),
            ));
        }
        self.key().ok_or_else(|| {
            Error::validation(
                self.model.key().join(","),
                ValidationErrorKind::State,
                format!("cannot {action}: {} instance has no key yet", self.model.name()),
            )
        })
    }

    /// Whether any property changed since the last save.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.read().dirty.any()
    }

    /// Apply stored values without marking them dirty.
    pub(crate) fn apply_clean(&self, values: &Row) {
        let mut state = self.write();
        state.row.merge(values);
        for (column, _) in values.iter() {
            if let Some(idx) = self.model.property_index(column) {
                state.dirty.unset(idx);
            }
        }
    }

    pub(crate) fn mark_detached(&self) {
        self.write().status = InstanceStatus::Detached;
    }

    /// Instances last loaded through association `name`, if any.
    #[must_use]
    pub fn cached(&self, name: &str) -> Option<Vec<Instance>> {
        self.read().cache.get(name).cloned()
    }

    pub(crate) fn cache_put(&self, name: &str, instances: Vec<Instance>) {
        self.write().cache.insert(name.to_string(), instances);
    }

    pub(crate) fn cache_clear(&self, name: &str) {
        self.write().cache.remove(name);
    }

    // ------------------------------------------------------------------------
    // Validation and persistence
    // ------------------------------------------------------------------------

    /// Check property types, required properties and model validators.
    pub fn validate(&self) -> Result<()> {
        self.validate_row(&self.row())
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        let schema = self.model.schema();
        let all = self.model.ctx().settings.return_all_errors;
        let mut errors = ValidationError::default();

        let mut record = |err: FieldValidationError| {
            errors.push(err);
            all
        };

        'check: {
            let generated = schema.has_generated_key();
            for column in &schema.columns {
                let value = row.value(&column.name);
                if value.is_null() && column.key && generated {
                    continue;
                }
                if let Err(e) = column.check(&value) {
                    if !record(e) {
                        break 'check;
                    }
                }
            }
            for (property, validator) in self.model.validators() {
                if let Err(e) = validator.validate(property, &row.value(property)) {
                    if !record(e) {
                        break 'check;
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }

    /// Insert or update this instance.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.model.name()))]
    pub async fn save(&self, cx: &Cx) -> Outcome<(), Error> {
        self.persist(cx, None).await
    }

    /// Save with `overlay` applied on top of the current row. The overlay
    /// only lands in instance state if the driver accepts the write.
    pub(crate) async fn persist(&self, cx: &Cx, overlay: Option<&Row>) -> Outcome<(), Error> {
        self.write_row(cx, overlay, false).await
    }

    /// Save an unsaved instance whose key, given by `overlay`, may already
    /// be stored: an existing row under that key is overwritten in full.
    pub(crate) async fn persist_over(&self, cx: &Cx, overlay: &Row) -> Outcome<(), Error> {
        self.write_row(cx, Some(overlay), true).await
    }

    async fn write_row(&self, cx: &Cx, overlay: Option<&Row>, overwrite: bool) -> Outcome<(), Error> {
        let inserting = match self.status() {
            InstanceStatus::New => true,
            InstanceStatus::Persistent => false,
            InstanceStatus::Detached => {
                return Outcome::Err(Error::validation(
                    self.model.key().join(","),
                    ValidationErrorKind::State,
                    format!("cannot save: {} instance was removed", self.model.name()),
                ));
            }
        };

        let hooks = self.model.hooks();
        try_ok!(hooks.run(HookEvent::BeforeSave, self));

        let ctx = self.model.ctx();
        let table = self.model.table();
        let (mut row, dirty_columns) = {
            let state = self.read();
            let schema = self.model.schema();
            let columns: Vec<String> = state
                .dirty
                .iter()
                .filter_map(|idx| schema.columns.get(idx).map(|c| c.name.clone()))
                .collect();
            (state.row.clone(), columns)
        };
        if let Some(overlay) = overlay {
            row.merge(overlay);
        }
        try_ok!(self.validate_row(&row));

        let replaced = if inserting && overwrite {
            let key = row.values_for(self.model.key());
            try_outcome!(
                ctx.affected(
                    cx,
                    Operation::update(&table, row.clone(), self.model.key_filter(&[key])),
                )
                .await
            ) > 0
        } else {
            false
        };

        if replaced {
            let mut state = self.write();
            state.row = row;
            state.status = InstanceStatus::Persistent;
            state.dirty.clear();
            tracing::info!(
                model = self.model.name(),
                key = ?state.row.values_for(self.model.key()),
                "Replaced stored instance"
            );
        } else if inserting {
            let mut values = Row::new();
            for (column, value) in row.iter() {
                if !(value.is_null() && self.model.key().iter().any(|k| k == column)) {
                    values.set(column, value.clone());
                }
            }
            let stored = try_outcome!(ctx.execute(cx, Operation::insert(&table, values)).await);
            let mut state = self.write();
            state.row = row;
            if let Some(stored) = stored.first() {
                state.row.merge(stored);
            }
            state.status = InstanceStatus::Persistent;
            state.dirty.clear();
            tracing::info!(
                model = self.model.name(),
                key = ?state.row.values_for(self.model.key()),
                "Inserted instance"
            );
        } else {
            let key = try_ok!(self.require_key("save"));
            let mut changes = row.project(&dirty_columns);
            if let Some(overlay) = overlay {
                changes.merge(overlay);
            }
            if !changes.is_empty() {
                try_outcome!(
                    ctx.affected(
                        cx,
                        Operation::update(&table, changes, self.model.key_filter(&[key])),
                    )
                    .await
                );
            }
            let mut state = self.write();
            state.row = row;
            state.dirty.clear();
        }

        try_ok!(hooks.run(HookEvent::AfterSave, self));
        Outcome::Ok(())
    }

    /// Delete this instance's row. Removing an unsaved or already removed
    /// instance succeeds without touching storage.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(model = self.model.name()))]
    pub async fn remove(&self, cx: &Cx) -> Outcome<(), Error> {
        match self.status() {
            InstanceStatus::Detached => return Outcome::Ok(()),
            InstanceStatus::New => {
                self.mark_detached();
                return Outcome::Ok(());
            }
            InstanceStatus::Persistent => {}
        }
        let key = try_ok!(self.require_key("remove"));
        let hooks = self.model.hooks();
        try_ok!(hooks.run(HookEvent::BeforeRemove, self));
        try_outcome!(
            self.model
                .ctx()
                .affected(
                    cx,
                    Operation::delete(self.model.table(), self.model.key_filter(&[key])),
                )
                .await
        );
        self.mark_detached();
        tracing::info!(model = self.model.name(), "Removed instance");
        try_ok!(hooks.run(HookEvent::AfterRemove, self));
        Outcome::Ok(())
    }

    /// Re-read the stored row, discarding unsaved changes.
    pub async fn reload(&self, cx: &Cx) -> Outcome<(), Error> {
        let key = try_ok!(self.require_key("reload"));
        let fresh = try_outcome!(self.model.get(cx, Value::Array(key)).await);
        let row = fresh.row();
        let mut state = self.write();
        state.row = row;
        state.dirty.clear();
        state.cache.clear();
        Outcome::Ok(())
    }

    promise_and_callback! {
        save => save_async, save_cb () -> ();
        remove => remove_async, remove_cb () -> ();
        reload => reload_async, reload_cb () -> ();
    }

    // ------------------------------------------------------------------------
    // Associations
    // ------------------------------------------------------------------------

    /// Accessor handle for association `name`.
    pub fn related(&self, name: &str) -> Result<Accessor> {
        let association = self.model.association(name).ok_or_else(|| {
            Error::definition(format!("{} has no association {name}", self.model.name()))
        })?;
        Ok(Accessor::new(self.clone(), association))
    }

    /// Whether this instance exposes the synthesized method `method`
    /// (`getPet`, `setOwnersAsync`, ...).
    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        self.model.has_accessor(method)
    }

    /// Invoke a synthesized accessor by method name.
    ///
    /// The `...Async` names run the same operation; use
    /// [`call_async`](Self::call_async) for the promise form.
    pub async fn call(&self, cx: &Cx, method: &str, args: AccessorArgs) -> Outcome<AccessorValue, Error> {
        let Some((association, kind, _)) = self.model.resolve_accessor(method) else {
            return Outcome::Err(Error::definition(format!(
                "{} has no method {method}",
                self.model.name()
            )));
        };
        let accessor = Accessor::new(self.clone(), association);
        let targets = args.targets;
        match kind {
            AccessorKind::Get => {
                let found = try_outcome!(accessor.get_where(cx, args.conditions).await);
                Outcome::Ok(AccessorValue::Instances(found))
            }
            AccessorKind::Has => {
                let linked = try_outcome!(accessor.has_targets(cx, targets).await);
                Outcome::Ok(AccessorValue::Bool(linked))
            }
            AccessorKind::Set => {
                try_outcome!(accessor.set(cx, targets).await);
                Outcome::Ok(AccessorValue::Done)
            }
            AccessorKind::Add => {
                try_outcome!(accessor.add(cx, targets).await);
                Outcome::Ok(AccessorValue::Done)
            }
            AccessorKind::Remove => {
                try_outcome!(accessor.remove_targets(cx, targets).await);
                Outcome::Ok(AccessorValue::Done)
            }
        }
    }

    /// Promise form of [`call`](Self::call).
    pub fn call_async<'a>(
        &'a self,
        cx: &'a Cx,
        method: &'a str,
        args: AccessorArgs,
    ) -> crate::facade::Promise<'a, AccessorValue> {
        crate::facade::promise(self.call(cx, method, args))
    }

    /// Callback form of [`call`](Self::call).
    pub async fn call_cb(
        &self,
        cx: &Cx,
        method: &str,
        args: AccessorArgs,
        callback: impl FnOnce(Result<AccessorValue>),
    ) {
        crate::facade::complete(self.call(cx, method, args), callback).await;
    }
}
