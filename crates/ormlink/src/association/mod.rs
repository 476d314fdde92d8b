//! The association engine.
//!
//! Associations are declared through [`Model::has_one`], [`Model::has_many`]
//! and [`Model::extends_to`]. Each declaration registers a static
//! [`AssociationInfo`] on the source model and, when a reverse name is given,
//! a back-reference on the target. Accessors never carry per-association
//! code: [`Accessor`] dispatches every call on the descriptor's
//! [`Linkage`](ormlink_core::Linkage).
//!
//! # Example
//!
//! ```rust,ignore
//! person.has_one("pet", &pet, AssociationOptions::new().reverse("owners"))?;
//!
//! let john = person.create(&cx, Row::new().with("name", "John")).await?;
//! let deco = pet.create(&cx, Row::new().with("name", "Deco")).await?;
//! deco.related("owners")?.set(&cx, &john).await?;
//! assert!(john.related("pet")?.has(&cx).await?);
//! ```
//!
//! [`Model::has_one`]: crate::Model::has_one
//! [`Model::has_many`]: crate::Model::has_many
//! [`Model::extends_to`]: crate::Model::extends_to

pub(crate) mod define;
mod ops;

use std::sync::{Arc, Weak};

use ormlink_core::{
    AccessorKind, AssociationInfo, AssociationKind, Cx, Error, Outcome, ReferentialAction, Result,
    try_ok, try_outcome,
};

use crate::conditions::Conditions;
use crate::facade::promise_and_callback;
use crate::hooks::Hooks;
use crate::instance::Instance;
use crate::model::{Model, ModelInner};

// ============================================================================
// Options
// ============================================================================

/// Options for declaring an association.
#[derive(Debug, Clone, Default)]
pub struct AssociationOptions {
    pub(crate) reverse: Option<String>,
    pub(crate) field: Option<Vec<String>>,
    pub(crate) merge_table: Option<String>,
    pub(crate) merge_id: Option<Vec<String>>,
    pub(crate) required: bool,
    pub(crate) unique: bool,
    pub(crate) on_delete: Option<ReferentialAction>,
    pub(crate) hooks: Hooks,
}

impl AssociationOptions {
    /// Defaults: no reverse, generated column names, optional link.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a back-reference called `name` on the target model.
    #[must_use]
    pub fn reverse(mut self, name: impl Into<String>) -> Self {
        self.reverse = Some(name.into());
        self
    }

    /// Link columns.
    ///
    /// hasOne: foreign-key columns on the source. hasMany: join-table columns
    /// referencing the target. extendsTo: only the target's own key columns
    /// are accepted.
    #[must_use]
    pub fn field<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.field = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Join-table name for hasMany.
    #[must_use]
    pub fn merge_table(mut self, table: impl Into<String>) -> Self {
        self.merge_table = Some(table.into());
        self
    }

    /// Join-table columns referencing the source for hasMany.
    #[must_use]
    pub fn merge_id<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.merge_id = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// `get` fails with not-found when nothing is linked.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Put a unique constraint on the hasOne foreign key.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// What happens to linking rows when the referenced row is deleted.
    #[must_use]
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Hooks around link replacement and removal.
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }
}

// ============================================================================
// Registered association
// ============================================================================

/// An association as registered on its source model.
pub(crate) struct Association {
    pub(crate) info: AssociationInfo,
    target: Weak<ModelInner>,
    pub(crate) hooks: Hooks,
}

impl Association {
    pub(crate) fn new(info: AssociationInfo, target: &Model, hooks: Hooks) -> Self {
        Self {
            info,
            target: target.downgrade(),
            hooks,
        }
    }

    /// The target model; fails once its registry is gone.
    pub(crate) fn target(&self) -> Result<Model> {
        self.target.upgrade().map(Model::from_inner).ok_or_else(|| {
            Error::definition(format!(
                "target {} of association {} no longer exists",
                self.info.target_table, self.info.name
            ))
        })
    }

    /// `get` fails when nothing is linked.
    pub(crate) fn is_strict(&self, model: &Model) -> bool {
        self.info.required
            || model.ctx().settings.strict_get
            || (self.info.kind == AssociationKind::ExtendsTo && !self.info.reversed)
    }
}

// ============================================================================
// Accessor arguments
// ============================================================================

/// Instances handed to `set`/`add`/`has`/`remove`.
#[derive(Debug, Clone, Default)]
pub struct Targets(pub(crate) Vec<Instance>);

impl Targets {
    /// No instances.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The instances.
    #[must_use]
    pub fn instances(&self) -> &[Instance] {
        &self.0
    }
}

impl From<Instance> for Targets {
    fn from(instance: Instance) -> Self {
        Self(vec![instance])
    }
}

impl From<&Instance> for Targets {
    fn from(instance: &Instance) -> Self {
        Self(vec![instance.clone()])
    }
}

impl From<Vec<Instance>> for Targets {
    fn from(instances: Vec<Instance>) -> Self {
        Self(instances)
    }
}

impl From<&Vec<Instance>> for Targets {
    fn from(instances: &Vec<Instance>) -> Self {
        Self(instances.clone())
    }
}

impl From<&[Instance]> for Targets {
    fn from(instances: &[Instance]) -> Self {
        Self(instances.to_vec())
    }
}

impl<const N: usize> From<[&Instance; N]> for Targets {
    fn from(instances: [&Instance; N]) -> Self {
        Self(instances.into_iter().cloned().collect())
    }
}

impl From<Option<Instance>> for Targets {
    fn from(instance: Option<Instance>) -> Self {
        Self(instance.into_iter().collect())
    }
}

/// Arguments for an accessor invoked by method name.
#[derive(Debug, Clone, Default)]
pub struct AccessorArgs {
    pub(crate) targets: Targets,
    pub(crate) conditions: Conditions,
}

impl AccessorArgs {
    /// No arguments.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Target instances for `set`/`add`/`has`/`remove`.
    #[must_use]
    pub fn targets(targets: impl Into<Targets>) -> Self {
        Self {
            targets: targets.into(),
            conditions: Conditions::new(),
        }
    }

    /// Extra conditions for `get`.
    #[must_use]
    pub fn conditions(conditions: Conditions) -> Self {
        Self {
            targets: Targets::none(),
            conditions,
        }
    }
}

/// Result of an accessor invoked by method name.
#[derive(Debug, Clone)]
pub enum AccessorValue {
    /// `get` results.
    Instances(Vec<Instance>),
    /// `has` result.
    Bool(bool),
    /// `set`/`add`/`remove` completed.
    Done,
}

impl AccessorValue {
    /// The instances of a `get`, empty for other accessors.
    #[must_use]
    pub fn into_instances(self) -> Vec<Instance> {
        match self {
            AccessorValue::Instances(found) => found,
            AccessorValue::Bool(_) | AccessorValue::Done => Vec::new(),
        }
    }

    /// The boolean of a `has`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AccessorValue::Bool(b) => Some(*b),
            AccessorValue::Instances(_) | AccessorValue::Done => None,
        }
    }
}

// ============================================================================
// Accessor
// ============================================================================

/// The accessors of one association bound to one source instance.
///
/// Obtained from [`Instance::related`]. Single-valued sides expose
/// `get`/`set`/`has`/`remove`; many-valued sides also expose `add`. Calling
/// an accessor the side does not expose is a definition error.
#[derive(Clone)]
pub struct Accessor {
    instance: Instance,
    association: Arc<Association>,
}

impl std::fmt::Debug for Accessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accessor")
            .field("model", &self.instance.model().name())
            .field("association", &self.association.info.name)
            .finish()
    }
}

impl Accessor {
    pub(crate) fn new(instance: Instance, association: Arc<Association>) -> Self {
        Self {
            instance,
            association,
        }
    }

    /// Static descriptor.
    #[must_use]
    pub fn info(&self) -> &AssociationInfo {
        &self.association.info
    }

    /// The source instance.
    #[must_use]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The target model.
    pub fn target(&self) -> Result<Model> {
        self.association.target()
    }

    fn exposes(&self, kind: AccessorKind) -> Result<()> {
        if self.association.info.accessors.method(kind).is_some() {
            return Ok(());
        }
        Err(Error::definition(format!(
            "{}.{} has no {}{} accessor",
            self.instance.model().name(),
            self.association.info.name,
            kind.prefix(),
            self.association.info.accessors.stem()
        )))
    }

    /// Linked instances.
    pub async fn get(&self, cx: &Cx) -> Outcome<Vec<Instance>, Error> {
        self.get_where(cx, Conditions::new()).await
    }

    /// Linked instances that also match `conditions`.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, conditions),
        fields(association = %self.association.info.name)
    )]
    pub async fn get_where(&self, cx: &Cx, conditions: Conditions) -> Outcome<Vec<Instance>, Error> {
        try_ok!(self.exposes(AccessorKind::Get));
        ops::get(&self.instance, &self.association, cx, conditions).await
    }

    /// The single linked instance, if any.
    pub async fn get_one(&self, cx: &Cx) -> Outcome<Option<Instance>, Error> {
        let found = try_outcome!(self.get(cx).await);
        Outcome::Ok(found.into_iter().next())
    }

    /// Replace the link with `targets`. An empty set removes the link.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, targets),
        fields(association = %self.association.info.name)
    )]
    pub async fn set(&self, cx: &Cx, targets: impl Into<Targets>) -> Outcome<(), Error> {
        try_ok!(self.exposes(AccessorKind::Set));
        ops::set(&self.instance, &self.association, cx, targets.into().0, true).await
    }

    /// Link `targets` in addition to what is already linked.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, targets),
        fields(association = %self.association.info.name)
    )]
    pub async fn add(&self, cx: &Cx, targets: impl Into<Targets>) -> Outcome<(), Error> {
        try_ok!(self.exposes(AccessorKind::Add));
        ops::set(&self.instance, &self.association, cx, targets.into().0, false).await
    }

    /// Whether anything is linked.
    pub async fn has(&self, cx: &Cx) -> Outcome<bool, Error> {
        self.has_targets(cx, Targets::none()).await
    }

    /// Whether every one of `targets` is linked; with no targets, whether
    /// anything is linked.
    pub async fn has_targets(&self, cx: &Cx, targets: impl Into<Targets>) -> Outcome<bool, Error> {
        try_ok!(self.exposes(AccessorKind::Has));
        ops::has(&self.instance, &self.association, cx, targets.into().0).await
    }

    /// Unlink everything. Succeeds when nothing is linked.
    pub async fn remove(&self, cx: &Cx) -> Outcome<(), Error> {
        self.remove_targets(cx, Targets::none()).await
    }

    /// Unlink `targets`; with no targets, unlink everything.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, targets),
        fields(association = %self.association.info.name)
    )]
    pub async fn remove_targets(&self, cx: &Cx, targets: impl Into<Targets>) -> Outcome<(), Error> {
        try_ok!(self.exposes(AccessorKind::Remove));
        ops::remove(&self.instance, &self.association, cx, targets.into().0).await
    }

    promise_and_callback! {
        get => get_async, get_cb () -> Vec<Instance>;
        get_where => get_where_async, get_where_cb (conditions: Conditions) -> Vec<Instance>;
        get_one => get_one_async, get_one_cb () -> Option<Instance>;
        set => set_async, set_cb (targets: Targets) -> ();
        add => add_async, add_cb (targets: Targets) -> ();
        has => has_async, has_cb () -> bool;
        has_targets => has_targets_async, has_targets_cb (targets: Targets) -> bool;
        remove => remove_async, remove_cb () -> ();
        remove_targets => remove_targets_async, remove_targets_cb (targets: Targets) -> ();
    }
}
