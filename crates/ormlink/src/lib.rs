//! Dynamic models and associations over pluggable drivers.
//!
//! `ormlink` is the **user-facing facade** of the workspace. Models are
//! defined at runtime from property lists, associated with each other, and
//! stored through any [`Driver`].
//!
//! # Role In The Architecture
//!
//! - **Registry**: [`Registry`] owns the driver and settings and injects them
//!   into every model it defines.
//! - **Models and instances**: [`Model`] describes a table; [`Instance`] wraps
//!   one row with dirty tracking, hooks and validation.
//! - **Association engine**: `has_one`, `has_many` and `extends_to` register
//!   static descriptors; [`Accessor`] dispatches `get`/`set`/`add`/`has`/
//!   `remove` on them. Accessors are also reachable by synthesized method
//!   name (`getPet`, `setOwnersAsync`) through [`Instance::call`].
//! - **Queries**: [`ChainFind`] and [`Conditions`], lowered to
//!   `ormlink-query` operations.
//! - **Async facade**: every async operation has `*_async` (promise) and
//!   `*_cb` (callback) forms with identical results.
//!
//! # Example
//!
//! ```rust,ignore
//! use ormlink::prelude::*;
//! use ormlink_memory::MemoryDriver;
//!
//! let registry = Registry::new(Arc::new(MemoryDriver::relational()));
//! let person = registry.define("person", vec![Property::new("name", PropertyType::Text)], ModelOptions::new())?;
//! let pet = registry.define("pet", vec![Property::new("name", PropertyType::Text)], ModelOptions::new())?;
//! person.has_one("pet", &pet, AssociationOptions::new().reverse("owners"))?;
//! registry.sync(&cx).await;
//!
//! let deco = pet.create(&cx, Row::new().with("name", "Deco")).await;
//! ```

pub mod association;
pub mod conditions;
pub mod facade;
pub mod find;
pub mod hooks;
pub mod instance;
pub mod model;
pub mod registry;
pub mod settings;

pub use ormlink_core::{
    AccessorKind, AssociationInfo, AssociationKind, Cardinality, ConstraintError, ConstraintKind,
    Cx, DriverError, Error, ErrorKind, FieldValidationError, ForeignKey, JoinTableInfo, Length,
    Linkage, OneOf, Outcome, Pattern, Property, PropertyType, Range, ReferentialAction, Required,
    Result, Row, TableSchema, ValidationError, ValidationErrorKind, Validator, Value, into_result,
};
pub use ormlink_query::{Comparator, Driver, OrderBy};

pub use association::{Accessor, AccessorArgs, AccessorValue, AssociationOptions, Targets};
pub use conditions::{CondValue, Conditions};
pub use facade::{Completion, Promise};
pub use find::ChainFind;
pub use hooks::{Hook, HookEvent, Hooks};
pub use instance::{Instance, InstanceStatus};
pub use model::{Model, ModelOptions};
pub use registry::Registry;
pub use settings::Settings;

/// Everything needed to define models and work with instances.
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::{
        Accessor, AccessorArgs, AccessorValue, AssociationOptions, ChainFind, Comparator,
        Conditions, ConstraintKind, Cx, Error, HookEvent, Hooks, Instance, InstanceStatus, Model,
        ModelOptions, Outcome, Property, PropertyType, ReferentialAction, Registry, Result, Row,
        Settings, Targets, ValidationErrorKind, Value,
    };
}
