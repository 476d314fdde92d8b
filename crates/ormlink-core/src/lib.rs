//! Core types for ormlink.
//!
//! `ormlink-core` is the **foundation layer** of the workspace. It defines the
//! data types every other crate exchanges.
//!
//! # Role In The Architecture
//!
//! - **Data model**: `Row` and `Value` are what drivers return and what the
//!   instance layer wraps.
//! - **Schema**: `Property`, `PropertyType` and `TableSchema` describe models
//!   and join tables to drivers.
//! - **Associations**: `AssociationInfo` and `Linkage` are the static
//!   descriptors accessor dispatch is parameterized by.
//! - **Errors**: one `Error` taxonomy for validation, constraint, not-found and
//!   driver failures.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync;
//!   every async operation takes a `&Cx` and returns an `Outcome`.
//!
//! # Who Uses This Crate
//!
//! - `ormlink-query` builds operation descriptors over `Value`/`TableSchema`.
//! - Driver crates (`ormlink-memory`) execute those operations into `Row`s.
//! - `ormlink` wraps rows into instances and implements the association engine.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod association;
pub mod error;
pub mod fields_set;
pub mod outcome;
pub mod row;
pub mod schema;
pub mod validate;
pub mod value;

pub use association::{
    ASYNC_SUFFIX, AccessorKind, AccessorNames, AssociationInfo, AssociationKind, Cardinality,
    JoinTableInfo, Linkage,
};
pub use error::{
    ConstraintError, ConstraintKind, DriverError, Error, ErrorKind, FieldValidationError, Result,
    ValidationError, ValidationErrorKind,
};
pub use fields_set::FieldsSet;
pub use outcome::into_result;
pub use row::Row;
pub use schema::{ForeignKey, Property, PropertyType, ReferentialAction, TableSchema};
pub use validate::{
    Length, OneOf, Pattern, Range, Required, SharedValidator, Validator, matches_pattern,
    validate_pattern,
};
pub use value::{Value, hash_key};
