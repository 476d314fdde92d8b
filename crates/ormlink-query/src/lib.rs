//! Operation descriptors and the driver contract for ormlink.
//!
//! `ormlink-query` is the **boundary layer** between the association engine
//! and storage backends.
//!
//! # Role In The Architecture
//!
//! - **Filters**: [`Filter`] and [`Comparator`] express find conditions,
//!   including IN lists, ranges, LIKE patterns and or-groups.
//! - **Operations**: [`Operation`] is the closed set of primitive calls a
//!   driver must understand (sync, drop, select, count, insert, update,
//!   delete).
//! - **Driver trait**: [`Driver`] is what a backend implements. It reports
//!   join support and key layout so the engine can pick a strategy per
//!   backend instead of per call site.
//!
//! Filters double as a reference evaluator ([`Filter::matches`]) for drivers
//! that keep rows in memory.

pub mod driver;
pub mod filter;
pub mod operation;

pub use driver::{Driver, DriverFuture};
pub use filter::{Clause, Comparator, Filter, like_to_regex};
pub use operation::{
    AFFECTED_COLUMN, COUNT_COLUMN, Delete, Direction, Insert, Join, Operation, OperationKind,
    OrderBy, Select, Update, scalar,
};
