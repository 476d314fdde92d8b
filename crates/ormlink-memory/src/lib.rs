//! In-memory driver for ormlink.
//!
//! [`MemoryDriver`] implements the [`Driver`](ormlink_query::Driver) contract
//! without any external backend. It comes in two flavors:
//!
//! - **Relational**: serial `id` keys, join support, unique and not-null
//!   constraints, foreign keys with `NO ACTION`/`RESTRICT`/`CASCADE`/`SET NULL`
//!   delete actions.
//! - **Document**: generated text `_id` keys, key-ordered results, no joins
//!   and no foreign-key enforcement.
//!
//! Writes are atomic per operation: a rejected write leaves every table as it
//! was. [`MemoryDriver::fail_next`] queues failures for testing error paths.

pub mod config;
pub mod driver;
mod store;

pub use config::{Flavor, MemoryConfig, RowOrder};
pub use driver::MemoryDriver;
