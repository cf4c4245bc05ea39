//! Core abstractions for database-agnostic batch inserts.
//!
//! - [`value`]: typed SQL values bound as parameters and read back
//! - [`row`]: ordered name→value rows
//! - [`traits`]: the [`Connection`] collaborator and the [`StatementBuilder`] strategy
//! - [`transaction`]: caller-owned transaction handles
//! - [`identifier`]: validation and quoting of identifiers spliced into SQL
//!
//! Driver modules (`drivers/mssql`) implement these traits; the insert engine
//! only ever talks to the traits, which keeps it testable against in-memory
//! connections.

pub mod identifier;
pub mod row;
pub mod traits;
pub mod transaction;
pub mod value;

pub use row::Row;
pub use traits::{Connection, StatementBuilder, ORDINAL_COLUMN};
pub use transaction::{ConnectionId, Transaction};
pub use value::{SqlNullType, SqlValue};
