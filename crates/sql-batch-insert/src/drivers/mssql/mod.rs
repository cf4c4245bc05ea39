//! Microsoft SQL Server driver.
//!
//! This module provides MSSQL-specific implementations:
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlPool`]: bb8 pool handing out sessions
//! - [`MssqlConnection`]: one session, implementing [`Connection`](crate::core::Connection)

mod connection;
mod dialect;
mod params;
mod rows;

pub use connection::{MssqlConnection, MssqlPool, TiberiusConnectionManager};
pub use dialect::MssqlDialect;
pub use params::{DEFAULT_MAX_PARAMS_PER_BATCH, MSSQL_MAX_PARAMS};
