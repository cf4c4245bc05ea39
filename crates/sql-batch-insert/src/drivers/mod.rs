//! Database driver implementations.
//!
//! - [`mssql`]: Microsoft SQL Server driver

pub mod mssql;

pub use mssql::{MssqlConnection, MssqlDialect, MssqlPool};
