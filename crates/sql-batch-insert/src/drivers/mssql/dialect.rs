//! MSSQL SQL dialect (Strategy pattern).
//!
//! SQL Server is the dialect the [`StatementBuilder`] defaults are written
//! for, so this type only supplies the name. It exists so callers can pick
//! the dialect explicitly and so the driver has a concrete type to hand out.

use crate::core::traits::StatementBuilder;

/// Microsoft SQL Server dialect implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl StatementBuilder for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }
}
