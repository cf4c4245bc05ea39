//! Batched named-parameter encoding for SQL Server.
//!
//! Tiberius binds positional `@P1..@Pn` parameters only, and every call is
//! itself an `sp_executesql` RPC limited to 2100 parameters. A statement
//! written with named placeholders (`@Name`) and many parameter rows is
//! therefore encoded as one T-SQL batch per chunk of rows:
//!
//! ```text
//! DECLARE @__batch_stmt nvarchar(max) = N'INSERT ... VALUES (@Name, @Age)';
//! EXEC sp_executesql @__batch_stmt, N'@Name nvarchar(max), @Age int', @Name = @P1, @Age = @P2;
//! EXEC sp_executesql @__batch_stmt, N'@Name nvarchar(max), @Age int', @Name = @P3, @Age = NULL;
//! ```
//!
//! NULL values are passed as literals so they never need a typed binding.

use tiberius::ToSql;

use crate::core::{Row, SqlNullType, SqlValue};
use crate::error::{InsertError, Result};

/// SQL Server's hard limit on parameters per RPC call.
pub const MSSQL_MAX_PARAMS: usize = 2100;

/// Default parameter budget per round trip, leaving headroom under the hard limit.
pub const DEFAULT_MAX_PARAMS_PER_BATCH: usize = 2000;

/// One round trip's worth of encoded statements.
pub(crate) struct EncodedBatch {
    pub sql: String,
    pub params: Vec<Box<dyn ToSql>>,
    pub rows: usize,
}

/// Encode `statement` once per parameter row, splitting rows into batches
/// that bind at most `max_params` positional parameters each.
pub(crate) fn encode_batches(
    statement: &str,
    rows: &[Row],
    max_params: usize,
) -> Result<Vec<EncodedBatch>> {
    let max_params = max_params.clamp(1, MSSQL_MAX_PARAMS);
    let mut batches = Vec::new();
    let mut current = BatchEncoder::new(statement);

    for row in rows {
        let needed = bound_param_count(row);
        if needed > max_params {
            return Err(InsertError::Config(format!(
                "A single row binds {} parameters, more than the limit of {}",
                needed, max_params
            )));
        }
        if current.rows > 0 && current.params.len() + needed > max_params {
            batches.push(current.finish());
            current = BatchEncoder::new(statement);
        }
        current.push_row(row)?;
    }

    if current.rows > 0 {
        batches.push(current.finish());
    }
    Ok(batches)
}

struct BatchEncoder {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
    rows: usize,
}

impl BatchEncoder {
    fn new(statement: &str) -> Self {
        Self {
            sql: format!(
                "DECLARE @__batch_stmt nvarchar(max) = N'{}';\n",
                escape_literal(statement)
            ),
            params: Vec::new(),
            rows: 0,
        }
    }

    fn push_row(&mut self, row: &Row) -> Result<()> {
        let mut decls = Vec::with_capacity(row.len());
        let mut assigns = Vec::with_capacity(row.len());

        for (name, value) in row.iter() {
            validate_param_name(name)?;
            decls.push(format!("@{} {}", name, declared_type(value)));
            match to_sql_param(value) {
                Some(param) => {
                    self.params.push(param);
                    assigns.push(format!("@{} = @P{}", name, self.params.len()));
                }
                None => assigns.push(format!("@{} = NULL", name)),
            }
        }

        if decls.is_empty() {
            self.sql.push_str("EXEC sp_executesql @__batch_stmt;\n");
        } else {
            self.sql.push_str(&format!(
                "EXEC sp_executesql @__batch_stmt, N'{}', {};\n",
                decls.join(", "),
                assigns.join(", ")
            ));
        }
        self.rows += 1;
        Ok(())
    }

    fn finish(self) -> EncodedBatch {
        EncodedBatch {
            sql: self.sql,
            params: self.params,
            rows: self.rows,
        }
    }
}

/// Escape a string for use inside an `N'...'` literal.
fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

fn validate_param_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(InsertError::Config(format!(
            "Invalid parameter name: {:?}",
            name
        )))
    }
}

/// Number of positional parameters a row consumes (NULLs are inlined).
fn bound_param_count(row: &Row) -> usize {
    row.iter().filter(|(_, v)| !is_inlined_null(v)).count()
}

fn is_inlined_null(value: &SqlValue<'_>) -> bool {
    match value {
        SqlValue::Null(_) => true,
        SqlValue::F32(f) => !f.is_finite(),
        SqlValue::F64(f) => !f.is_finite(),
        _ => false,
    }
}

/// SQL Server type used to declare a parameter holding `value`.
fn declared_type(value: &SqlValue<'_>) -> String {
    if let SqlValue::Decimal(d) = value {
        return format!("decimal(38, {})", d.scale());
    }
    match value.null_type() {
        SqlNullType::Bool => "bit",
        SqlNullType::I16 => "smallint",
        SqlNullType::I32 => "int",
        SqlNullType::I64 => "bigint",
        SqlNullType::F32 => "real",
        SqlNullType::F64 => "float",
        SqlNullType::String => "nvarchar(max)",
        SqlNullType::Bytes => "varbinary(max)",
        SqlNullType::Uuid => "uniqueidentifier",
        SqlNullType::Decimal => "decimal(38, 10)",
        SqlNullType::DateTime => "datetime2(7)",
        SqlNullType::DateTimeOffset => "datetimeoffset(7)",
        SqlNullType::Date => "date",
        SqlNullType::Time => "time(7)",
    }
    .to_string()
}

/// Owned tiberius parameter for a value, or `None` when the value is sent as
/// a NULL literal (including NaN and infinite floats, which SQL Server rejects).
fn to_sql_param(value: &SqlValue<'_>) -> Option<Box<dyn ToSql>> {
    let param: Box<dyn ToSql> = match value {
        SqlValue::Null(_) => return None,
        SqlValue::F32(f) if !f.is_finite() => return None,
        SqlValue::F64(f) if !f.is_finite() => return None,
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::I16(i) => Box::new(*i),
        SqlValue::I32(i) => Box::new(*i),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::F32(f) => Box::new(*f),
        SqlValue::F64(f) => Box::new(*f),
        SqlValue::Text(s) => Box::new(s.to_string()),
        SqlValue::Bytes(b) => Box::new(b.to_vec()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeOffset(dto) => Box::new(*dto),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(*t),
    };
    Some(param)
}
